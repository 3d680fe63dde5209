use crate::error::{PreflightError, Result};
use crate::models::{ExecutionResult, LAUNCH_FAILURE_EXIT_CODE};
use camino::Utf8Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

/// Upper bound on captured output per stream (10 MiB)
pub const MAX_CAPTURED_OUTPUT: usize = 10 * 1024 * 1024;

/// Captured output of one stream
#[derive(Debug, Default)]
struct Captured {
    text: String,
    truncated: bool,
}

/// Runs the PitStop Server CLI and captures what it prints.
///
/// The invoker never fails once asked to run a configuration: a launch error
/// becomes an [`ExecutionResult`] with exit code `-1` and the error text in
/// `stderr`, and a non-zero exit code is passed through unchanged.
///
/// # Fields
///
/// - `max_output`: bytes kept per stream; anything beyond it is read and
///   discarded so the child never blocks on a full pipe
#[derive(Debug, Clone)]
pub struct ProcessInvoker {
    max_output: usize,
}

impl ProcessInvoker {
    pub fn new() -> Self {
        Self {
            max_output: MAX_CAPTURED_OUTPUT,
        }
    }

    /// Invoker with a different per-stream capture limit
    pub fn with_max_output(max_output: usize) -> Self {
        Self { max_output }
    }

    /// Command line for a configuration run, quoted for display and logs
    pub fn command_line(executable: &Utf8Path, config_path: &Utf8Path) -> String {
        format!("\"{}\" -config \"{}\"", executable, config_path)
    }

    /// Run `<executable> -config <config_path>` to completion.
    ///
    /// # Returns
    /// The result and the wall-clock time the process took
    pub async fn execute(
        &self,
        executable: &Utf8Path,
        config_path: &Utf8Path,
    ) -> (ExecutionResult, Duration) {
        let command = Self::command_line(executable, config_path);
        tracing::info!("Executing: {}", command);

        let start = Instant::now();

        let mut cmd = Command::new(executable.as_std_path());
        cmd.arg("-config")
            .arg(config_path.as_std_path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::error!("Failed to launch PitStop Server: {}", e);
                let message = format!("failed to launch {}: {}", executable, e);
                return (ExecutionResult::launch_failure(command, message), start.elapsed());
            }
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (stdout, stderr, status) = tokio::join!(
            self.capture(stdout),
            self.capture(stderr),
            child.wait()
        );

        let duration = start.elapsed();

        for (name, captured) in [("stdout", &stdout), ("stderr", &stderr)] {
            if captured.truncated {
                tracing::warn!(
                    "PitStop Server {} exceeded {} bytes and was truncated",
                    name,
                    self.max_output
                );
            }
        }

        let result = match status {
            Ok(status) => {
                let exit_code = status.code().unwrap_or(LAUNCH_FAILURE_EXIT_CODE);
                tracing::info!(
                    "PitStop Server completed in {:.2}s with exit code {}",
                    duration.as_secs_f32(),
                    exit_code
                );
                ExecutionResult {
                    command,
                    exit_code,
                    stdout: stdout.text,
                    stderr: stderr.text,
                }
            }
            Err(e) => {
                tracing::error!("Failed to wait for PitStop Server: {}", e);
                let mut result = ExecutionResult::launch_failure(
                    command,
                    format!("failed to wait for {}: {}", executable, e),
                );
                result.stdout = stdout.text;
                if !stderr.text.is_empty() {
                    result.stderr = format!("{}\n{}", stderr.text, result.stderr);
                }
                result
            }
        };

        (result, duration)
    }

    /// Ask the CLI for its version (`<executable> -version`).
    ///
    /// # Errors
    ///
    /// [`PreflightError::Process`] if the executable cannot be launched or exits
    /// with a failure code.
    pub async fn query_version(&self, executable: &Utf8Path) -> Result<String> {
        tracing::debug!("Querying version of {}", executable);

        let output = Command::new(executable.as_std_path())
            .arg("-version")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| PreflightError::Process(format!("failed to launch {}: {}", executable, e)))?;

        if !output.status.success() {
            return Err(PreflightError::Process(format!(
                "{} -version exited with {:?}: {}",
                executable,
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn capture<R: AsyncRead + Unpin>(&self, stream: Option<R>) -> Captured {
        let Some(stream) = stream else {
            return Captured::default();
        };

        let mut buffer = Vec::new();
        let mut limited = stream.take(self.max_output as u64);
        if let Err(e) = limited.read_to_end(&mut buffer).await {
            tracing::warn!("Error reading PitStop Server output: {}", e);
        }

        let mut rest = limited.into_inner();
        let discarded = tokio::io::copy(&mut rest, &mut tokio::io::sink())
            .await
            .unwrap_or(0);

        Captured {
            text: String::from_utf8_lossy(&buffer).into_owned(),
            truncated: discarded > 0,
        }
    }
}

impl Default for ProcessInvoker {
    fn default() -> Self {
        Self::new()
    }
}

use std::fmt;

/// Outcome of invoking PitStop Server once.
///
/// Produced for every run that got as far as launching the external process,
/// including launch failures, which carry exit code `-1` and the launch error
/// in `stderr`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Command line as it would be typed in a shell
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Exit code reported when the process could not be launched or was killed by a signal
pub const LAUNCH_FAILURE_EXIT_CODE: i32 = -1;

impl ExecutionResult {
    pub(crate) fn launch_failure(command: String, message: impl Into<String>) -> Self {
        Self {
            command,
            exit_code: LAUNCH_FAILURE_EXIT_CODE,
            stdout: String::new(),
            stderr: message.into(),
        }
    }

    /// PitStop Server ran and reported success
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// The process never ran to completion on its own
    pub fn is_launch_failure(&self) -> bool {
        self.exit_code == LAUNCH_FAILURE_EXIT_CODE
    }
}

impl fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> exit code {}", self.command, self.exit_code)
    }
}

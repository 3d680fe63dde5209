//! One PitStop Server run from options to result.
//!
//! [`PreflightRun`] ties the pieces together:
//!
//! 1. [`PreflightRun::new`] validates the options into a
//!    [`TaskDescriptor`] and claims the output folder
//! 2. [`PreflightRun::prepare`] writes the variable set and the configuration
//! 3. [`PreflightRun::run`] launches the CLI and waits for it
//! 4. [`PreflightRun::cleanup`] removes the output folder when the caller is done
//!
//! Only step 3 suspends. Errors before the launch are returned as
//! [`PreflightError`]; once the process has been asked to start, every outcome
//! is an [`ExecutionResult`].
//!
//! # Output folder exclusivity
//!
//! The configuration, variable set and reports all live at fixed names inside
//! the output folder, so two live runs on one folder would overwrite each
//! other. A process-wide registry refuses a second `PreflightRun` for a folder
//! until the first one is dropped. Other processes are not covered.

use crate::error::{PreflightError, Result};
use crate::metrics::RunMetrics;
use crate::models::{ExecutionResult, TaskDescriptor, TaskOptions};
use crate::services::configuration::write_configuration;
use crate::services::discovery::{ExecutableLocator, PlatformLocator};
use crate::services::invoker::ProcessInvoker;
use crate::services::variable_set::materialize_variable_set;
use crate::state::{RunEvent, RunState, RunStateTracker};
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

static ACTIVE_OUTPUT_FOLDERS: Mutex<BTreeSet<Utf8PathBuf>> = Mutex::new(BTreeSet::new());

/// Claim on an output folder, released on drop
#[derive(Debug)]
struct OutputFolderLock {
    folder: Utf8PathBuf,
}

impl OutputFolderLock {
    fn acquire(folder: &Utf8Path) -> Result<Self> {
        let key = folder
            .canonicalize_utf8()
            .unwrap_or_else(|_| folder.to_path_buf());

        let mut active = ACTIVE_OUTPUT_FOLDERS
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !active.insert(key.clone()) {
            return Err(PreflightError::Validation(format!(
                "output folder {} is already used by another run",
                folder
            )));
        }

        Ok(Self { folder: key })
    }
}

impl Drop for OutputFolderLock {
    fn drop(&mut self) {
        let mut active = ACTIVE_OUTPUT_FOLDERS
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        active.remove(&self.folder);
    }
}

/// A single preflight run
pub struct PreflightRun {
    task: TaskDescriptor,
    state: RunStateTracker,
    invoker: ProcessInvoker,
    metrics: Arc<RunMetrics>,
    elapsed: Option<Duration>,
    _folder_lock: OutputFolderLock,
}

impl PreflightRun {
    /// Validate `options`, discovering the executable on this platform if needed
    pub fn new(options: TaskOptions) -> Result<Self> {
        Self::with_locator(options, &PlatformLocator)
    }

    /// Like [`new`](Self::new) with a custom executable locator
    pub fn with_locator(options: TaskOptions, locator: &dyn ExecutableLocator) -> Result<Self> {
        let task = TaskDescriptor::from_options(options, locator)?;
        let folder_lock = OutputFolderLock::acquire(&task.output_folder)?;

        tracing::info!(
            "Preflight run for {} into {}",
            task.input_pdf,
            task.output_folder
        );

        Ok(Self {
            task,
            state: RunStateTracker::new(),
            invoker: ProcessInvoker::new(),
            metrics: Arc::new(RunMetrics::new()),
            elapsed: None,
            _folder_lock: folder_lock,
        })
    }

    /// Share a metrics instance with other runs
    pub fn with_metrics(mut self, metrics: Arc<RunMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Replace the process invoker (e.g. to change the output cap)
    pub fn with_invoker(mut self, invoker: ProcessInvoker) -> Self {
        self.invoker = invoker;
        self
    }

    pub fn task(&self) -> &TaskDescriptor {
        &self.task
    }

    pub fn state(&self) -> RunState {
        self.state.current()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.state.subscribe()
    }

    pub fn metrics(&self) -> &Arc<RunMetrics> {
        &self.metrics
    }

    /// Path of the configuration document
    pub fn config_path(&self) -> &Utf8Path {
        &self.task.config_path
    }

    /// Wall-clock time of the external process, once it has run
    pub fn elapsed(&self) -> Option<Duration> {
        self.elapsed
    }

    /// Write the variable set (if any) and the configuration document.
    ///
    /// Runs once; later calls before invocation return the same path.
    pub fn prepare(&mut self) -> Result<&Utf8Path> {
        match self.state.current() {
            RunState::Constructed => {}
            RunState::ConfigBuilt => return Ok(&self.task.config_path),
            other => {
                return Err(PreflightError::InvalidTransition(format!(
                    "cannot prepare a run that is {}",
                    other
                )));
            }
        }

        materialize_variable_set(&mut self.task)?;
        write_configuration(&self.task)?;
        self.state.advance(RunState::ConfigBuilt)?;

        Ok(&self.task.config_path)
    }

    /// Launch PitStop Server and wait for it to exit.
    ///
    /// # Errors
    ///
    /// Only preparation errors and [`PreflightError::InvalidTransition`] for a
    /// run that was already invoked. Launch failures and non-zero exits are
    /// reported through the returned [`ExecutionResult`].
    pub async fn run(&mut self) -> Result<ExecutionResult> {
        if self.state.current() == RunState::Constructed {
            self.prepare()?;
        }
        self.state.advance(RunState::Invoked)?;
        self.metrics.record_started();

        let (result, duration) = self
            .invoker
            .execute(&self.task.executable, &self.task.config_path)
            .await;

        self.elapsed = Some(duration);
        self.metrics.record_finished(&result, duration);
        self.state.emit(RunEvent::ProcessFinished {
            exit_code: result.exit_code,
        });
        self.state.advance(RunState::Completed)?;

        if !result.is_success() {
            tracing::warn!(
                "PitStop Server exited with {}: {}",
                result.exit_code,
                result.stderr.trim()
            );
        }

        Ok(result)
    }

    /// Version string reported by the resolved executable
    pub async fn query_version(&self) -> Result<String> {
        self.invoker.query_version(&self.task.executable).await
    }

    /// Remove the output folder and everything in it.
    ///
    /// Removing a folder that is already gone is not an error.
    pub fn cleanup(&self) -> Result<()> {
        match fs::remove_dir_all(&self.task.output_folder) {
            Ok(()) => {
                tracing::info!("Removed output folder {}", self.task.output_folder);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("Output folder {} already removed", self.task.output_folder);
                Ok(())
            }
            Err(e) => Err(PreflightError::Filesystem(format!(
                "failed to remove {}: {}",
                self.task.output_folder, e
            ))),
        }
    }
}

/// Ask an executable for its version without building a run
pub async fn query_version(executable: &Utf8Path) -> Result<String> {
    ProcessInvoker::new().query_version(executable).await
}

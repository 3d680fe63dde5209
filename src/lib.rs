// pitstop-runner - configuration builder and process runner for PitStop Server
//
// This is the library crate containing the run orchestration, document
// builders and process handling. The binary crate (main.rs) provides the
// command-line entry point.

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod runner;
pub mod services;
pub mod state;
pub mod xml;

// Re-export commonly used types for convenience
pub use config::{ConfigManager, Settings};
pub use error::{PreflightError, Result};
pub use metrics::RunMetrics;
pub use models::{
    ExecutionResult, MeasurementUnit, TaskDescriptor, TaskOptions, VariableEntry, VariableType,
    VariableValue,
};
pub use runner::PreflightRun;
pub use state::{RunEvent, RunState, RunStateTracker};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

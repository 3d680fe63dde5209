//! Services module - the work behind a preflight run.
//!
//! Each service does one thing and takes its inputs explicitly, so they can be
//! tested without a PitStop Server installation.
//!
//! # Components
//!
//! - [`configuration`]: builds the PitStop Server configuration document from a
//!   [`TaskDescriptor`](crate::models::TaskDescriptor), starting either from a
//!   blank document or from a user-supplied template
//! - [`variable_set`]: builds a fresh variable set or updates values in an
//!   existing one, converting lengths to points
//! - [`discovery`]: finds the PitStop Server CLI on Windows (registry) and
//!   macOS (`/Applications`), caching the answer for the process
//! - [`invoker`]: launches the CLI with `-config <path>` and captures its
//!   output with a size cap
//!
//! # Usage Example
//!
//! ```ignore
//! use pitstop_runner::services::{ConfigurationBuilder, ProcessInvoker};
//!
//! let document = ConfigurationBuilder::new(&task).build()?;
//! document.write_to(&task.config_path)?;
//!
//! let (result, elapsed) = ProcessInvoker::new()
//!     .execute(&task.executable, &task.config_path)
//!     .await;
//! ```
//!
//! Most callers should use [`PreflightRun`](crate::runner::PreflightRun), which
//! sequences these services and tracks the run state.

pub mod configuration;
pub mod discovery;
pub mod invoker;
pub mod variable_set;

pub use configuration::{CONFIGURATION_NAMESPACE, ConfigurationBuilder, write_configuration};
pub use discovery::{ExecutableLocator, PlatformLocator, reset_executable_cache, resolve_executable};
pub use invoker::{MAX_CAPTURED_OUTPUT, ProcessInvoker};
pub use variable_set::{
    VARIABLE_SET_NAMESPACE, build_variable_set, materialize_variable_set, update_variable_set,
    update_variable_set_file, write_variable_set,
};

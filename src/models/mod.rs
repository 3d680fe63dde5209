//! Data models for a PitStop Server run.
//!
//! - [`TaskOptions`]: the loosely-typed option bag read from job files or `key=value` overrides
//! - [`TaskDescriptor`]: validated, fully defaulted settings for one run
//! - [`VariableEntry`]: a named variable and the value it takes in the variable set
//! - [`ExecutionResult`]: what came back from the external process
//!
//! Options are only ever turned into a descriptor through
//! [`TaskDescriptor::from_options`], which is where every filesystem check
//! and default lives.

pub mod options;
pub mod result;
pub mod task;
pub mod variable;

pub use options::{OPTION_KEYS, TaskOptions, parse_overrides};
pub use result::{ExecutionResult, LAUNCH_FAILURE_EXIT_CODE};
pub use task::{MeasurementUnit, ReportSettings, TaskDescriptor};
pub use variable::{VariableEntry, VariableType, VariableValue, length_in_points};

use thiserror::Error;

/// Errors raised while setting up or driving a preflight run.
///
/// Everything up to the launch of the external process is reported through
/// this type. Once the process has been asked to start, failures are folded
/// into [`crate::models::ExecutionResult`] instead.
#[derive(Error, Debug)]
pub enum PreflightError {
    /// Missing mandatory input or contradictory options
    #[error("Invalid options: {0}")]
    Validation(String),

    /// Missing or unwritable paths, missing referenced files
    #[error("Filesystem error: {0}")]
    Filesystem(String),

    /// Executable not discoverable, variable absent from a variable set
    #[error("Not found: {0}")]
    NotFound(String),

    /// An expected anchor element is absent from a document
    #[error("Document structure error: {0}")]
    Structural(String),

    /// The external process could not be launched at all
    #[error("Process error: {0}")]
    Process(String),

    /// A document could not be parsed or serialized
    #[error("XML error: {0}")]
    Xml(String),

    /// Operation not allowed in the current run state
    #[error("Invalid run transition: {0}")]
    InvalidTransition(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PreflightError>;

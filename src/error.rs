//! Error types for trueno-sweep
//!
//! Only sweep-level problems are errors: a bad parameter declaration, an
//! invalid pool size or a command template that cannot be rendered abort the
//! sweep before any process is started. Per-configuration problems (process
//! failure, timeout, extraction failure) are recorded in the result table as
//! [`Failure`](crate::sweep::Failure) values instead.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// trueno-sweep error types
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed configuration space (empty parameter list, duplicate names, ...)
    #[error("Configuration space error: {0}")]
    ConfigSpace(String),

    /// Worker pool must hold at least one worker
    #[error("Invalid worker pool size: {0}\nA sweep needs at least one worker")]
    InvalidPoolSize(usize),

    /// Command template references something the configuration space cannot supply
    #[error("Command template error: {0}")]
    CommandTemplate(String),

    /// Invalid argument to a sweep or query
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Sweep file (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Arrow export error
    #[cfg(feature = "arrow")]
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}

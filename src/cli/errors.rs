//! CLI-specific error types.

use thiserror::Error;

use crate::records::RecordsError;

/// CLI errors: configuration problems plus everything the store surfaces.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Store(#[from] RecordsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Configuration error with context.
    pub fn config(msg: impl Into<String>) -> Self {
        CliError::Config(msg.into())
    }
}

/// CLI result type.
pub type CliResult<T> = Result<T, CliError>;

//! Driver error types.

use thiserror::Error;

/// Result type for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// Errors reported by a database driver.
///
/// These are passed through unchanged; nothing in this crate retries them.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The connection could not be opened.
    #[error("failed to open connection: {0}")]
    Open(String),

    /// The connection is not open.
    #[error("connection is closed")]
    Closed,

    /// Begin, commit or rollback failed.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// An administrative statement failed.
    #[error("statement failed: {0}")]
    Statement(String),

    /// Any other driver-specific failure.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl DriverError {
    /// Wrap an arbitrary driver error.
    pub fn other<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Other(Box::new(err))
    }
}

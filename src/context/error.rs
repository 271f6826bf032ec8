//! Data context error types.

use thiserror::Error;

use crate::connection::DriverError;
use crate::context::manager::{ContextId, TransactionId};

/// Result type for data context operations.
pub type ContextResult<T> = Result<T, ContextError>;

/// Errors that can occur while managing units of work.
#[derive(Debug, Error)]
pub enum ContextError {
    /// Driver error, passed through unchanged.
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    /// The data context was closed.
    #[error("data context {context} is closed")]
    ContextClosed { context: ContextId },

    /// The connection is lent out to a `with_connection` closure.
    #[error("connection of data context {context} is in use")]
    ConnectionInUse { context: ContextId },

    /// The unit of work was already saved or abandoned.
    #[error("unit of work on transaction {transaction} already {}", outcome(.completed))]
    ScopeFinalized {
        transaction: TransactionId,
        completed: bool,
    },

    /// The unit of work belongs to a different data context.
    #[error("unit of work belongs to data context {owner}, not {context}")]
    ForeignScope { owner: ContextId, context: ContextId },

    /// Another unit of work on the same transaction was abandoned, so the
    /// whole transaction was rolled back.
    #[error("transaction {transaction} was rolled back by an abandoned unit of work")]
    RolledBack { transaction: TransactionId },
}

fn outcome(completed: &bool) -> &'static str {
    if *completed {
        "saved"
    } else {
        "abandoned"
    }
}

impl ContextError {
    /// Check if this error is a programming mistake rather than a driver failure.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            ContextError::ContextClosed { .. }
                | ContextError::ConnectionInUse { .. }
                | ContextError::ScopeFinalized { .. }
                | ContextError::ForeignScope { .. }
        )
    }
}

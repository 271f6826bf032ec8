//! Transaction isolation levels.
//!
//! The level is chosen once per data context and passed to the driver every
//! time the context opens a new physical transaction. Nested scopes always
//! share the outer transaction and therefore its level.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Transaction isolation level requested from the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    /// Dirty reads allowed.
    ReadUncommitted,

    /// Each read sees data committed before the read started.
    #[default]
    ReadCommitted,

    /// Rows read once cannot change until the transaction ends.
    RepeatableRead,

    /// Full serializability; may block or fail with a serialization error.
    Serializable,

    /// Row-versioned snapshot of the database as of transaction start.
    Snapshot,
}

impl IsolationLevel {
    /// Check if this isolation level reads from a snapshot.
    pub fn uses_snapshot(&self) -> bool {
        matches!(self, IsolationLevel::Snapshot)
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IsolationLevel::ReadUncommitted => write!(f, "READ UNCOMMITTED"),
            IsolationLevel::ReadCommitted => write!(f, "READ COMMITTED"),
            IsolationLevel::RepeatableRead => write!(f, "REPEATABLE READ"),
            IsolationLevel::Serializable => write!(f, "SERIALIZABLE"),
            IsolationLevel::Snapshot => write!(f, "SNAPSHOT"),
        }
    }
}

/// Parse isolation level from string (SQL syntax).
impl std::str::FromStr for IsolationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().replace(['_', '-'], " ").as_str() {
            "READ UNCOMMITTED" => Ok(IsolationLevel::ReadUncommitted),
            "READ COMMITTED" => Ok(IsolationLevel::ReadCommitted),
            "REPEATABLE READ" => Ok(IsolationLevel::RepeatableRead),
            "SERIALIZABLE" => Ok(IsolationLevel::Serializable),
            "SNAPSHOT" => Ok(IsolationLevel::Snapshot),
            _ => Err(format!("unknown isolation level: {}", s)),
        }
    }
}

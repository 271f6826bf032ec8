//! Connection provider interface.
//!
//! The transaction scope manager never talks to a database directly. It
//! needs an open connection that can begin a transaction and can be closed,
//! and a transaction that can be committed or rolled back. Drivers plug in
//! by implementing the traits below.
//!
//! ```text
//!  ConnectionFactory ──opens──▶ Connection ──begins──▶ Transaction
//!        ▲                          ▲
//!        │                          │
//!  DriverConnectionFactory    EncryptedConnection (optional key session)
//! ```

mod encrypted;
mod error;
mod factory;

use std::fmt;

use crate::context::IsolationLevel;

pub use encrypted::{
    EncryptedConnection, EncryptedConnectionFactory, KeyStatements, SecurityContext,
    SecurityContextAccessor, StaticSecurityContext,
};
pub use error::{DriverError, DriverResult};
pub use factory::{ConnectionFactory, Driver, DriverConnectionFactory};

/// Observable state of a driver connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Open,
    /// The connection failed and can only be closed.
    Broken,
}

impl ConnectionState {
    /// Check if the connection can run statements.
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Closed => write!(f, "closed"),
            ConnectionState::Open => write!(f, "open"),
            ConnectionState::Broken => write!(f, "broken"),
        }
    }
}

/// A physical database transaction.
///
/// Both outcomes consume the transaction; dropping it disposes the driver
/// resources.
pub trait Transaction: Send {
    /// Make the transaction's changes durable.
    fn commit(self: Box<Self>) -> DriverResult<()>;

    /// Discard the transaction's changes.
    fn rollback(self: Box<Self>) -> DriverResult<()>;
}

/// An open database connection.
pub trait Connection: Send {
    /// Begin a transaction on this connection.
    fn begin_transaction(&mut self, isolation: IsolationLevel)
        -> DriverResult<Box<dyn Transaction>>;

    /// Close the connection. Closing a closed connection is a no-op.
    fn close(&mut self) -> DriverResult<()>;

    /// Current connection state.
    fn state(&self) -> ConnectionState;
}

/// Connections able to run a single administrative statement.
pub trait Command {
    fn execute(&mut self, statement: &str) -> DriverResult<()>;
}

impl<T: Connection + ?Sized> Connection for Box<T> {
    fn begin_transaction(
        &mut self,
        isolation: IsolationLevel,
    ) -> DriverResult<Box<dyn Transaction>> {
        (**self).begin_transaction(isolation)
    }

    fn close(&mut self) -> DriverResult<()> {
        (**self).close()
    }

    fn state(&self) -> ConnectionState {
        (**self).state()
    }
}

impl<T: Command + ?Sized> Command for Box<T> {
    fn execute(&mut self, statement: &str) -> DriverResult<()> {
        (**self).execute(statement)
    }
}

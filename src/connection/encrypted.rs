//! Symmetric key sessions for column-level encryption.
//!
//! An [`EncryptedConnection`] opens a named symmetric key right after the
//! underlying connection is opened and closes it again before the connection
//! is closed. The statements themselves are driver specific and come from a
//! [`KeyStatements`] implementation.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::{
    Command, Connection, ConnectionFactory, ConnectionState, Driver, DriverResult, Transaction,
};
use crate::context::IsolationLevel;

/// Encryption requirements for a connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityContext {
    /// Whether the key session should be opened at all.
    pub encrypted: bool,
    /// Symmetric key name.
    pub key_name: String,
    /// Certificate used to decrypt the key.
    pub certificate: String,
}

impl SecurityContext {
    /// Create a context that opens `key_name` with `certificate`.
    pub fn encrypted(key_name: impl Into<String>, certificate: impl Into<String>) -> Self {
        Self {
            encrypted: true,
            key_name: key_name.into(),
            certificate: certificate.into(),
        }
    }

    /// Create a context that opens no key.
    pub fn plain() -> Self {
        Self::default()
    }
}

/// Supplies the security context in effect when a connection is opened.
pub trait SecurityContextAccessor: Send + Sync {
    fn security_context(&self) -> SecurityContext;
}

/// Accessor that always returns the same context.
#[derive(Debug, Clone)]
pub struct StaticSecurityContext(pub SecurityContext);

impl SecurityContextAccessor for StaticSecurityContext {
    fn security_context(&self) -> SecurityContext {
        self.0.clone()
    }
}

/// Driver-specific text of the key session statements.
pub trait KeyStatements: Send + Sync {
    /// Statement that opens the key named by `context`.
    fn open_key(&self, context: &SecurityContext) -> String;

    /// Statement that closes the key named by `context`.
    fn close_key(&self, context: &SecurityContext) -> String;
}

/// A connection that holds a symmetric key open for its lifetime.
pub struct EncryptedConnection<C: Connection + Command> {
    inner: C,
    context: SecurityContext,
    statements: Arc<dyn KeyStatements>,
    key_open: bool,
}

impl<C: Connection + Command> EncryptedConnection<C> {
    /// Wrap an already-open connection and open the key on it.
    pub fn open(
        inner: C,
        context: SecurityContext,
        statements: Arc<dyn KeyStatements>,
    ) -> DriverResult<Self> {
        let mut connection = Self {
            inner,
            context,
            statements,
            key_open: false,
        };
        connection.open_key()?;
        Ok(connection)
    }

    /// Open the key if the context asks for encryption and the connection is open.
    pub fn open_key(&mut self) -> DriverResult<()> {
        if self.key_open || !self.context.encrypted || !self.inner.state().is_open() {
            return Ok(());
        }

        let statement = self.statements.open_key(&self.context);
        self.inner.execute(&statement)?;
        self.key_open = true;
        debug!("opened symmetric key {}", self.context.key_name);
        Ok(())
    }

    /// Close the key if this wrapper opened it.
    pub fn close_key(&mut self) -> DriverResult<()> {
        if !self.key_open {
            return Ok(());
        }
        // The key is considered closed even if the statement fails.
        self.key_open = false;

        if self.context.encrypted && self.inner.state().is_open() {
            let statement = self.statements.close_key(&self.context);
            self.inner.execute(&statement)?;
            debug!("closed symmetric key {}", self.context.key_name);
        }
        Ok(())
    }

    /// Check if the key is currently open on this connection.
    pub fn is_key_open(&self) -> bool {
        self.key_open
    }

    /// Get the security context the key session was opened with.
    pub fn security_context(&self) -> &SecurityContext {
        &self.context
    }

    /// Get a reference to the underlying connection.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Get a mutable reference to the underlying connection.
    ///
    /// Closing it directly skips the close-key statement later on.
    pub fn inner_mut(&mut self) -> &mut C {
        &mut self.inner
    }
}

impl<C: Connection + Command> Connection for EncryptedConnection<C> {
    fn begin_transaction(
        &mut self,
        isolation: IsolationLevel,
    ) -> DriverResult<Box<dyn Transaction>> {
        self.inner.begin_transaction(isolation)
    }

    fn close(&mut self) -> DriverResult<()> {
        let key = self.close_key();
        let connection = self.inner.close();
        key.and(connection)
    }

    fn state(&self) -> ConnectionState {
        self.inner.state()
    }
}

impl<C: Connection + Command> Command for EncryptedConnection<C> {
    fn execute(&mut self, statement: &str) -> DriverResult<()> {
        self.inner.execute(statement)
    }
}

impl<C: Connection + Command> Drop for EncryptedConnection<C> {
    fn drop(&mut self) {
        if let Err(e) = self.close_key() {
            warn!("failed to close symmetric key {}: {}", self.context.key_name, e);
        }
    }
}

/// Factory opening driver connections wrapped in a key session.
pub struct EncryptedConnectionFactory<D> {
    driver: D,
    connection_string: String,
    accessor: Arc<dyn SecurityContextAccessor>,
    statements: Arc<dyn KeyStatements>,
}

impl<D> EncryptedConnectionFactory<D>
where
    D: Driver,
    D::Connection: Command,
{
    /// Create a new factory opening `connection_string` through `driver`.
    pub fn new(
        driver: D,
        connection_string: impl Into<String>,
        accessor: Arc<dyn SecurityContextAccessor>,
        statements: Arc<dyn KeyStatements>,
    ) -> Self {
        Self {
            driver,
            connection_string: connection_string.into(),
            accessor,
            statements,
        }
    }

    fn wrap(&self, connection: D::Connection) -> DriverResult<Box<dyn Connection>> {
        let context = self.accessor.security_context();
        let encrypted = EncryptedConnection::open(connection, context, self.statements.clone())?;
        Ok(Box::new(encrypted))
    }
}

#[async_trait]
impl<D> ConnectionFactory for EncryptedConnectionFactory<D>
where
    D: Driver,
    D::Connection: Command,
{
    fn connection(&self) -> DriverResult<Box<dyn Connection>> {
        let connection = self.driver.connect(&self.connection_string)?;
        self.wrap(connection)
    }

    async fn connection_async(&self) -> DriverResult<Box<dyn Connection>> {
        let connection = self.driver.connect_async(&self.connection_string).await?;
        self.wrap(connection)
    }
}

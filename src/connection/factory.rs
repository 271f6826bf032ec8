//! Connection factories.

use async_trait::async_trait;

use super::{Connection, DriverResult};

/// Opens ready-to-use connections.
///
/// Both methods hand back a connection that is already open.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Open a connection, blocking until it is ready.
    fn connection(&self) -> DriverResult<Box<dyn Connection>>;

    /// Open a connection without blocking the scheduler thread.
    async fn connection_async(&self) -> DriverResult<Box<dyn Connection>>;
}

/// A database driver: turns a connection string into an open connection.
#[async_trait]
pub trait Driver: Send + Sync {
    type Connection: Connection + 'static;

    /// Open a connection.
    fn connect(&self, connection_string: &str) -> DriverResult<Self::Connection>;

    /// Open a connection without blocking the caller.
    async fn connect_async(&self, connection_string: &str) -> DriverResult<Self::Connection>;
}

/// Factory opening plain driver connections from a fixed connection string.
pub struct DriverConnectionFactory<D> {
    driver: D,
    connection_string: String,
}

impl<D: Driver> DriverConnectionFactory<D> {
    /// Create a new factory opening `connection_string` through `driver`.
    pub fn new(driver: D, connection_string: impl Into<String>) -> Self {
        Self {
            driver,
            connection_string: connection_string.into(),
        }
    }

    /// Get a reference to the driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }
}

#[async_trait]
impl<D: Driver> ConnectionFactory for DriverConnectionFactory<D> {
    fn connection(&self) -> DriverResult<Box<dyn Connection>> {
        let connection = self.driver.connect(&self.connection_string)?;
        Ok(Box::new(connection))
    }

    async fn connection_async(&self) -> DriverResult<Box<dyn Connection>> {
        let connection = self.driver.connect_async(&self.connection_string).await?;
        Ok(Box::new(connection))
    }
}

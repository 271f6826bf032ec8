//! Data context configuration.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::connection::{
    Command, ConnectionFactory, Driver, DriverConnectionFactory, EncryptedConnectionFactory,
    KeyStatements, SecurityContext, StaticSecurityContext,
};
use crate::context::IsolationLevel;

/// Errors loading a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Data context configuration options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Driver connection string.
    pub connection_string: String,
    /// Isolation level for every transaction the context opens.
    pub isolation: IsolationLevel,
    /// Symmetric key session settings.
    pub encryption: SecurityContext,
}

impl ContextConfig {
    /// Create a new configuration with the given connection string.
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            ..Default::default()
        }
    }

    /// Set the isolation level.
    pub fn isolation(mut self, value: IsolationLevel) -> Self {
        self.isolation = value;
        self
    }

    /// Set the symmetric key session settings.
    pub fn encryption(mut self, value: SecurityContext) -> Self {
        self.encryption = value;
        self
    }

    /// Parse a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.connection_string.trim().is_empty() {
            return Err(ConfigError::Invalid("connection_string is empty".into()));
        }
        if self.encryption.encrypted
            && (self.encryption.key_name.is_empty() || self.encryption.certificate.is_empty())
        {
            return Err(ConfigError::Invalid(
                "encryption requires key_name and certificate".into(),
            ));
        }
        Ok(())
    }

    /// Build a factory opening plain driver connections.
    pub fn connection_factory<D: Driver + 'static>(&self, driver: D) -> Box<dyn ConnectionFactory> {
        Box::new(DriverConnectionFactory::new(
            driver,
            self.connection_string.clone(),
        ))
    }

    /// Build a factory that opens the configured symmetric key on every
    /// connection.
    pub fn encrypted_connection_factory<D>(
        &self,
        driver: D,
        statements: Arc<dyn KeyStatements>,
    ) -> Box<dyn ConnectionFactory>
    where
        D: Driver + 'static,
        D::Connection: Command,
    {
        Box::new(EncryptedConnectionFactory::new(
            driver,
            self.connection_string.clone(),
            Arc::new(StaticSecurityContext(self.encryption.clone())),
            statements,
        ))
    }
}

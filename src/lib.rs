//! scopedtx - nested units of work over one connection and one transaction.
//!
//! Code at different call depths can each ask for a transaction without
//! knowing whether one is already open. The outermost unit of work opens the
//! transaction, nested ones join it, the last one saved commits it, and any
//! unit of work abandoned along the way rolls the whole thing back.
//!
//! # Example
//!
//! ```ignore
//! use scopedtx::{ContextConfig, DataContext};
//!
//! let config = ContextConfig::from_file("db.json")?;
//! let factory = config.connection_factory(driver);
//! let context = DataContext::with_config(&*factory, &config)?;
//!
//! context.scoped(|ctx| {
//!     ctx.with_connection(|conn| { /* ... */ })?;
//!     Ok::<_, scopedtx::ContextError>(())
//! })?;
//! ```

pub mod config;
pub mod connection;
pub mod context;

#[cfg(test)]
mod testing;

pub use config::{ConfigError, ContextConfig};
pub use connection::{
    Command, Connection, ConnectionFactory, ConnectionState, Driver, DriverConnectionFactory,
    DriverError, DriverResult, EncryptedConnection, EncryptedConnectionFactory, KeyStatements,
    SecurityContext, SecurityContextAccessor, StaticSecurityContext, Transaction,
};
pub use context::{
    ContextError, ContextId, ContextResult, DataContext, IsolationLevel, TransactionId,
    TransactionInfo, UnitOfWork,
};

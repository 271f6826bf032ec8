//! Nested units of work on one connection.
//!
//! A [`DataContext`] owns a single connection. Every call to
//! [`DataContext::begin_scope`] hands out a [`UnitOfWork`]; the first one
//! opens a transaction, nested ones join it. The transaction commits when the
//! last outstanding unit of work is saved, and rolls back as soon as any unit
//! of work is abandoned.
//!
//! ```text
//!          begin_scope                 begin_scope
//!  Idle(0) ───────────▶ InTransaction(1) ─────────▶ InTransaction(n + 1)
//!    ▲                        │   ▲                        │
//!    │  save_changes (n = 1)  │   └──── save_changes ──────┘
//!    ├──── commit ────────────┘
//!    └──── rollback ◀── abandon / drop unsaved (any depth)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use scopedtx::{DataContext, DriverConnectionFactory};
//!
//! let factory = DriverConnectionFactory::new(driver, "Server=db;Database=app");
//! let context = DataContext::new(&factory)?;
//!
//! let mut outer = context.begin_scope()?;
//! {
//!     let mut inner = context.begin_scope()?;
//!     // ... work on the shared transaction ...
//!     inner.save_changes()?; // commit deferred
//! }
//! outer.save_changes()?; // commits
//! ```

mod error;
mod isolation;
mod manager;
mod scope;

pub use error::{ContextError, ContextResult};
pub use isolation::IsolationLevel;
pub use manager::{ContextId, DataContext, TransactionId, TransactionInfo};
pub use scope::UnitOfWork;

//! Data context - shares one connection and one transaction across nested
//! units of work.
//!
//! The DataContext is the main entry point. It handles:
//! - Opening the physical transaction for the outermost unit of work
//! - Counting how many units of work are still outstanding
//! - Committing once the outermost unit of work is saved
//! - Rolling back everything as soon as any unit of work is abandoned

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use parking_lot::Mutex;
use ulid::Ulid;

use crate::config::ContextConfig;
use crate::connection::{Connection, ConnectionFactory, ConnectionState, Transaction};
use crate::context::error::{ContextError, ContextResult};
use crate::context::isolation::IsolationLevel;
use crate::context::scope::UnitOfWork;

/// Identifies a data context in logs and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(Ulid);

impl ContextId {
    pub(crate) fn new() -> Self {
        Self(Ulid::new())
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_string().to_lowercase())
    }
}

/// Identifies one physical transaction opened by a data context.
///
/// A fresh id is minted every time the context opens a transaction, so two
/// units of work share a transaction exactly when their ids are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(Ulid);

impl TransactionId {
    pub(crate) fn new() -> Self {
        Self(Ulid::new())
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx/{}", self.0.to_string().to_lowercase())
    }
}

/// Snapshot of the active transaction.
#[derive(Debug, Clone)]
pub struct TransactionInfo {
    pub id: TransactionId,
    pub isolation: IsolationLevel,
    pub started_at: DateTime<Utc>,
    /// Units of work currently sharing the transaction.
    pub depth: usize,
}

struct ActiveTransaction {
    id: TransactionId,
    started_at: DateTime<Utc>,
    transaction: Box<dyn Transaction>,
}

struct ContextState {
    /// `None` once closed, or while lent to a `with_connection` closure.
    connection: Option<Box<dyn Connection>>,
    lent: bool,
    /// `None` exactly when `depth == 0`.
    active: Option<ActiveTransaction>,
    depth: usize,
    closed: bool,
}

impl ContextState {
    fn is_current(&self, transaction: TransactionId) -> bool {
        self.active.as_ref().is_some_and(|active| active.id == transaction)
    }
}

pub(crate) struct ContextInner {
    id: ContextId,
    isolation: IsolationLevel,
    state: Mutex<ContextState>,
}

impl ContextInner {
    fn begin(self: &Arc<Self>) -> ContextResult<UnitOfWork> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.closed {
            return Err(ContextError::ContextClosed { context: self.id });
        }

        let existing = state.active.as_ref().map(|active| active.id);
        let transaction = match existing {
            Some(id) => id,
            None => {
                let connection = match state.connection.as_mut() {
                    Some(connection) => connection,
                    None if state.lent => {
                        return Err(ContextError::ConnectionInUse { context: self.id })
                    }
                    None => return Err(ContextError::ContextClosed { context: self.id }),
                };
                // Depth is only bumped once the driver has handed out a transaction.
                let transaction = connection.begin_transaction(self.isolation)?;
                let id = TransactionId::new();
                state.active = Some(ActiveTransaction {
                    id,
                    started_at: Utc::now(),
                    transaction,
                });
                debug!("context {}: began {} ({})", self.id, id, self.isolation);
                id
            }
        };

        state.depth += 1;
        debug!("context {}: unit of work entered, depth {}", self.id, state.depth);

        Ok(UnitOfWork::new(Arc::downgrade(self), self.id, transaction))
    }

    /// Complete one unit of work on `transaction`.
    pub(crate) fn complete(&self, transaction: TransactionId) -> ContextResult<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(ContextError::ContextClosed { context: self.id });
        }
        if !state.is_current(transaction) {
            return Err(ContextError::RolledBack { transaction });
        }

        state.depth -= 1;
        if state.depth > 0 {
            debug!(
                "context {}: unit of work saved, commit deferred at depth {}",
                self.id, state.depth
            );
            return Ok(());
        }

        // Cleared before committing so a failed commit leaves the context usable.
        if let Some(active) = state.active.take() {
            active.transaction.commit()?;
            debug!("context {}: committed {}", self.id, active.id);
        }
        Ok(())
    }

    /// Abandon one unit of work on `transaction`, rolling back the whole nesting.
    ///
    /// Stale transactions and closed contexts are ignored.
    pub(crate) fn abandon(&self, transaction: TransactionId) -> ContextResult<()> {
        let mut state = self.state.lock();
        if state.closed || !state.is_current(transaction) {
            return Ok(());
        }

        debug!(
            "context {}: unit of work abandoned at depth {}, rolling back {}",
            self.id, state.depth, transaction
        );
        state.depth = 0;
        if let Some(active) = state.active.take() {
            active.transaction.rollback()?;
        }
        Ok(())
    }

    fn close(&self) -> ContextResult<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Ok(());
        }
        state.closed = true;
        state.depth = 0;

        let rollback = match state.active.take() {
            Some(active) => {
                debug!("context {}: closing, rolling back {}", self.id, active.id);
                active.transaction.rollback()
            }
            None => Ok(()),
        };
        let close = match state.connection.take() {
            Some(mut connection) => connection.close(),
            None => Ok(()),
        };
        debug!("context {}: closed", self.id);

        rollback.and(close).map_err(ContextError::from)
    }
}

/// Puts a connection lent by `with_connection` back, even if the closure
/// panics. A context closed in the meantime gets its connection closed here.
struct LentConnection<'a> {
    inner: &'a ContextInner,
    connection: Option<Box<dyn Connection>>,
}

impl Drop for LentConnection<'_> {
    fn drop(&mut self) {
        let Some(mut connection) = self.connection.take() else {
            return;
        };
        let mut state = self.inner.state.lock();
        state.lent = false;
        if !state.closed {
            state.connection = Some(connection);
            return;
        }
        drop(state);

        if let Err(e) = connection.close() {
            warn!("context {}: error closing returned connection: {}", self.inner.id, e);
        }
        debug!("context {}: connection closed on return", self.inner.id);
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("context {}: error while closing: {}", self.id, e);
        }
    }
}

/// A data context on one database connection.
///
/// Cheap to clone: clones share the connection, the transaction and the
/// nesting depth. The connection is closed by [`DataContext::close`] or when
/// the last clone is dropped. Not meant for parallel use; nesting models a
/// call stack re-entering the context, not concurrent workers.
#[derive(Clone)]
pub struct DataContext {
    inner: Arc<ContextInner>,
}

impl DataContext {
    /// Create a data context on a freshly opened connection.
    pub fn new(factory: &dyn ConnectionFactory) -> ContextResult<Self> {
        let connection = factory.connection()?;
        Ok(Self::from_connection(connection, IsolationLevel::default()))
    }

    /// Create a data context using the isolation level from `config`.
    pub fn with_config(
        factory: &dyn ConnectionFactory,
        config: &ContextConfig,
    ) -> ContextResult<Self> {
        let connection = factory.connection()?;
        Ok(Self::from_connection(connection, config.isolation))
    }

    /// Create a data context, opening the connection asynchronously.
    pub async fn open_async(factory: &dyn ConnectionFactory) -> ContextResult<Self> {
        let connection = factory.connection_async().await?;
        Ok(Self::from_connection(connection, IsolationLevel::default()))
    }

    /// Asynchronous counterpart of [`DataContext::with_config`].
    pub async fn open_async_with_config(
        factory: &dyn ConnectionFactory,
        config: &ContextConfig,
    ) -> ContextResult<Self> {
        let connection = factory.connection_async().await?;
        Ok(Self::from_connection(connection, config.isolation))
    }

    /// Take ownership of an already-open connection.
    pub fn from_connection(connection: Box<dyn Connection>, isolation: IsolationLevel) -> Self {
        let id = ContextId::new();
        debug!("context {}: created", id);
        Self {
            inner: Arc::new(ContextInner {
                id,
                isolation,
                state: Mutex::new(ContextState {
                    connection: Some(connection),
                    lent: false,
                    active: None,
                    depth: 0,
                    closed: false,
                }),
            }),
        }
    }

    /// Get the context id.
    pub fn id(&self) -> ContextId {
        self.inner.id
    }

    /// Get the isolation level used for every transaction.
    pub fn isolation(&self) -> IsolationLevel {
        self.inner.isolation
    }

    /// Number of outstanding units of work sharing the active transaction.
    pub fn depth(&self) -> usize {
        self.inner.state.lock().depth
    }

    /// Check if the context has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Id of the active transaction, if any.
    pub fn transaction_id(&self) -> Option<TransactionId> {
        self.inner.state.lock().active.as_ref().map(|active| active.id)
    }

    /// Get details of the active transaction.
    pub fn transaction_info(&self) -> Option<TransactionInfo> {
        let state = self.inner.state.lock();
        state.active.as_ref().map(|active| TransactionInfo {
            id: active.id,
            isolation: self.inner.isolation,
            started_at: active.started_at,
            depth: state.depth,
        })
    }

    /// State of the owned connection; `Closed` once it has been released.
    ///
    /// A connection lent to [`DataContext::with_connection`] reports `Open`.
    pub fn connection_state(&self) -> ConnectionState {
        let state = self.inner.state.lock();
        match state.connection.as_ref() {
            Some(connection) => connection.state(),
            None if state.lent && !state.closed => ConnectionState::Open,
            None => ConnectionState::Closed,
        }
    }

    /// Begin a new unit of work.
    ///
    /// The outermost unit of work opens a transaction; nested ones join it.
    pub fn begin_scope(&self) -> ContextResult<UnitOfWork> {
        self.inner.begin()
    }

    /// Save a unit of work that was begun on this context.
    pub fn complete_scope(&self, scope: &mut UnitOfWork) -> ContextResult<()> {
        self.check_owner(scope)?;
        scope.save_changes()
    }

    /// Abandon a unit of work, rolling back the whole transaction.
    pub fn abandon_scope(&self, scope: UnitOfWork) -> ContextResult<()> {
        self.check_owner(&scope)?;
        scope.abandon()
    }

    fn check_owner(&self, scope: &UnitOfWork) -> ContextResult<()> {
        if scope.context_id() != self.id() {
            return Err(ContextError::ForeignScope {
                owner: scope.context_id(),
                context: self.id(),
            });
        }
        Ok(())
    }

    /// Roll back any active transaction and close the connection.
    ///
    /// Outstanding units of work become inert. Calling this again is a no-op.
    pub fn close(&self) -> ContextResult<()> {
        self.inner.close()
    }

    /// Run `f` against the owned connection.
    ///
    /// The connection is lent to `f` without holding the context lock, so `f`
    /// may save, abandon or drop units of work and query the context. While
    /// it is lent, anything that needs the connection itself (opening a
    /// transaction, a nested `with_connection`) fails with
    /// [`ContextError::ConnectionInUse`]. Closing the context from inside `f`
    /// closes the connection once `f` returns.
    pub fn with_connection<F, T>(&self, f: F) -> ContextResult<T>
    where
        F: FnOnce(&mut dyn Connection) -> T,
    {
        let mut lent = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return Err(ContextError::ContextClosed { context: self.id() });
            }
            match state.connection.take() {
                Some(connection) => {
                    state.lent = true;
                    LentConnection {
                        inner: &self.inner,
                        connection: Some(connection),
                    }
                }
                None => return Err(ContextError::ConnectionInUse { context: self.id() }),
            }
        };

        match lent.connection.as_mut() {
            Some(connection) => Ok(f(&mut **connection)),
            None => Err(ContextError::ConnectionInUse { context: self.id() }),
        }
    }

    /// Execute a function within a unit of work.
    ///
    /// If the function returns Ok, the unit of work is saved.
    /// If the function returns Err, the whole transaction is rolled back.
    pub fn scoped<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&DataContext) -> Result<T, E>,
        E: From<ContextError>,
    {
        let mut scope = self.begin_scope()?;

        match f(self) {
            Ok(value) => {
                scope.save_changes()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = scope.abandon() {
                    warn!("context {}: rollback failed: {}", self.id(), rollback);
                }
                Err(e)
            }
        }
    }
}

impl fmt::Debug for DataContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("DataContext")
            .field("id", &self.inner.id)
            .field("depth", &state.depth)
            .field("closed", &state.closed)
            .finish()
    }
}

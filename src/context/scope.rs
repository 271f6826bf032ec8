//! Unit of work handles.

use std::fmt;
use std::sync::Weak;

use log::warn;

use crate::context::error::{ContextError, ContextResult};
use crate::context::manager::{ContextId, ContextInner, TransactionId};

/// One nested unit of work on a [`DataContext`](crate::DataContext).
///
/// A unit of work ends exactly once: either it is saved with
/// [`save_changes`](UnitOfWork::save_changes), or it is abandoned, explicitly
/// through [`abandon`](UnitOfWork::abandon) or implicitly when dropped
/// unsaved. Abandoning any unit of work rolls back the whole transaction,
/// including work done by the units of work around it.
#[must_use = "an unsaved unit of work rolls back when dropped"]
pub struct UnitOfWork {
    context: Weak<ContextInner>,
    context_id: ContextId,
    transaction: TransactionId,
    completed: bool,
    finalized: bool,
}

impl UnitOfWork {
    pub(crate) fn new(
        context: Weak<ContextInner>,
        context_id: ContextId,
        transaction: TransactionId,
    ) -> Self {
        Self {
            context,
            context_id,
            transaction,
            completed: false,
            finalized: false,
        }
    }

    /// Save all changes.
    ///
    /// Commits only when this is the last outstanding unit of work on the
    /// transaction. Fails if this unit of work already ended, if the context
    /// was closed, or if a sibling abandoned the transaction.
    pub fn save_changes(&mut self) -> ContextResult<()> {
        self.ensure_pending()?;
        self.finalized = true;
        self.completed = true;

        match self.context.upgrade() {
            Some(context) => context.complete(self.transaction),
            None => Err(ContextError::ContextClosed {
                context: self.context_id,
            }),
        }
    }

    /// Abandon this unit of work, rolling back the whole transaction.
    ///
    /// Same as dropping it unsaved, except that a rollback failure is returned.
    pub fn abandon(mut self) -> ContextResult<()> {
        self.ensure_pending()?;
        self.finalized = true;

        match self.context.upgrade() {
            Some(context) => context.abandon(self.transaction),
            None => Ok(()),
        }
    }

    fn ensure_pending(&self) -> ContextResult<()> {
        if self.finalized {
            return Err(ContextError::ScopeFinalized {
                transaction: self.transaction,
                completed: self.completed,
            });
        }
        Ok(())
    }

    /// Get the id of the transaction this unit of work joined.
    pub fn transaction_id(&self) -> TransactionId {
        self.transaction
    }

    /// Get the id of the owning data context.
    pub fn context_id(&self) -> ContextId {
        self.context_id
    }

    /// Whether `save_changes` was called.
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Whether this unit of work has already ended.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Whether the owning context has been dropped.
    pub fn is_detached(&self) -> bool {
        self.context.strong_count() == 0
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        if self.finalized {
            return;
        }
        self.finalized = true;

        if let Some(context) = self.context.upgrade() {
            if let Err(e) = context.abandon(self.transaction) {
                warn!(
                    "context {}: rollback of abandoned unit of work failed: {}",
                    self.context_id, e
                );
            }
        }
    }
}

impl fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("context", &self.context_id)
            .field("transaction", &self.transaction)
            .field("completed", &self.completed)
            .field("finalized", &self.finalized)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::connection::DriverConnectionFactory;
    use crate::context::{ContextError, DataContext};
    use crate::testing::{init_logging, MockDriver};

    fn setup() -> (MockDriver, DataContext) {
        init_logging();
        let driver = MockDriver::new();
        let factory = DriverConnectionFactory::new(driver.clone(), "Server=local");
        let context = DataContext::new(&factory).unwrap();
        (driver, context)
    }

    #[test]
    fn test_double_save_fails() {
        let (driver, context) = setup();

        let mut uow = context.begin_scope().unwrap();
        uow.save_changes().unwrap();

        let err = uow.save_changes().unwrap_err();
        assert!(matches!(
            err,
            ContextError::ScopeFinalized {
                completed: true,
                ..
            }
        ));
        assert!(err.is_usage_error());
        assert_eq!(driver.calls().commits(), 1);
    }

    #[test]
    fn test_double_save_of_nested_scope_does_not_commit_outer() {
        let (driver, context) = setup();

        let _outer = context.begin_scope().unwrap();
        let mut inner = context.begin_scope().unwrap();
        inner.save_changes().unwrap();

        assert!(inner.save_changes().is_err());
        assert_eq!(context.depth(), 1);
        assert_eq!(driver.calls().commits(), 0);
    }

    #[test]
    fn test_save_after_close_fails() {
        let (_driver, context) = setup();

        let mut uow = context.begin_scope().unwrap();
        context.close().unwrap();

        let err = uow.save_changes().unwrap_err();
        assert!(matches!(err, ContextError::ContextClosed { .. }));
    }

    #[test]
    fn test_save_after_context_dropped_fails() {
        let (driver, context) = setup();

        let mut uow = context.begin_scope().unwrap();
        drop(context);

        assert!(uow.is_detached());
        let err = uow.save_changes().unwrap_err();
        assert!(matches!(err, ContextError::ContextClosed { .. }));
        assert_eq!(driver.calls().commits(), 0);
    }

    #[test]
    fn test_abandon_after_save_fails() {
        let (driver, context) = setup();

        let mut uow = context.begin_scope().unwrap();
        uow.save_changes().unwrap();

        let err = uow.abandon().unwrap_err();
        assert!(matches!(err, ContextError::ScopeFinalized { .. }));
        assert_eq!(driver.calls().rollbacks(), 0);
    }

    #[test]
    fn test_flags() {
        let (_driver, context) = setup();

        let mut uow = context.begin_scope().unwrap();
        assert!(!uow.is_completed());
        assert!(!uow.is_finalized());
        assert_eq!(uow.context_id(), context.id());

        uow.save_changes().unwrap();
        assert!(uow.is_completed());
        assert!(uow.is_finalized());
    }

    #[test]
    fn test_rollback_on_early_return() {
        let (driver, context) = setup();

        fn work(context: &DataContext, fail: bool) -> Result<(), String> {
            let mut uow = context.begin_scope().map_err(|e| e.to_string())?;
            if fail {
                return Err("validation failed".to_string());
            }
            uow.save_changes().map_err(|e| e.to_string())
        }

        assert!(work(&context, true).is_err());
        assert_eq!(driver.calls().rollbacks(), 1);

        work(&context, false).unwrap();
        assert_eq!(driver.calls().commits(), 1);
    }

    #[test]
    fn test_rollback_on_panic() {
        let (driver, context) = setup();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _uow = context.begin_scope().unwrap();
            panic!("unit of work failed");
        }));

        assert!(result.is_err());
        assert_eq!(driver.calls().rollbacks(), 1);
        assert_eq!(context.depth(), 0);
    }
}

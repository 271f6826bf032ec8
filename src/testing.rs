//! Recording mock driver shared by the unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::connection::{
    Command, Connection, ConnectionState, Driver, DriverError, DriverResult, KeyStatements,
    SecurityContext, Transaction,
};
use crate::context::IsolationLevel;

pub(crate) fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Counts every driver call and lets tests inject failures.
#[derive(Debug, Default)]
pub(crate) struct Calls {
    opens: AtomicUsize,
    begins: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    disposes: AtomicUsize,
    closes: AtomicUsize,
    connection_strings: Mutex<Vec<String>>,
    isolations: Mutex<Vec<IsolationLevel>>,
    statements: Mutex<Vec<String>>,
    fail_open: AtomicBool,
    fail_begin: AtomicBool,
    fail_commit: AtomicBool,
    fail_rollback: AtomicBool,
    fail_statement: AtomicBool,
}

impl Calls {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn begins(&self) -> usize {
        self.begins.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }

    pub fn disposes(&self) -> usize {
        self.disposes.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn connection_strings(&self) -> Vec<String> {
        self.connection_strings.lock().clone()
    }

    pub fn isolations(&self) -> Vec<IsolationLevel> {
        self.isolations.lock().clone()
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().clone()
    }

    pub fn fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn fail_begin(&self, fail: bool) {
        self.fail_begin.store(fail, Ordering::SeqCst);
    }

    pub fn fail_commit(&self, fail: bool) {
        self.fail_commit.store(fail, Ordering::SeqCst);
    }

    pub fn fail_rollback(&self, fail: bool) {
        self.fail_rollback.store(fail, Ordering::SeqCst);
    }

    pub fn fail_statement(&self, fail: bool) {
        self.fail_statement.store(fail, Ordering::SeqCst);
    }
}

pub(crate) struct MockTransaction {
    calls: Arc<Calls>,
}

impl Transaction for MockTransaction {
    fn commit(self: Box<Self>) -> DriverResult<()> {
        if self.calls.fail_commit.load(Ordering::SeqCst) {
            return Err(DriverError::Transaction("commit failed".into()));
        }
        self.calls.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn rollback(self: Box<Self>) -> DriverResult<()> {
        if self.calls.fail_rollback.load(Ordering::SeqCst) {
            return Err(DriverError::Transaction("rollback failed".into()));
        }
        self.calls.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for MockTransaction {
    fn drop(&mut self) {
        self.calls.disposes.fetch_add(1, Ordering::SeqCst);
    }
}

pub(crate) struct MockConnection {
    calls: Arc<Calls>,
    state: ConnectionState,
}

impl MockConnection {
    /// Force the connection into `state`, as a dropped link would.
    pub fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
    }
}

impl Connection for MockConnection {
    fn begin_transaction(
        &mut self,
        isolation: IsolationLevel,
    ) -> DriverResult<Box<dyn Transaction>> {
        if !self.state.is_open() {
            return Err(DriverError::Closed);
        }
        if self.calls.fail_begin.load(Ordering::SeqCst) {
            return Err(DriverError::Transaction("begin failed".into()));
        }
        self.calls.begins.fetch_add(1, Ordering::SeqCst);
        self.calls.isolations.lock().push(isolation);
        Ok(Box::new(MockTransaction {
            calls: self.calls.clone(),
        }))
    }

    fn close(&mut self) -> DriverResult<()> {
        if self.state == ConnectionState::Closed {
            return Ok(());
        }
        self.state = ConnectionState::Closed;
        self.calls.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        self.state
    }
}

impl Command for MockConnection {
    fn execute(&mut self, statement: &str) -> DriverResult<()> {
        if self.calls.fail_statement.load(Ordering::SeqCst) {
            return Err(DriverError::Statement(statement.to_string()));
        }
        self.calls.statements.lock().push(statement.to_string());
        Ok(())
    }
}

#[derive(Clone, Default)]
pub(crate) struct MockDriver {
    calls: Arc<Calls>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> &Calls {
        &self.calls
    }
}

#[async_trait]
impl Driver for MockDriver {
    type Connection = MockConnection;

    fn connect(&self, connection_string: &str) -> DriverResult<MockConnection> {
        if self.calls.fail_open.load(Ordering::SeqCst) {
            return Err(DriverError::Open(connection_string.to_string()));
        }
        self.calls.opens.fetch_add(1, Ordering::SeqCst);
        self.calls
            .connection_strings
            .lock()
            .push(connection_string.to_string());
        Ok(MockConnection {
            calls: self.calls.clone(),
            state: ConnectionState::Open,
        })
    }

    async fn connect_async(&self, connection_string: &str) -> DriverResult<MockConnection> {
        tokio::task::yield_now().await;
        self.connect(connection_string)
    }
}

/// Statement text is irrelevant to the tests; only the order matters.
pub(crate) struct MockStatements;

impl KeyStatements for MockStatements {
    fn open_key(&self, context: &SecurityContext) -> String {
        format!("OPEN {} {}", context.key_name, context.certificate)
    }

    fn close_key(&self, context: &SecurityContext) -> String {
        format!("CLOSE {}", context.key_name)
    }
}

//! # dbpool-testing
//!
//! In-memory mock driver for exercising the pool kernel without a real
//! database.
//!
//! [`MockDriver`] implements [`Driver`]; every connection it hands out records
//! its executed statements, prepared handles, and deallocations, and can be
//! killed or scripted to fail from the test side via [`MockConnHandle`].
//!
//! ## Example
//!
//! ```rust,ignore
//! let driver = MockDriver::new();
//! let pool = Pool::builder(Arc::new(driver.clone()), ConnectConfig::default())
//!     .build()
//!     .await?;
//!
//! let conn = pool.checkout().await?;
//! conn.execute("SELECT 1", &[]).await?;
//!
//! // Simulate the server dropping the session.
//! driver.connection(0).unwrap().kill();
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use dbpool_driver::{
    ConnectConfig, ConnectError, Driver, DriverConnection, ExecuteResult, StatementHandle,
    StatementInvalid, Value,
};

/// Scriptable in-memory driver.
///
/// Cloning shares state, so a test can keep a handle while the pool owns
/// another.
#[derive(Clone, Default)]
pub struct MockDriver {
    shared: Arc<DriverState>,
}

#[derive(Default)]
struct DriverState {
    next_conn_id: AtomicU64,
    connect_failures: Mutex<VecDeque<ConnectError>>,
    connections: Mutex<Vec<Arc<ConnState>>>,
}

struct ConnState {
    id: u64,
    alive: AtomicBool,
    next_statement: AtomicU64,
    log: Mutex<ConnLog>,
}

#[derive(Default)]
struct ConnLog {
    executed: Vec<String>,
    prepared: Vec<(StatementHandle, String)>,
    deallocated: Vec<StatementHandle>,
    fail_next_execute: Option<String>,
}

impl MockDriver {
    /// Create a new driver with no connections.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a failure for the next `connect` call.
    pub fn fail_next_connect(&self, err: ConnectError) {
        self.shared.connect_failures.lock().push_back(err);
    }

    /// Total number of connections ever created.
    #[must_use]
    pub fn created(&self) -> usize {
        self.shared.connections.lock().len()
    }

    /// Number of connections currently alive (not killed or closed).
    #[must_use]
    pub fn alive(&self) -> usize {
        self.shared
            .connections
            .lock()
            .iter()
            .filter(|c| c.alive.load(Ordering::Acquire))
            .count()
    }

    /// Handle to the `index`-th connection, in creation order.
    #[must_use]
    pub fn connection(&self, index: usize) -> Option<MockConnHandle> {
        self.shared
            .connections
            .lock()
            .get(index)
            .map(|state| MockConnHandle {
                state: Arc::clone(state),
            })
    }

    /// Handle to the most recently created connection.
    #[must_use]
    pub fn last_connection(&self) -> Option<MockConnHandle> {
        let connections = self.shared.connections.lock();
        connections.last().map(|state| MockConnHandle {
            state: Arc::clone(state),
        })
    }

    /// Kill every connection created so far.
    pub fn kill_all(&self) {
        for state in self.shared.connections.lock().iter() {
            state.alive.store(false, Ordering::Release);
        }
    }
}

#[async_trait]
impl Driver for MockDriver {
    async fn connect(
        &self,
        _config: &ConnectConfig,
    ) -> Result<Box<dyn DriverConnection>, ConnectError> {
        if let Some(err) = self.shared.connect_failures.lock().pop_front() {
            return Err(err);
        }

        let state = Arc::new(ConnState {
            id: self.shared.next_conn_id.fetch_add(1, Ordering::Relaxed) + 1,
            alive: AtomicBool::new(true),
            next_statement: AtomicU64::new(0),
            log: Mutex::new(ConnLog::default()),
        });
        self.shared.connections.lock().push(Arc::clone(&state));
        tracing::trace!(id = state.id, "mock connection created");

        Ok(Box::new(MockConnection { state }))
    }
}

/// Test-side handle to one mock connection.
#[derive(Clone)]
pub struct MockConnHandle {
    state: Arc<ConnState>,
}

impl MockConnHandle {
    /// Identifier assigned at creation, starting from 1.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.state.id
    }

    /// Whether the connection still answers liveness probes.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.state.alive.load(Ordering::Acquire)
    }

    /// Simulate the server dropping the session: subsequent probes fail and
    /// executions error.
    pub fn kill(&self) {
        self.state.alive.store(false, Ordering::Release);
    }

    /// Every SQL string executed on this connection, in order.
    #[must_use]
    pub fn executed(&self) -> Vec<String> {
        self.state.log.lock().executed.clone()
    }

    /// Every prepared statement, in preparation order.
    #[must_use]
    pub fn prepared(&self) -> Vec<(StatementHandle, String)> {
        self.state.log.lock().prepared.clone()
    }

    /// Every deallocated handle, in deallocation order.
    #[must_use]
    pub fn deallocated(&self) -> Vec<StatementHandle> {
        self.state.log.lock().deallocated.clone()
    }

    /// The SQL string that was prepared under `handle`.
    #[must_use]
    pub fn sql_for(&self, handle: StatementHandle) -> Option<String> {
        self.state
            .log
            .lock()
            .prepared
            .iter()
            .find(|(h, _)| *h == handle)
            .map(|(_, sql)| sql.clone())
    }

    /// Make the next execute on this connection fail with `message`.
    pub fn fail_next_execute(&self, message: impl Into<String>) {
        self.state.log.lock().fail_next_execute = Some(message.into());
    }
}

struct MockConnection {
    state: Arc<ConnState>,
}

impl MockConnection {
    fn check_alive(&self, sql: &str, binds: &[Value]) -> Result<(), StatementInvalid> {
        if self.state.alive.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StatementInvalid::new(
                "connection lost",
                sql,
                binds.to_vec(),
            ))
        }
    }

    fn take_scripted_failure(&self, sql: &str, binds: &[Value]) -> Result<(), StatementInvalid> {
        if let Some(message) = self.state.log.lock().fail_next_execute.take() {
            return Err(StatementInvalid::new(message, sql, binds.to_vec()));
        }
        Ok(())
    }
}

#[async_trait]
impl DriverConnection for MockConnection {
    async fn execute(
        &mut self,
        sql: &str,
        binds: &[Value],
    ) -> Result<ExecuteResult, StatementInvalid> {
        self.check_alive(sql, binds)?;
        self.take_scripted_failure(sql, binds)?;
        self.state.log.lock().executed.push(sql.to_string());
        Ok(ExecuteResult { rows_affected: 1 })
    }

    async fn prepare(&mut self, sql: &str) -> Result<StatementHandle, StatementInvalid> {
        self.check_alive(sql, &[])?;
        // Handles are monotonic and never reused within a connection's
        // lifetime, even after deallocation.
        let handle =
            StatementHandle::new(self.state.next_statement.fetch_add(1, Ordering::Relaxed) + 1);
        self.state
            .log
            .lock()
            .prepared
            .push((handle, sql.to_string()));
        Ok(handle)
    }

    async fn execute_prepared(
        &mut self,
        handle: StatementHandle,
        binds: &[Value],
    ) -> Result<ExecuteResult, StatementInvalid> {
        let sql = {
            let log = self.state.log.lock();
            if log.deallocated.contains(&handle) {
                return Err(StatementInvalid::new(
                    format!("{handle} was deallocated"),
                    "",
                    binds.to_vec(),
                ));
            }
            match log.prepared.iter().find(|(h, _)| *h == handle) {
                Some((_, sql)) => sql.clone(),
                None => {
                    return Err(StatementInvalid::new(
                        format!("unknown statement {handle}"),
                        "",
                        binds.to_vec(),
                    ));
                }
            }
        };
        self.check_alive(&sql, binds)?;
        self.take_scripted_failure(&sql, binds)?;
        self.state.log.lock().executed.push(sql);
        Ok(ExecuteResult { rows_affected: 1 })
    }

    async fn deallocate(&mut self, handle: StatementHandle) -> Result<(), StatementInvalid> {
        self.check_alive("", &[])?;
        self.state.log.lock().deallocated.push(handle);
        Ok(())
    }

    async fn ping(&mut self) -> bool {
        self.state.alive.load(Ordering::Acquire)
    }

    async fn close(&mut self) {
        self.state.alive.store(false, Ordering::Release);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_records_connection() {
        let driver = MockDriver::new();
        let mut conn = driver.connect(&ConnectConfig::default()).await.unwrap();

        conn.execute("SELECT 1", &[]).await.unwrap();

        let handle = driver.connection(0).unwrap();
        assert_eq!(handle.executed(), vec!["SELECT 1".to_string()]);
        assert_eq!(driver.created(), 1);
    }

    #[tokio::test]
    async fn test_kill_fails_probe_and_execute() {
        let driver = MockDriver::new();
        let mut conn = driver.connect(&ConnectConfig::default()).await.unwrap();

        driver.connection(0).unwrap().kill();
        assert!(!conn.ping().await);
        assert!(conn.execute("SELECT 1", &[]).await.is_err());
    }

    #[tokio::test]
    async fn test_statement_handles_are_never_reused() {
        let driver = MockDriver::new();
        let mut conn = driver.connect(&ConnectConfig::default()).await.unwrap();

        let first = conn.prepare("a").await.unwrap();
        conn.deallocate(first).await.unwrap();
        let second = conn.prepare("a").await.unwrap();

        assert_ne!(first, second);
        assert!(conn.execute_prepared(first, &[]).await.is_err());
        assert!(conn.execute_prepared(second, &[]).await.is_ok());
    }

    #[tokio::test]
    async fn test_queued_connect_failure() {
        let driver = MockDriver::new();
        driver.fail_next_connect(ConnectError::Network("boom".into()));

        assert!(driver.connect(&ConnectConfig::default()).await.is_err());
        assert!(driver.connect(&ConnectConfig::default()).await.is_ok());
    }
}

//! Driver traits implemented by database backends.

use async_trait::async_trait;

use crate::config::ConnectConfig;
use crate::error::{ConnectError, StatementInvalid};
use crate::value::Value;

/// Opaque handle to a server-side prepared statement.
///
/// Handles are issued by the driver and must never be reused within a
/// connection's lifetime, even after deallocation. A monotonic counter
/// satisfies this; schemes that rotate a small key space do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatementHandle(u64);

impl StatementHandle {
    /// Create a handle from a raw driver identifier.
    #[must_use]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw driver identifier.
    #[must_use]
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for StatementHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stmt#{}", self.0)
    }
}

/// Result of executing a statement.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecuteResult {
    /// Number of rows affected (or returned) by the statement.
    pub rows_affected: u64,
}

/// A factory for physical connections.
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    /// Establish one physical connection.
    ///
    /// Connect failures are not retried here; the pool decides whether and
    /// when to retry.
    async fn connect(
        &self,
        config: &ConnectConfig,
    ) -> Result<Box<dyn DriverConnection>, ConnectError>;
}

/// One live database session.
///
/// A `DriverConnection` is only ever driven by a single caller at a time; the
/// pool guarantees exclusive leasing, so implementations need no internal
/// locking.
#[async_trait]
pub trait DriverConnection: Send {
    /// Execute a SQL string directly, without preparation.
    async fn execute(
        &mut self,
        sql: &str,
        binds: &[Value],
    ) -> Result<ExecuteResult, StatementInvalid>;

    /// Prepare a statement and return its handle.
    async fn prepare(&mut self, sql: &str) -> Result<StatementHandle, StatementInvalid>;

    /// Execute a previously prepared statement.
    async fn execute_prepared(
        &mut self,
        handle: StatementHandle,
        binds: &[Value],
    ) -> Result<ExecuteResult, StatementInvalid>;

    /// Deallocate a prepared statement on the server.
    async fn deallocate(&mut self, handle: StatementHandle) -> Result<(), StatementInvalid>;

    /// Cheap liveness probe.
    ///
    /// Must never error: probe failures are reported as `false`.
    async fn ping(&mut self) -> bool;

    /// Close the underlying session. Idempotent; `ping` returns `false`
    /// afterwards.
    async fn close(&mut self);
}

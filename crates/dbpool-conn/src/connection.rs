//! Physical connection wrapper.

use std::sync::Arc;

use tokio::time::Instant;

use dbpool_driver::{DriverConnection, ExecuteResult, StatementInvalid, Value};

use crate::instrumentation::{EXECUTE_EVENT_NAME, ExecuteEvent, ExecuteObserver};
use crate::statement_cache::StatementCache;

/// One live database session, wrapped with statement caching and
/// instrumentation.
///
/// The pool leases a `Connection` to at most one owner at a time, so all
/// methods take `&mut self` and no internal locking exists.
pub struct Connection {
    id: u64,
    inner: Box<dyn DriverConnection>,
    /// `None` disables prepared-statement mode; `execute` then bypasses
    /// preparation entirely.
    statements: Option<StatementCache>,
    observer: Arc<dyn ExecuteObserver>,
    last_used_at: Instant,
    closed: bool,
}

impl Connection {
    /// Wrap a freshly connected driver session.
    ///
    /// `statement_limit` bounds the prepared-statement cache; zero disables
    /// prepared-statement mode.
    pub fn new(
        id: u64,
        inner: Box<dyn DriverConnection>,
        statement_limit: usize,
        observer: Arc<dyn ExecuteObserver>,
    ) -> Self {
        Self {
            id,
            inner,
            statements: StatementCache::new(statement_limit),
            observer,
            last_used_at: Instant::now(),
            closed: false,
        }
    }

    /// Unique identifier assigned by the pool.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// When this connection last executed a statement.
    #[must_use]
    pub fn last_used_at(&self) -> Instant {
        self.last_used_at
    }

    /// How long this connection has been idle.
    #[must_use]
    pub fn idle_for(&self) -> std::time::Duration {
        self.last_used_at.elapsed()
    }

    /// Whether `close` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// The prepared-statement cache, when prepared-statement mode is enabled.
    #[must_use]
    pub fn statement_cache(&self) -> Option<&StatementCache> {
        self.statements.as_ref()
    }

    /// Execute a statement, transparently going through the prepared-statement
    /// cache when enabled.
    ///
    /// Emits one [`ExecuteEvent`] per call, successful or not.
    pub async fn execute(
        &mut self,
        sql: &str,
        binds: &[Value],
    ) -> Result<ExecuteResult, StatementInvalid> {
        let start = Instant::now();
        let (result, cached) = self.execute_inner(sql, binds).await;
        self.last_used_at = Instant::now();

        self.observer.on_execute(&ExecuteEvent {
            name: EXECUTE_EVENT_NAME,
            sql,
            binds,
            duration: start.elapsed(),
            cached,
            rows_affected: result.as_ref().ok().map(|r| r.rows_affected),
            connection_id: self.id,
        });

        result
    }

    async fn execute_inner(
        &mut self,
        sql: &str,
        binds: &[Value],
    ) -> (Result<ExecuteResult, StatementInvalid>, bool) {
        if self.closed {
            return (
                Err(StatementInvalid::new(
                    "connection is closed",
                    sql,
                    binds.to_vec(),
                )),
                false,
            );
        }

        let Some(cache) = self.statements.as_mut() else {
            return (self.inner.execute(sql, binds).await, false);
        };

        if let Some(handle) = cache.get(sql) {
            return (self.inner.execute_prepared(handle, binds).await, true);
        }

        let handle = match self.inner.prepare(sql).await {
            Ok(handle) => handle,
            Err(err) => return (Err(err), false),
        };

        // Evict-and-deallocate happens in the same turn as the insertion, so
        // the cache never exceeds its bound and no two callers can decide to
        // evict simultaneously (the lease already guarantees one caller).
        if let Some(evicted) = cache.evict_if_full() {
            if let Err(err) = self.inner.deallocate(evicted).await {
                tracing::warn!(
                    connection_id = self.id,
                    handle = %evicted,
                    error = %err,
                    "failed to deallocate evicted statement"
                );
            }
        }
        if let Some(cache) = self.statements.as_mut() {
            cache.insert(sql.to_string(), handle);
        }

        (self.inner.execute_prepared(handle, binds).await, false)
    }

    /// Cheap liveness probe. Never errors; a closed or broken connection
    /// reports `false`.
    pub async fn ping(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.inner.ping().await
    }

    /// Deallocate every cached statement, e.g. after a DDL change invalidated
    /// server-side plans.
    ///
    /// Deallocation errors are logged and swallowed; the connection may
    /// already be dead.
    pub async fn clear_statement_cache(&mut self) {
        let Some(cache) = self.statements.as_mut() else {
            return;
        };
        for handle in cache.drain() {
            if let Err(err) = self.inner.deallocate(handle).await {
                tracing::debug!(
                    connection_id = self.id,
                    handle = %handle,
                    error = %err,
                    "deallocate during cache clear failed"
                );
            }
        }
    }

    /// Close the underlying session. Idempotent; `ping` returns `false`
    /// afterwards.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.clear_statement_cache().await;
        self.closed = true;
        self.inner.close().await;
        tracing::debug!(connection_id = self.id, "connection closed");
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("closed", &self.closed)
            .field(
                "cached_statements",
                &self.statements.as_ref().map_or(0, StatementCache::len),
            )
            .finish()
    }
}

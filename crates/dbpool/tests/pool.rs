//! Pool behavior tests against the mock driver.
//!
//! Everything here runs on a current-thread tokio runtime; timing-sensitive
//! tests use `start_paused` so timeouts, reaping intervals, and staleness
//! thresholds are deterministic and instant.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use dbpool::{
    ConnectConfig, ConnectError, Driver, DriverConnection, ExecuteEvent, ExecuteObserver,
    ExecuteResult, NoopObserver, Pool, PoolConfig, PoolError, StatementHandle, StatementInvalid,
    Value,
};
use dbpool_testing::MockDriver;

fn quiet_config() -> PoolConfig {
    // Reaper off by default; tests that want it turn it back on.
    PoolConfig::default().reaping_frequency(None)
}

async fn build_pool(driver: &MockDriver, config: PoolConfig) -> Pool {
    Pool::builder(Arc::new(driver.clone()), ConnectConfig::default())
        .pool_config(config)
        .observer(Arc::new(NoopObserver))
        .build()
        .await
        .unwrap()
}

/// Driver whose connections can be made to block inside `ping` or `execute`
/// until the test opens a gate, for pinning down lock-ordering races.
#[derive(Clone)]
struct GateDriver {
    state: Arc<GateState>,
}

struct GateState {
    gate_ping: AtomicBool,
    gate_execute: AtomicBool,
    /// Signaled when a gated call has started waiting.
    entered: Semaphore,
    /// The test adds a permit to let a gated call finish.
    proceed: Semaphore,
}

impl GateDriver {
    fn new() -> Self {
        Self {
            state: Arc::new(GateState {
                gate_ping: AtomicBool::new(false),
                gate_execute: AtomicBool::new(false),
                entered: Semaphore::const_new(0),
                proceed: Semaphore::const_new(0),
            }),
        }
    }

    fn gate_next_ping(&self) {
        self.state.gate_ping.store(true, Ordering::SeqCst);
    }

    fn gate_next_execute(&self) {
        self.state.gate_execute.store(true, Ordering::SeqCst);
    }

    async fn wait_entered(&self) {
        self.state.entered.acquire().await.unwrap().forget();
    }

    fn open(&self) {
        self.state.proceed.add_permits(1);
    }
}

struct GateConnection {
    state: Arc<GateState>,
}

impl GateConnection {
    async fn hold(&self) {
        self.state.entered.add_permits(1);
        if let Ok(permit) = self.state.proceed.acquire().await {
            permit.forget();
        }
    }
}

#[async_trait]
impl Driver for GateDriver {
    async fn connect(
        &self,
        _config: &ConnectConfig,
    ) -> Result<Box<dyn DriverConnection>, ConnectError> {
        Ok(Box::new(GateConnection {
            state: Arc::clone(&self.state),
        }))
    }
}

#[async_trait]
impl DriverConnection for GateConnection {
    async fn execute(
        &mut self,
        _sql: &str,
        _binds: &[Value],
    ) -> Result<ExecuteResult, StatementInvalid> {
        if self.state.gate_execute.swap(false, Ordering::SeqCst) {
            self.hold().await;
        }
        Ok(ExecuteResult { rows_affected: 1 })
    }

    async fn prepare(&mut self, _sql: &str) -> Result<StatementHandle, StatementInvalid> {
        Ok(StatementHandle::new(1))
    }

    async fn execute_prepared(
        &mut self,
        _handle: StatementHandle,
        _binds: &[Value],
    ) -> Result<ExecuteResult, StatementInvalid> {
        Ok(ExecuteResult { rows_affected: 1 })
    }

    async fn deallocate(&mut self, _handle: StatementHandle) -> Result<(), StatementInvalid> {
        Ok(())
    }

    async fn ping(&mut self) -> bool {
        if self.state.gate_ping.swap(false, Ordering::SeqCst) {
            self.hold().await;
        }
        true
    }

    async fn close(&mut self) {}
}

async fn build_gate_pool(driver: &GateDriver, config: PoolConfig) -> Pool {
    Pool::builder(Arc::new(driver.clone()), ConnectConfig::default())
        .pool_config(config.statement_limit(0))
        .observer(Arc::new(NoopObserver))
        .build()
        .await
        .unwrap()
}

// =============================================================================
// Checkout / checkin basics
// =============================================================================

#[tokio::test]
async fn test_checkin_makes_connection_reusable() {
    let driver = MockDriver::new();
    let pool = build_pool(&driver, quiet_config()).await;

    let first_id = {
        let conn = pool.checkout().await.unwrap();
        conn.execute("SELECT 1", &[]).await.unwrap();
        conn.connection_id()
    };
    assert_eq!(pool.checked_out_count(), 0);
    assert_eq!(pool.idle_count(), 1);

    let conn = pool.checkout().await.unwrap();
    assert_eq!(conn.connection_id(), first_id);
    assert_eq!(driver.created(), 1);
}

#[tokio::test]
async fn test_pool_never_exceeds_max_size() {
    let driver = MockDriver::new();
    let pool = build_pool(&driver, quiet_config().max_size(2)).await;

    let a = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.checkout().await.unwrap() })
            .await
            .unwrap()
    };
    let b = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.checkout().await.unwrap() })
            .await
            .unwrap()
    };
    assert_eq!(driver.created(), 2);
    assert_eq!(pool.checked_out_count(), 2);
    assert!(pool.status().is_at_capacity());

    // A third caller parks instead of creating a connection.
    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.checkout().await.unwrap().connection_id() })
    };
    tokio::task::yield_now().await;
    assert_eq!(driver.created(), 2);

    let released_id = a.connection_id();
    drop(a);
    assert_eq!(waiter.await.unwrap(), released_id);
    assert_eq!(driver.created(), 2);
    drop(b);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stress_cycles_never_double_issue() {
    let driver = MockDriver::new();
    let config = quiet_config()
        .max_size(4)
        .checkout_timeout(Duration::from_secs(30));
    let pool = build_pool(&driver, config).await;

    // Connection ids currently issued to somebody. Inserting a duplicate
    // means one connection was leased to two owners at once.
    let issued: Arc<parking_lot::Mutex<HashSet<u64>>> = Arc::default();

    let mut tasks = Vec::new();
    for _ in 0..32 {
        let pool = pool.clone();
        let issued = Arc::clone(&issued);
        tasks.push(tokio::spawn(async move {
            for _ in 0..50 {
                let conn = pool.checkout().await.unwrap();
                assert!(
                    issued.lock().insert(conn.connection_id()),
                    "connection leased to two owners at once"
                );
                conn.execute("SELECT 1", &[]).await.unwrap();

                let status = pool.status();
                assert!(status.total <= status.max);
                assert!(pool.checked_out_count() <= status.max);

                // Remove before the guard drops so the next owner of this
                // connection never observes a stale entry.
                assert!(issued.lock().remove(&conn.connection_id()));
                drop(conn);
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert!(driver.created() <= 4);
    assert_eq!(pool.checked_out_count(), 0);
    assert_eq!(pool.status().total, pool.idle_count());
}

#[tokio::test(start_paused = true)]
async fn test_checkout_times_out_when_pool_exhausted() {
    let driver = MockDriver::new();
    let config = quiet_config()
        .max_size(1)
        .checkout_timeout(Duration::from_secs(5));
    let pool = build_pool(&driver, config).await;

    let _held = pool.checkout().await.unwrap();

    // Different task, so this is not a re-entrant checkout.
    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.checkout().await })
    };
    let err = waiter.await.unwrap().unwrap_err();
    match err {
        PoolError::CheckoutTimeout { waited } => {
            assert!(waited >= Duration::from_secs(5));
        }
        other => panic!("expected CheckoutTimeout, got {other:?}"),
    }
    let metrics = pool.metrics();
    assert_eq!(metrics.checkout_timeouts, 1);
    assert_eq!(metrics.checkouts_failed, 1);
}

#[tokio::test]
async fn test_waiters_are_served_in_arrival_order() {
    let driver = MockDriver::new();
    let pool = build_pool(&driver, quiet_config().max_size(1)).await;

    let held = pool.checkout().await.unwrap();

    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let mut handles = Vec::new();
    for name in ["first", "second", "third"] {
        let pool = pool.clone();
        let order = Arc::clone(&order);
        handles.push(tokio::spawn(async move {
            let conn = pool.checkout().await.unwrap();
            order.lock().push(name);
            drop(conn);
        }));
        // Let this waiter park before the next one arrives.
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    drop(held);
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    assert_eq!(driver.created(), 1);
}

// =============================================================================
// Dead connections
// =============================================================================

#[tokio::test]
async fn test_dead_idle_connection_replaced_transparently() {
    let driver = MockDriver::new();
    let pool = build_pool(&driver, quiet_config().max_size(1)).await;

    {
        let conn = pool.checkout().await.unwrap();
        conn.execute("SELECT 1", &[]).await.unwrap();
    }
    driver.kill_all();

    // The caller never sees the dead connection.
    let conn = pool.checkout().await.unwrap();
    conn.execute("SELECT 2", &[]).await.unwrap();
    assert_eq!(driver.created(), 2);
    assert_eq!(driver.alive(), 1);
    assert_eq!(pool.metrics().connections_closed, 1);
}

#[tokio::test]
async fn test_checkout_fails_after_recovery_attempts_exhausted() {
    let driver = MockDriver::new();
    let config = quiet_config().max_size(2).max_recover_attempts(2);
    let pool = build_pool(&driver, config).await;

    // Fill the idle list with two connections, then kill both.
    let a = pool.checkout().await.unwrap();
    let b = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.checkout().await.unwrap() })
            .await
            .unwrap()
    };
    driver.kill_all();
    drop(a);
    drop(b);
    assert_eq!(pool.idle_count(), 2);

    // Two dead candidates in a row exhausts the recovery budget. A fresh
    // connect would need a third attempt.
    let err = pool.checkout().await.unwrap_err();
    match err {
        PoolError::Unavailable { attempts } => assert_eq!(attempts, 2),
        other => panic!("expected Unavailable, got {other:?}"),
    }

    // The dead connections were discarded, so the next checkout connects.
    let conn = pool.checkout().await.unwrap();
    assert!(conn.ping().await.unwrap());
    assert_eq!(driver.created(), 3);
}

#[tokio::test]
async fn test_connect_failure_surfaces_immediately() {
    let driver = MockDriver::new();
    let pool = build_pool(&driver, quiet_config()).await;

    driver.fail_next_connect(ConnectError::Refused {
        host: "localhost".into(),
        port: 5432,
    });
    let err = pool.checkout().await.unwrap_err();
    assert!(matches!(err, PoolError::Connect(ConnectError::Refused { .. })));

    // The reserved slot was released; the pool recovers on its own.
    let conn = pool.checkout().await.unwrap();
    assert!(conn.ping().await.unwrap());
}

// =============================================================================
// Re-entrancy and ownership
// =============================================================================

#[tokio::test]
async fn test_reentrant_checkout_returns_same_connection() {
    let driver = MockDriver::new();
    let pool = build_pool(&driver, quiet_config().max_size(1)).await;

    let outer = pool.checkout().await.unwrap();
    // Same task: must not deadlock waiting for the single slot.
    let inner = pool.checkout().await.unwrap();
    assert_eq!(outer.connection_id(), inner.connection_id());
    assert_eq!(pool.checked_out_count(), 1);
    assert_eq!(driver.created(), 1);

    // The inner guard is not the one that checks the connection in.
    drop(inner);
    assert_eq!(pool.checked_out_count(), 1);
    outer.execute("SELECT 1", &[]).await.unwrap();
    drop(outer);
    assert_eq!(pool.checked_out_count(), 0);
    assert_eq!(pool.idle_count(), 1);
}

#[tokio::test]
async fn test_nested_with_connection_shares_connection() {
    let driver = MockDriver::new();
    let pool = build_pool(&driver, quiet_config().max_size(1)).await;

    let inner_pool = pool.clone();
    pool.with_connection(|outer| async move {
        let outer_id = outer.connection_id();
        inner_pool
            .with_connection(|inner| async move {
                assert_eq!(inner.connection_id(), outer_id);
                inner.execute("SELECT 1", &[]).await?;
                Ok(())
            })
            .await?;
        outer.execute("SELECT 2", &[]).await?;
        Ok(())
    })
    .await
    .unwrap();

    assert_eq!(driver.created(), 1);
    assert_eq!(pool.checked_out_count(), 0);
}

#[tokio::test]
async fn test_use_from_other_task_is_rejected() {
    let driver = MockDriver::new();
    let pool = build_pool(&driver, quiet_config()).await;

    let conn = pool.checkout().await.unwrap();
    let err = tokio::spawn(async move {
        let result = conn.execute("SELECT 1", &[]).await;
        (conn, result.unwrap_err())
    })
    .await
    .unwrap()
    .1;
    assert!(matches!(err, PoolError::OwnershipViolation));
    assert!(driver.last_connection().unwrap().executed().is_empty());
}

// =============================================================================
// with_connection exit paths
// =============================================================================

#[tokio::test]
async fn test_with_connection_checks_in_on_error() {
    let driver = MockDriver::new();
    let pool = build_pool(&driver, quiet_config().max_size(1)).await;

    let result: Result<(), PoolError> = pool
        .with_connection(|conn| async move {
            conn.execute("SELECT 1", &[]).await?;
            Err(PoolError::InvalidConfig("boom".into()))
        })
        .await;
    assert!(result.is_err());

    // Checked in despite the error; reusable immediately.
    assert_eq!(pool.checked_out_count(), 0);
    assert_eq!(pool.idle_count(), 1);
}

#[tokio::test]
async fn test_with_connection_checks_in_on_panic() {
    let driver = MockDriver::new();
    let pool = build_pool(&driver, quiet_config().max_size(1)).await;

    let task = {
        let pool = pool.clone();
        tokio::spawn(async move {
            pool.with_connection(|conn| async move {
                conn.execute("SELECT 1", &[]).await?;
                panic!("handler blew up");
                #[allow(unreachable_code)]
                Ok(())
            })
            .await
        })
    };
    assert!(task.await.is_err());

    // The guard unwound and checked the connection in.
    assert_eq!(pool.checked_out_count(), 0);
    assert_eq!(pool.idle_count(), 1);
    let conn = pool.checkout().await.unwrap();
    conn.execute("SELECT 2", &[]).await.unwrap();
}

#[tokio::test]
async fn test_with_connection_checks_in_on_cancellation() {
    let driver = MockDriver::new();
    let pool = build_pool(&driver, quiet_config().max_size(1)).await;

    let task = {
        let pool = pool.clone();
        tokio::spawn(async move {
            pool.with_connection(|_conn| async move {
                std::future::pending::<()>().await;
                Ok(())
            })
            .await
        })
    };
    // Let the task check out, then cancel it mid-body.
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
    assert_eq!(pool.checked_out_count(), 1);
    task.abort();
    let _ = task.await;

    assert_eq!(pool.checked_out_count(), 0);
    assert_eq!(pool.idle_count(), 1);
    assert_eq!(driver.alive(), 1);
}

// =============================================================================
// Reaper
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_reaper_reclaims_stale_dead_connection() {
    let driver = MockDriver::new();
    let config = PoolConfig::default()
        .max_size(2)
        .reaping_frequency(Some(Duration::from_secs(1)))
        .stale_threshold(Duration::from_secs(30));
    let pool = build_pool(&driver, config).await;

    let abandoned = pool.checkout().await.unwrap();
    driver.kill_all();

    tokio::time::sleep(Duration::from_secs(35)).await;

    assert_eq!(pool.checked_out_count(), 0);
    assert_eq!(pool.metrics().connections_reaped, 1);

    // The owner still holding the guard finds its lease revoked.
    let err = abandoned.execute("SELECT 1", &[]).await.unwrap_err();
    assert!(matches!(err, PoolError::NotEstablished));
    drop(abandoned);

    // The freed slot is usable again.
    let conn = pool.checkout().await.unwrap();
    conn.execute("SELECT 1", &[]).await.unwrap();
    assert_eq!(driver.created(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_reaper_leaves_stale_live_connection_alone() {
    let driver = MockDriver::new();
    let config = PoolConfig::default()
        .reaping_frequency(Some(Duration::from_secs(1)))
        .stale_threshold(Duration::from_secs(30));
    let pool = build_pool(&driver, config).await;

    let long_job = pool.checkout().await.unwrap();
    tokio::time::sleep(Duration::from_secs(120)).await;

    // Stale by age but the connection still answers pings.
    assert_eq!(pool.checked_out_count(), 1);
    assert_eq!(pool.metrics().connections_reaped, 0);
    long_job.execute("SELECT 1", &[]).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_reaper_checks_in_lease_released_during_live_probe() {
    let driver = GateDriver::new();
    let config = PoolConfig::default()
        .reaping_frequency(Some(Duration::from_secs(1)))
        .stale_threshold(Duration::from_secs(30));
    let pool = build_gate_pool(&driver, config).await;

    let guard = pool.checkout().await.unwrap();
    let held_id = guard.connection_id();

    // Stall the reaper inside its liveness probe of the stale lease.
    driver.gate_next_ping();
    tokio::time::sleep(Duration::from_secs(31)).await;
    driver.wait_entered().await;

    // The owner walks away while the reaper holds the slot lock; its Drop
    // defers the checkin to the reaper.
    drop(guard);
    assert_eq!(pool.checked_out_count(), 1);

    driver.open();
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }

    // The reaper observed the release and checked the live connection in.
    assert_eq!(pool.checked_out_count(), 0);
    assert_eq!(pool.idle_count(), 1);
    let conn = pool.checkout().await.unwrap();
    assert_eq!(conn.connection_id(), held_id);
}

#[tokio::test(start_paused = true)]
async fn test_stopped_reaper_reclaims_nothing() {
    let driver = MockDriver::new();
    let config = PoolConfig::default()
        .reaping_frequency(Some(Duration::from_secs(1)))
        .stale_threshold(Duration::from_secs(30));
    let pool = build_pool(&driver, config).await;
    pool.stop_reaper();

    let abandoned = pool.checkout().await.unwrap();
    driver.kill_all();
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(pool.metrics().connections_reaped, 0);
    assert_eq!(pool.checked_out_count(), 1);

    pool.start_reaper();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(pool.metrics().connections_reaped, 1);
    drop(abandoned);
}

// =============================================================================
// Admin surface
// =============================================================================

#[tokio::test]
async fn test_clear_all_disconnects_and_revokes() {
    let driver = MockDriver::new();
    let pool = build_pool(&driver, quiet_config().max_size(3)).await;

    // One idle, one leased.
    {
        let warmup = pool.checkout().await.unwrap();
        warmup.execute("SELECT 1", &[]).await.unwrap();
    }
    let pool2 = pool.clone();
    let held = tokio::spawn(async move { pool2.checkout().await.unwrap() })
        .await
        .unwrap();

    pool.clear_all().await;
    assert_eq!(driver.alive(), 0);
    assert_eq!(pool.checked_out_count(), 0);
    assert_eq!(pool.idle_count(), 0);

    // Pool remains usable; fresh connections are established on demand.
    let conn = pool.checkout().await.unwrap();
    conn.execute("SELECT 1", &[]).await.unwrap();
    drop(held);
    assert_eq!(driver.alive(), 1);
}

#[tokio::test]
async fn test_clear_all_during_execute_closes_connection_on_release() {
    let driver = GateDriver::new();
    let pool = build_gate_pool(&driver, quiet_config().max_size(1)).await;

    let task = {
        let pool = pool.clone();
        let driver = driver.clone();
        tokio::spawn(async move {
            let conn = pool.checkout().await.unwrap();
            driver.gate_next_execute();
            conn.execute("UPDATE jobs SET state = 'done'", &[])
                .await
                .unwrap();
            // The pool revoked the lease while the statement ran.
            let err = conn.execute("SELECT 1", &[]).await.unwrap_err();
            assert!(matches!(err, PoolError::NotEstablished));
        })
    };

    // clear_all must not disturb a connection mid-execute; it revokes the
    // lease and leaves the disconnect to the owner's release.
    driver.wait_entered().await;
    pool.clear_all().await;
    assert_eq!(pool.checked_out_count(), 0);
    assert_eq!(pool.metrics().connections_closed, 0);

    driver.open();
    task.await.unwrap();

    assert_eq!(pool.metrics().connections_closed, 1);
    assert_eq!(pool.status().total, 0);
    let replacement = pool.checkout().await.unwrap();
    assert!(replacement.ping().await.unwrap());
}

#[tokio::test]
async fn test_closed_pool_rejects_checkout() {
    let driver = MockDriver::new();
    let pool = build_pool(&driver, quiet_config()).await;

    let conn = pool.checkout().await.unwrap();
    drop(conn);
    pool.close().await;

    assert!(pool.is_closed());
    assert_eq!(driver.alive(), 0);
    assert!(matches!(
        pool.checkout().await.unwrap_err(),
        PoolError::PoolClosed
    ));
}

#[tokio::test]
async fn test_try_checkout_returns_none_at_capacity() {
    let driver = MockDriver::new();
    let pool = build_pool(&driver, quiet_config().max_size(1)).await;

    let held = pool.checkout().await.unwrap();
    let pool2 = pool.clone();
    let second = tokio::spawn(async move { pool2.try_checkout().await })
        .await
        .unwrap()
        .unwrap();
    assert!(second.is_none());

    drop(held);
    assert!(pool.try_checkout().await.unwrap().is_some());
}

#[tokio::test]
async fn test_remove_evicts_connection_and_frees_slot() {
    let driver = MockDriver::new();
    let pool = build_pool(&driver, quiet_config().max_size(1)).await;

    let conn = pool.checkout().await.unwrap();
    conn.remove().await;
    assert_eq!(driver.alive(), 0);
    assert_eq!(pool.checked_out_count(), 0);

    let replacement = pool.checkout().await.unwrap();
    assert!(replacement.ping().await.unwrap());
    assert_eq!(driver.created(), 2);
}

// =============================================================================
// Statement cache through the pool
// =============================================================================

#[tokio::test]
async fn test_repeated_sql_prepares_once() {
    let driver = MockDriver::new();
    let pool = build_pool(&driver, quiet_config()).await;

    let conn = pool.checkout().await.unwrap();
    for _ in 0..3 {
        conn.execute("SELECT * FROM users WHERE id = $1", &[Value::Int(7)])
            .await
            .unwrap();
    }
    let handle = driver.last_connection().unwrap();
    assert_eq!(handle.prepared().len(), 1);
    assert_eq!(handle.deallocated().len(), 0);
}

#[tokio::test]
async fn test_clear_statement_cache_deallocates_on_server() {
    let driver = MockDriver::new();
    let pool = build_pool(&driver, quiet_config()).await;

    let conn = pool.checkout().await.unwrap();
    conn.execute("SELECT 1", &[]).await.unwrap();
    conn.execute("SELECT 2", &[]).await.unwrap();
    conn.clear_statement_cache().await.unwrap();

    let handle = driver.last_connection().unwrap();
    assert_eq!(handle.deallocated().len(), 2);

    // Next execute re-prepares.
    conn.execute("SELECT 1", &[]).await.unwrap();
    assert_eq!(handle.prepared().len(), 3);
}

#[tokio::test]
async fn test_statement_error_keeps_sql_out_of_display() {
    let driver = MockDriver::new();
    let pool = build_pool(&driver, quiet_config()).await;

    let conn = pool.checkout().await.unwrap();
    driver
        .last_connection()
        .unwrap()
        .fail_next_execute("duplicate key value violates unique constraint");

    let sql = "INSERT INTO users (ssn) VALUES ($1)";
    let err = conn
        .execute(sql, &[Value::Text("123-45-6789".into())])
        .await
        .unwrap_err();
    let PoolError::Statement(invalid) = err else {
        panic!("expected Statement error");
    };
    assert_eq!(invalid.sql(), sql);
    assert_eq!(invalid.binds().len(), 1);
    let rendered = invalid.to_string();
    assert!(!rendered.contains("ssn"));
    assert!(!rendered.contains("123-45-6789"));
    assert!(rendered.contains("duplicate key"));
}

// =============================================================================
// Instrumentation
// =============================================================================

#[derive(Default)]
struct CollectingObserver {
    events: parking_lot::Mutex<Vec<(String, String, bool, Option<u64>)>>,
}

impl ExecuteObserver for CollectingObserver {
    fn on_execute(&self, event: &ExecuteEvent<'_>) {
        self.events.lock().push((
            event.sql.to_string(),
            event.binds_summary(),
            event.cached,
            event.rows_affected,
        ));
    }
}

#[tokio::test]
async fn test_every_execute_emits_an_event() {
    let driver = MockDriver::new();
    let observer = Arc::new(CollectingObserver::default());
    let pool = Pool::builder(Arc::new(driver.clone()), ConnectConfig::default())
        .pool_config(quiet_config())
        .observer(Arc::clone(&observer) as Arc<dyn ExecuteObserver>)
        .build()
        .await
        .unwrap();

    let conn = pool.checkout().await.unwrap();
    let blob = vec![0u8; 4096];
    let sql = "UPDATE files SET data = $1 WHERE id = $2";
    conn.execute(sql, &[Value::from(blob), Value::Int(1)])
        .await
        .unwrap();
    conn.execute(sql, &[Value::Null, Value::Int(2)]).await.unwrap();

    let events = observer.events.lock();
    assert_eq!(events.len(), 2);

    let (first_sql, first_binds, first_cached, first_rows) = &events[0];
    assert_eq!(first_sql, sql);
    assert!(first_binds.contains("<4096 bytes of binary data>"));
    assert!(!*first_cached);
    assert_eq!(*first_rows, Some(1));

    // Second run hits the statement cache.
    assert!(events[1].2);
}

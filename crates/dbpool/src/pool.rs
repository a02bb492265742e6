//! Connection pool implementation.
//!
//! The pool owns a bounded collection of physical connections and serves
//! checkout/checkin with blocking-with-timeout semantics. Internal state is
//! mutated only under a single mutex; no I/O happens inside the lock. Blocked
//! checkouts are parked on a FIFO queue of oneshot channels and released by
//! direct handoff when a connection is checked in or capacity frees up.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;

use dbpool_conn::{Connection, ExecuteObserver, TracingObserver};
use dbpool_driver::{ConnectConfig, Driver, ExecuteResult, Value};

use crate::config::PoolConfig;
use crate::error::{PoolError, Result};
use crate::lease::{Lease, OwnerId};
use crate::reaper;

/// What a parked checkout receives when it is woken.
pub(crate) enum Handoff {
    /// A connection checked in by another owner, handed over directly.
    Conn(HandoffConn),
    /// Capacity freed up; retry the allocation path.
    Retry,
}

/// A connection in flight between a checkin and a parked waiter.
///
/// A successful `oneshot` send only proves the receiver half is still
/// allocated, not that anyone will poll it: the waiter's checkout future can
/// be dropped (timeout, cancellation) with the handoff already in the
/// channel. Dropping the parcel unclaimed puts the connection back instead of
/// leaking its slot.
pub(crate) struct HandoffConn {
    pool: Weak<PoolShared>,
    conn: Option<Connection>,
}

impl HandoffConn {
    /// Take the connection out, disarming the drop recovery.
    fn claim(&mut self) -> Option<Connection> {
        self.conn.take()
    }
}

impl Drop for HandoffConn {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        let Some(shared) = self.pool.upgrade() else {
            return;
        };
        tracing::trace!(
            connection_id = conn.id(),
            "handoff went unclaimed, returning connection to pool"
        );
        let mut state = shared.state.lock();
        if state.closed {
            state.total = state.total.saturating_sub(1);
            drop(state);
            close_in_background(&shared, conn);
        } else {
            shared.return_conn(&mut state, conn);
        }
    }
}

pub(crate) struct PoolState {
    pub(crate) idle: VecDeque<Connection>,
    /// Idle + leased + currently-connecting. Never exceeds `max_size`.
    pub(crate) total: usize,
    pub(crate) leases: HashMap<OwnerId, Arc<Lease>>,
    pub(crate) waiters: VecDeque<oneshot::Sender<Handoff>>,
    pub(crate) closed: bool,
}

impl PoolState {
    /// Wake one waiter to retry allocation after capacity freed up.
    pub(crate) fn wake_retry(&mut self) {
        while let Some(waiter) = self.waiters.pop_front() {
            if waiter.send(Handoff::Retry).is_ok() {
                return;
            }
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct MetricsInner {
    pub(crate) connections_created: u64,
    pub(crate) connections_closed: u64,
    pub(crate) checkouts_successful: u64,
    pub(crate) checkouts_failed: u64,
    pub(crate) checkout_timeouts: u64,
    pub(crate) connections_reaped: u64,
}

pub(crate) struct PoolShared {
    pub(crate) config: PoolConfig,
    pub(crate) connect_config: ConnectConfig,
    pub(crate) driver: Arc<dyn Driver>,
    pub(crate) observer: Arc<dyn ExecuteObserver>,
    pub(crate) state: Mutex<PoolState>,
    pub(crate) metrics: Mutex<MetricsInner>,
    /// Self-reference for parcels that may outlive their waiter.
    self_ref: Weak<PoolShared>,
    next_conn_id: AtomicU64,
    created_at: std::time::Instant,
    reaper: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl PoolShared {
    /// Return a leased connection to the pool. Called exactly once per
    /// successful checkout, normally from the guard's `Drop`.
    pub(crate) fn checkin(&self, lease: &Arc<Lease>, conn: Connection) {
        let mut state = self.state.lock();
        self.forget_lease_locked(&mut state, lease);
        if state.closed {
            state.total = state.total.saturating_sub(1);
            drop(state);
            close_in_background(self, conn);
            return;
        }
        tracing::trace!(connection_id = lease.connection_id, "connection checked in");
        self.return_conn(&mut state, conn);
    }

    /// Hand `conn` to the longest-parked live waiter, or return it to the
    /// idle list.
    fn return_conn(&self, state: &mut PoolState, mut conn: Connection) {
        while let Some(waiter) = state.waiters.pop_front() {
            let parcel = HandoffConn {
                pool: self.self_ref.clone(),
                conn: Some(conn),
            };
            match waiter.send(Handoff::Conn(parcel)) {
                Ok(()) => return,
                // Waiter gave up before the send; reclaim without running the
                // parcel's Drop, which would re-lock the state.
                Err(Handoff::Conn(mut parcel)) => match parcel.claim() {
                    Some(returned) => conn = returned,
                    None => return,
                },
                Err(Handoff::Retry) => return,
            }
        }
        state.idle.push_back(conn);
    }

    /// Drop the lease table entry for `lease`, if it is still current.
    ///
    /// Compares by identity so a stale guard can never evict a newer lease
    /// the same owner acquired after a reaper reclamation.
    pub(crate) fn forget_lease(&self, lease: &Arc<Lease>) {
        let mut state = self.state.lock();
        self.forget_lease_locked(&mut state, lease);
    }

    fn forget_lease_locked(&self, state: &mut PoolState, lease: &Arc<Lease>) {
        if let Some(current) = state.leases.get(&lease.owner) {
            if Arc::ptr_eq(current, lease) {
                state.leases.remove(&lease.owner);
            }
        }
    }

    /// Give up one slot of capacity and wake a parked checkout to use it.
    pub(crate) fn free_slot(&self) {
        let mut state = self.state.lock();
        state.total = state.total.saturating_sub(1);
        state.wake_retry();
    }

    pub(crate) fn next_connection_id(&self) -> u64 {
        self.next_conn_id.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Close a connection without blocking the caller.
///
/// Used on the synchronous checkin path when the pool no longer wants the
/// connection. Outside a tokio runtime the connection is dropped without a
/// graceful close, which only happens during process teardown. Counts toward
/// `connections_closed` either way.
pub(crate) fn close_in_background(shared: &PoolShared, conn: Connection) {
    shared.metrics.lock().connections_closed += 1;
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        handle.spawn(async move {
            let mut conn = conn;
            conn.close().await;
        });
    } else {
        tracing::debug!(
            connection_id = conn.id(),
            "no runtime available; dropping connection without graceful close"
        );
    }
}

/// Frees the reserved capacity slot if connecting is cancelled or fails.
struct SlotReservation {
    shared: Arc<PoolShared>,
    armed: bool,
}

impl Drop for SlotReservation {
    fn drop(&mut self) {
        if self.armed {
            self.shared.free_slot();
        }
    }
}

/// Returns a candidate connection to the pool if the probe is cancelled
/// mid-flight, so capacity accounting stays intact.
struct CandidateGuard {
    shared: Arc<PoolShared>,
    conn: Option<Connection>,
}

impl Drop for CandidateGuard {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            let mut state = self.shared.state.lock();
            self.shared.return_conn(&mut state, conn);
        }
    }
}

enum Plan {
    Probe(Connection),
    Create,
    Wait(oneshot::Receiver<Handoff>),
}

/// An async connection pool with per-connection prepared-statement caching.
///
/// Cloning is cheap and shares the same pool.
///
/// # Example
///
/// ```rust,ignore
/// use dbpool::{Pool, PoolConfig};
///
/// let pool = Pool::builder(driver, connect_config)
///     .max_size(20)
///     .checkout_timeout(Duration::from_secs(5))
///     .build()
///     .await?;
///
/// let rows = pool
///     .with_connection(|conn| async move {
///         conn.execute("UPDATE jobs SET state = $1", &["done".into()]).await
///     })
///     .await?;
/// ```
#[derive(Clone)]
pub struct Pool {
    shared: Arc<PoolShared>,
}

impl Pool {
    /// Create a pool builder.
    #[must_use]
    pub fn builder(driver: Arc<dyn Driver>, connect_config: ConnectConfig) -> PoolBuilder {
        PoolBuilder::new(driver, connect_config)
    }

    /// Create a pool with the given configuration.
    ///
    /// Connections are established lazily on demand; this does not touch the
    /// database. Must be called within a tokio runtime (the reaper task is
    /// spawned here when enabled).
    pub async fn new(
        driver: Arc<dyn Driver>,
        connect_config: ConnectConfig,
        config: PoolConfig,
        observer: Arc<dyn ExecuteObserver>,
    ) -> Result<Self> {
        config.validate()?;

        let shared = Arc::new_cyclic(|self_ref| PoolShared {
            config: config.clone(),
            connect_config,
            driver,
            observer,
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                total: 0,
                leases: HashMap::new(),
                waiters: VecDeque::new(),
                closed: false,
            }),
            metrics: Mutex::new(MetricsInner::default()),
            self_ref: self_ref.clone(),
            next_conn_id: AtomicU64::new(0),
            created_at: std::time::Instant::now(),
            reaper: Mutex::new(None),
        });

        let pool = Self { shared };
        if config.reaping_frequency.is_some() {
            pool.start_reaper();
        }

        tracing::info!(
            max_size = config.max_size,
            checkout_timeout = ?config.checkout_timeout,
            statement_limit = config.statement_limit,
            reaping_frequency = ?config.reaping_frequency,
            "connection pool created"
        );

        Ok(pool)
    }

    /// Check out a connection, waiting up to `checkout_timeout` for one to
    /// become available.
    ///
    /// If the calling owner already holds a lease, the same connection is
    /// returned instead of deadlocking on a second slot. Dead connections
    /// discovered here are discarded and replaced transparently.
    pub async fn checkout(&self) -> Result<PooledConnection> {
        let owner = OwnerId::current();

        // Re-entrant checkout: same owner, same connection.
        if let Some(lease) = self.current_lease(owner) {
            self.shared.metrics.lock().checkouts_successful += 1;
            return Ok(PooledConnection {
                lease,
                shared: Arc::clone(&self.shared),
                primary: false,
            });
        }

        let timeout = self.shared.config.checkout_timeout;
        let started = Instant::now();
        match tokio::time::timeout(timeout, self.acquire()).await {
            Ok(Ok(conn)) => {
                self.shared.metrics.lock().checkouts_successful += 1;
                Ok(self.register(owner, conn))
            }
            Ok(Err(err)) => {
                self.shared.metrics.lock().checkouts_failed += 1;
                Err(err)
            }
            Err(_) => {
                let mut metrics = self.shared.metrics.lock();
                metrics.checkouts_failed += 1;
                metrics.checkout_timeouts += 1;
                drop(metrics);
                tracing::warn!(waited = ?started.elapsed(), "checkout timed out");
                Err(PoolError::CheckoutTimeout {
                    waited: started.elapsed(),
                })
            }
        }
    }

    /// Check out a connection without waiting for a slot.
    ///
    /// Returns `Ok(None)` when every connection is leased and the pool is at
    /// capacity. May still establish a new connection when under capacity.
    pub async fn try_checkout(&self) -> Result<Option<PooledConnection>> {
        let owner = OwnerId::current();
        if let Some(lease) = self.current_lease(owner) {
            return Ok(Some(PooledConnection {
                lease,
                shared: Arc::clone(&self.shared),
                primary: false,
            }));
        }

        let plan = {
            let mut state = self.shared.state.lock();
            if state.closed {
                return Err(PoolError::PoolClosed);
            }
            if let Some(conn) = state.idle.pop_front() {
                Some(Plan::Probe(conn))
            } else if state.total < self.shared.config.max_size {
                state.total += 1;
                Some(Plan::Create)
            } else {
                None
            }
        };

        match plan {
            Some(Plan::Probe(conn)) => match self.probe(conn).await {
                Some(conn) => Ok(Some(self.register(owner, conn))),
                None => Ok(None),
            },
            Some(Plan::Create) => {
                let conn = self.connect_one().await?;
                Ok(Some(self.register(owner, conn)))
            }
            _ => Ok(None),
        }
    }

    /// Run `f` with a checked-out connection, returning it to the pool on
    /// every exit path: normal return, error, and cancellation.
    ///
    /// Re-entrant: a nested call from the same owner receives the same
    /// connection rather than waiting on a second slot.
    pub async fn with_connection<T, F, Fut>(&self, f: F) -> Result<T>
    where
        F: FnOnce(PooledConnection) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let conn = self.checkout().await?;
        f(conn).await
    }

    /// Forcibly disconnect every connection, leased or not.
    ///
    /// Leased connections are revoked: their owners get
    /// [`PoolError::NotEstablished`] on next use. The pool itself stays
    /// usable; connections are re-established on demand.
    pub async fn clear_all(&self) {
        let (idle, leases, waiters) = {
            let mut state = self.shared.state.lock();
            let idle: Vec<Connection> = state.idle.drain(..).collect();
            let leases: Vec<Arc<Lease>> = state.leases.drain().map(|(_, l)| l).collect();
            let waiters: Vec<_> = state.waiters.drain(..).collect();
            state.total = 0;
            (idle, leases, waiters)
        };

        // Freed capacity: let every parked checkout retry against it.
        for waiter in waiters {
            let _ = waiter.send(Handoff::Retry);
        }

        for mut conn in idle {
            conn.close().await;
            self.shared.metrics.lock().connections_closed += 1;
        }

        for lease in leases {
            lease.revoke();
            // An owner mid-execute holds the slot lock; its guard will close
            // the connection on drop after observing the revocation.
            if let Ok(mut slot) = lease.slot.try_lock() {
                if let Some(mut conn) = slot.take() {
                    conn.close().await;
                    self.shared.metrics.lock().connections_closed += 1;
                }
            }
        }

        tracing::info!("pool cleared");
    }

    /// Shut the pool down. All connections are disconnected, outstanding
    /// leases are revoked, parked checkouts fail with
    /// [`PoolError::PoolClosed`], and the reaper stops.
    pub async fn close(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
        }
        self.stop_reaper();
        self.clear_all().await;
        tracing::info!("connection pool closed");
    }

    /// Whether [`close`](Pool::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Maximum number of connections.
    #[must_use]
    pub fn size(&self) -> usize {
        self.shared.config.max_size
    }

    /// Number of connections currently leased out.
    #[must_use]
    pub fn checked_out_count(&self) -> usize {
        self.shared.state.lock().leases.len()
    }

    /// Number of idle connections ready for checkout.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.shared.state.lock().idle.len()
    }

    /// A consistent snapshot of pool occupancy.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let state = self.shared.state.lock();
        PoolStatus {
            available: state.idle.len(),
            in_use: state.leases.len(),
            total: state.total,
            max: self.shared.config.max_size,
        }
    }

    /// Counters accumulated since pool creation.
    #[must_use]
    pub fn metrics(&self) -> PoolMetrics {
        let inner = self.shared.metrics.lock();
        PoolMetrics {
            connections_created: inner.connections_created,
            connections_closed: inner.connections_closed,
            checkouts_successful: inner.checkouts_successful,
            checkouts_failed: inner.checkouts_failed,
            checkout_timeouts: inner.checkout_timeouts,
            connections_reaped: inner.connections_reaped,
            uptime: self.shared.created_at.elapsed(),
        }
    }

    /// The pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Start the background reaper if it is not already running.
    ///
    /// Uses `reaping_frequency` from the configuration; does nothing when the
    /// frequency is `None`.
    pub fn start_reaper(&self) {
        let Some(frequency) = self.shared.config.reaping_frequency else {
            return;
        };
        let mut slot = self.shared.reaper.lock();
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        *slot = Some(reaper::spawn(&self.shared, frequency));
    }

    /// Stop the background reaper. Leases already being examined finish
    /// their pass.
    pub fn stop_reaper(&self) {
        if let Some(handle) = self.shared.reaper.lock().take() {
            handle.abort();
            tracing::debug!("reaper stopped");
        }
    }

    fn current_lease(&self, owner: OwnerId) -> Option<Arc<Lease>> {
        let state = self.shared.state.lock();
        state
            .leases
            .get(&owner)
            .filter(|lease| !lease.is_revoked())
            .cloned()
    }

    async fn acquire(&self) -> Result<Connection> {
        let mut dead_attempts: u32 = 0;
        loop {
            let plan = {
                let mut state = self.shared.state.lock();
                if state.closed {
                    return Err(PoolError::PoolClosed);
                }
                if let Some(conn) = state.idle.pop_front() {
                    Plan::Probe(conn)
                } else if state.total < self.shared.config.max_size {
                    state.total += 1;
                    Plan::Create
                } else {
                    let (tx, rx) = oneshot::channel();
                    state.waiters.push_back(tx);
                    Plan::Wait(rx)
                }
            };

            let candidate = match plan {
                Plan::Probe(conn) => self.probe(conn).await,
                Plan::Create => return self.connect_one().await,
                Plan::Wait(rx) => match rx.await {
                    Ok(Handoff::Conn(mut parcel)) => match parcel.claim() {
                        Some(conn) => self.probe(conn).await,
                        None => continue,
                    },
                    // Capacity freed, or the pool dropped our sender; loop
                    // around and re-plan.
                    Ok(Handoff::Retry) | Err(_) => continue,
                },
            };

            match candidate {
                Some(conn) => return Ok(conn),
                None => {
                    dead_attempts += 1;
                    if dead_attempts >= self.shared.config.max_recover_attempts {
                        return Err(PoolError::Unavailable {
                            attempts: dead_attempts,
                        });
                    }
                }
            }
        }
    }

    /// Verify a candidate connection before handing it to a caller. Dead
    /// connections are discarded, freeing their slot.
    async fn probe(&self, conn: Connection) -> Option<Connection> {
        let mut guard = CandidateGuard {
            shared: Arc::clone(&self.shared),
            conn: Some(conn),
        };
        let alive = match guard.conn.as_mut() {
            Some(conn) => conn.ping().await,
            None => false,
        };
        let mut conn = guard.conn.take()?;

        if alive {
            Some(conn)
        } else {
            tracing::warn!(
                connection_id = conn.id(),
                "discarding dead connection found at checkout"
            );
            self.shared.free_slot();
            conn.close().await;
            self.shared.metrics.lock().connections_closed += 1;
            None
        }
    }

    /// Establish a new connection for an already-reserved capacity slot.
    async fn connect_one(&self) -> Result<Connection> {
        let mut reservation = SlotReservation {
            shared: Arc::clone(&self.shared),
            armed: true,
        };

        match self.shared.driver.connect(&self.shared.connect_config).await {
            Ok(inner) => {
                reservation.armed = false;
                let id = self.shared.next_connection_id();
                let conn = Connection::new(
                    id,
                    inner,
                    self.shared.config.statement_limit,
                    Arc::clone(&self.shared.observer),
                );
                self.shared.metrics.lock().connections_created += 1;
                tracing::debug!(connection_id = id, "established new connection");
                Ok(conn)
            }
            Err(err) => {
                // The reservation guard frees the slot and wakes a waiter.
                tracing::warn!(error = %err, "failed to establish connection");
                Err(PoolError::Connect(err))
            }
        }
    }

    fn register(&self, owner: OwnerId, conn: Connection) -> PooledConnection {
        let connection_id = conn.id();
        let lease = Arc::new(Lease::new(owner, conn));
        self.shared
            .state
            .lock()
            .leases
            .insert(owner, Arc::clone(&lease));
        tracing::trace!(owner = ?owner, connection_id, "connection checked out");
        PooledConnection {
            lease,
            shared: Arc::clone(&self.shared),
            primary: true,
        }
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.status();
        f.debug_struct("Pool")
            .field("max", &status.max)
            .field("total", &status.total)
            .field("in_use", &status.in_use)
            .finish()
    }
}

/// Builder for creating a [`Pool`].
pub struct PoolBuilder {
    driver: Arc<dyn Driver>,
    connect_config: ConnectConfig,
    config: PoolConfig,
    observer: Arc<dyn ExecuteObserver>,
}

impl PoolBuilder {
    fn new(driver: Arc<dyn Driver>, connect_config: ConnectConfig) -> Self {
        Self {
            driver,
            connect_config,
            config: PoolConfig::default(),
            observer: Arc::new(TracingObserver),
        }
    }

    /// Replace the whole pool configuration.
    #[must_use]
    pub fn pool_config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the maximum pool size.
    #[must_use]
    pub fn max_size(mut self, size: usize) -> Self {
        self.config.max_size = size;
        self
    }

    /// Set the checkout timeout.
    #[must_use]
    pub fn checkout_timeout(mut self, timeout: Duration) -> Self {
        self.config.checkout_timeout = timeout;
        self
    }

    /// Set the prepared-statement cache bound.
    #[must_use]
    pub fn statement_limit(mut self, limit: usize) -> Self {
        self.config.statement_limit = limit;
        self
    }

    /// Set the reaper interval, or disable the reaper with `None`.
    #[must_use]
    pub fn reaping_frequency(mut self, frequency: Option<Duration>) -> Self {
        self.config.reaping_frequency = frequency;
        self
    }

    /// Set the lease staleness threshold.
    #[must_use]
    pub fn stale_threshold(mut self, threshold: Duration) -> Self {
        self.config.stale_threshold = threshold;
        self
    }

    /// Set how many dead connections a single checkout may discard before
    /// failing.
    #[must_use]
    pub fn max_recover_attempts(mut self, attempts: u32) -> Self {
        self.config.max_recover_attempts = attempts;
        self
    }

    /// Set the execute observer. Defaults to [`TracingObserver`].
    #[must_use]
    pub fn observer(mut self, observer: Arc<dyn ExecuteObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Build the pool.
    pub async fn build(self) -> Result<Pool> {
        Pool::new(self.driver, self.connect_config, self.config, self.observer).await
    }
}

/// Status information about the pool.
#[derive(Debug, Clone, Copy)]
pub struct PoolStatus {
    /// Number of idle connections available for checkout.
    pub available: usize,
    /// Number of connections currently leased out.
    pub in_use: usize,
    /// Total connections created and not yet closed.
    pub total: usize,
    /// Maximum allowed connections.
    pub max: usize,
}

impl PoolStatus {
    /// Leased connections as a percentage of capacity.
    #[must_use]
    pub fn utilization(&self) -> f64 {
        if self.max == 0 {
            return 0.0;
        }
        (self.in_use as f64 / self.max as f64) * 100.0
    }

    /// Whether every slot is occupied.
    #[must_use]
    pub fn is_at_capacity(&self) -> bool {
        self.total >= self.max
    }
}

/// Metrics collected from the pool.
#[derive(Debug, Clone)]
pub struct PoolMetrics {
    /// Total connections established since pool creation.
    pub connections_created: u64,
    /// Total connections closed since pool creation.
    pub connections_closed: u64,
    /// Successful checkouts, including re-entrant ones.
    pub checkouts_successful: u64,
    /// Failed checkouts (timeouts, connect failures, pool closed).
    pub checkouts_failed: u64,
    /// Checkouts that failed specifically by timeout.
    pub checkout_timeouts: u64,
    /// Connections reclaimed by the reaper.
    pub connections_reaped: u64,
    /// Time since pool creation.
    pub uptime: Duration,
}

impl PoolMetrics {
    /// Checkout success rate in `0.0..=1.0`; `1.0` when nothing happened yet.
    #[must_use]
    pub fn checkout_success_rate(&self) -> f64 {
        let total = self.checkouts_successful + self.checkouts_failed;
        if total == 0 {
            return 1.0;
        }
        self.checkouts_successful as f64 / total as f64
    }
}

/// A connection leased from the pool.
///
/// Checked in automatically when dropped, on every exit path, exactly once.
/// All use goes through the owner that checked it out; calls from any other
/// thread or task fail with [`PoolError::OwnershipViolation`].
pub struct PooledConnection {
    pub(crate) lease: Arc<Lease>,
    pub(crate) shared: Arc<PoolShared>,
    /// The guard that registered the lease. Re-entrant guards share the lease
    /// but never check it in.
    pub(crate) primary: bool,
}

impl PooledConnection {
    /// Identifier of the leased connection.
    #[must_use]
    pub fn connection_id(&self) -> u64 {
        self.lease.connection_id
    }

    /// The owner this connection is leased to.
    #[must_use]
    pub fn owner(&self) -> OwnerId {
        self.lease.owner
    }

    /// Execute a statement on the leased connection.
    pub async fn execute(&self, sql: &str, binds: &[Value]) -> Result<ExecuteResult> {
        let mut slot = self.slot_for_use().await?;
        let conn = slot.as_mut().ok_or(PoolError::NotEstablished)?;
        Ok(conn.execute(sql, binds).await?)
    }

    /// Probe the leased connection's liveness.
    pub async fn ping(&self) -> Result<bool> {
        let mut slot = self.slot_for_use().await?;
        match slot.as_mut() {
            Some(conn) => Ok(conn.ping().await),
            None => Ok(false),
        }
    }

    /// Deallocate every cached prepared statement, e.g. after DDL changed
    /// the schema under the cached plans.
    pub async fn clear_statement_cache(&self) -> Result<()> {
        let mut slot = self.slot_for_use().await?;
        if let Some(conn) = slot.as_mut() {
            conn.clear_statement_cache().await;
        }
        Ok(())
    }

    /// Forcibly evict this connection from the pool, disconnecting it.
    ///
    /// For use after unrecoverable errors or administrative action; the slot
    /// becomes available to other callers immediately.
    pub async fn remove(self) {
        self.lease.revoke();
        let conn = self.lease.slot.lock().await.take();
        if let Some(mut conn) = conn {
            {
                let mut state = self.shared.state.lock();
                self.shared.forget_lease_locked(&mut state, &self.lease);
                state.total = state.total.saturating_sub(1);
                state.wake_retry();
            }
            tracing::debug!(
                connection_id = conn.id(),
                "connection removed from pool"
            );
            conn.close().await;
            self.shared.metrics.lock().connections_closed += 1;
        }
        // Drop sees an empty, revoked lease and does no further bookkeeping.
    }

    /// Guarded access to the connection slot: enforces ownership and
    /// revocation before any use.
    async fn slot_for_use(
        &self,
    ) -> Result<tokio::sync::MutexGuard<'_, Option<Connection>>> {
        if OwnerId::current() != self.lease.owner {
            return Err(PoolError::OwnershipViolation);
        }
        if self.lease.is_revoked() {
            return Err(PoolError::NotEstablished);
        }
        let slot = self.lease.slot.lock().await;
        // Re-check: the pool may have revoked while we waited for the slot.
        if self.lease.is_revoked() {
            return Err(PoolError::NotEstablished);
        }
        Ok(slot)
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if !self.primary {
            return;
        }
        self.lease.mark_released();
        match self.lease.slot.try_lock() {
            Ok(mut slot) => match slot.take() {
                Some(conn) => {
                    drop(slot);
                    if self.lease.is_revoked() {
                        // The pool already wrote this connection off.
                        close_in_background(&self.shared, conn);
                    } else {
                        self.shared.checkin(&self.lease, conn);
                    }
                }
                None => {
                    // Reaper or clear_all already took the connection and
                    // settled the accounting.
                    drop(slot);
                    self.shared.forget_lease(&self.lease);
                }
            },
            Err(_) => {
                // The reaper holds the slot lock mid-probe. It observes the
                // released flag and performs the checkin itself.
            }
        }
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("connection_id", &self.lease.connection_id)
            .field("owner", &self.lease.owner)
            .field("primary", &self.primary)
            .finish()
    }
}

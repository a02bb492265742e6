//! Background reclamation of abandoned connections.
//!
//! The reaper periodically scans outstanding leases and reclaims connections
//! whose lease is older than the staleness threshold *and* whose connection
//! no longer responds to a ping. A slow-but-live transaction is left alone;
//! only the combination of stale and dead is treated as abandonment.

use std::sync::Arc;

use tokio::time::MissedTickBehavior;

use crate::lease::Lease;
use crate::pool::PoolShared;

/// Spawn the reaper task. Holds only a weak reference so an abandoned pool
/// can be dropped; the task exits on the first tick after that.
pub(crate) fn spawn(
    shared: &Arc<PoolShared>,
    frequency: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    let weak = Arc::downgrade(shared);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(frequency);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of `interval` fires immediately; skip it.
        ticker.tick().await;
        tracing::debug!(?frequency, "reaper started");
        loop {
            ticker.tick().await;
            let Some(shared) = weak.upgrade() else {
                break;
            };
            if shared.state.lock().closed {
                break;
            }
            reap_pass(&shared).await;
        }
        tracing::debug!("reaper exited");
    })
}

/// One scan over outstanding leases.
async fn reap_pass(shared: &Arc<PoolShared>) {
    let threshold = shared.config.stale_threshold;
    let stale: Vec<Arc<Lease>> = {
        let state = shared.state.lock();
        state
            .leases
            .values()
            .filter(|lease| lease.age() >= threshold && !lease.is_revoked())
            .cloned()
            .collect()
    };

    for lease in stale {
        examine(shared, &lease).await;
    }
}

/// Decide the fate of one stale lease.
async fn examine(shared: &Arc<PoolShared>, lease: &Arc<Lease>) {
    // An owner actively using the connection holds the slot lock. Skip it;
    // active use is proof of life regardless of lease age.
    let Ok(mut slot) = lease.slot.try_lock() else {
        return;
    };
    let Some(conn) = slot.as_mut() else {
        return;
    };

    if conn.ping().await {
        tracing::trace!(
            connection_id = lease.connection_id,
            age = ?lease.age(),
            "stale lease still alive, leaving in place"
        );
        drop(slot);
        // The owner may have dropped its guard while we held the slot lock:
        // its Drop failed the try_lock, set `released`, and left the checkin
        // to us. The flag is re-read after releasing the lock because the
        // owner sets it before its try_lock attempt, so a failed attempt
        // implies the flag is visible by now.
        if lease.is_released() && !lease.is_revoked() {
            if let Ok(mut slot) = lease.slot.try_lock() {
                if let Some(conn) = slot.take() {
                    drop(slot);
                    tracing::trace!(
                        connection_id = lease.connection_id,
                        "owner released during probe, checking in on its behalf"
                    );
                    shared.checkin(lease, conn);
                }
            }
        }
        return;
    }

    tracing::warn!(
        connection_id = lease.connection_id,
        age = ?lease.age(),
        "reaping stale dead connection"
    );
    lease.revoke();
    let Some(mut conn) = slot.take() else {
        return;
    };
    drop(slot);

    {
        let mut state = shared.state.lock();
        if let Some(current) = state.leases.get(&lease.owner) {
            if Arc::ptr_eq(current, lease) {
                state.leases.remove(&lease.owner);
            }
        }
        state.total = state.total.saturating_sub(1);
        state.wake_retry();
    }

    conn.close().await;
    {
        let mut metrics = shared.metrics.lock();
        metrics.connections_reaped += 1;
        metrics.connections_closed += 1;
    }

    // The owner may have dropped its guard while we held the slot lock; its
    // Drop saw the lock taken and left the checkin to us. The slot is empty
    // and the lease revoked, so there is nothing further to settle here, but
    // the released flag tells us not to expect the owner to clean up.
    if lease.is_released() {
        tracing::trace!(
            connection_id = lease.connection_id,
            "owner released during reap"
        );
    }
}

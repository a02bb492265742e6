//! Owner identity and lease bookkeeping.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;
use tokio::time::Instant;

use dbpool_conn::Connection;

/// Identity of the thread or task currently holding a lease.
///
/// Inside the tokio runtime this is the task id, which stays stable even when
/// the scheduler migrates the task across worker threads. Off-runtime callers
/// fall back to their OS thread id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OwnerId {
    /// A tokio task.
    Task(tokio::task::Id),
    /// An OS thread, for callers outside any tokio task.
    Thread(std::thread::ThreadId),
}

impl OwnerId {
    /// Identity of the current caller.
    #[must_use]
    pub fn current() -> Self {
        tokio::task::try_id().map_or_else(
            || OwnerId::Thread(std::thread::current().id()),
            OwnerId::Task,
        )
    }
}

/// Shared record of one outstanding lease.
///
/// The pool holds one strong reference in its lease table and each
/// [`PooledConnection`](crate::PooledConnection) guard holds another. The
/// connection itself lives in `slot`; it is `None` once the pool has taken the
/// connection back (reaper reclamation, removal, `clear_all`).
pub(crate) struct Lease {
    pub(crate) owner: OwnerId,
    pub(crate) connection_id: u64,
    pub(crate) leased_at: Instant,
    pub(crate) slot: Mutex<Option<Connection>>,
    /// Set when the pool has written this connection off; any further use
    /// through the lease fails with `NotEstablished`.
    revoked: AtomicBool,
    /// Set by the owner's guard on drop. Covers the window where the reaper
    /// holds the slot lock while the owner releases: the reaper observes this
    /// flag and performs the checkin itself.
    released: AtomicBool,
}

impl Lease {
    pub(crate) fn new(owner: OwnerId, conn: Connection) -> Self {
        Self {
            owner,
            connection_id: conn.id(),
            leased_at: Instant::now(),
            slot: Mutex::new(Some(conn)),
            revoked: AtomicBool::new(false),
            released: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_revoked(&self) -> bool {
        self.revoked.load(Ordering::Acquire)
    }

    pub(crate) fn revoke(&self) {
        self.revoked.store(true, Ordering::Release);
    }

    pub(crate) fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    pub(crate) fn mark_released(&self) {
        self.released.store(true, Ordering::Release);
    }

    pub(crate) fn age(&self) -> std::time::Duration {
        self.leased_at.elapsed()
    }
}

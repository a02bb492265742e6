//! Bounded per-connection prepared-statement cache.

use std::num::NonZeroUsize;

use lru::LruCache;

use dbpool_driver::StatementHandle;

/// LRU cache mapping exact SQL text to a server-side prepared-statement handle.
///
/// The cache only stores handles; preparing and deallocating statements is the
/// caller's job (see [`Connection`](crate::Connection)), because both require
/// driver I/O. Eviction is signalled by returning the displaced handle from
/// [`evict_if_full`](StatementCache::evict_if_full) so the caller can
/// deallocate it in the same turn as the insertion.
///
/// Owned exclusively by one connection; no internal locking.
#[derive(Debug)]
pub struct StatementCache {
    cache: LruCache<String, StatementHandle>,
    hits: u64,
    misses: u64,
}

impl StatementCache {
    /// Create a cache bounded at `limit` statements.
    ///
    /// Returns `None` when `limit` is zero (prepared-statement mode disabled).
    #[must_use]
    pub fn new(limit: usize) -> Option<Self> {
        NonZeroUsize::new(limit).map(|capacity| Self {
            cache: LruCache::new(capacity),
            hits: 0,
            misses: 0,
        })
    }

    /// Maximum number of cached statements.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.cache.cap().get()
    }

    /// Current number of cached statements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Number of cache hits.
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Number of cache misses.
    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Hit rate in `0.0..=1.0`; `0.0` when nothing was looked up yet.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Whether `sql` is cached, without touching recency.
    #[must_use]
    pub fn contains(&self, sql: &str) -> bool {
        self.cache.peek(sql).is_some()
    }

    /// Look up `sql`, marking the entry most-recently-used on a hit.
    pub fn get(&mut self, sql: &str) -> Option<StatementHandle> {
        match self.cache.get(sql) {
            Some(handle) => {
                self.hits += 1;
                Some(*handle)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Evict the least-recently-used entry if the cache is full, returning the
    /// displaced handle for deallocation.
    ///
    /// Call this before [`insert`](StatementCache::insert) so the displaced
    /// statement is deallocated before the new entry lands.
    pub fn evict_if_full(&mut self) -> Option<StatementHandle> {
        if self.cache.len() < self.capacity() {
            return None;
        }
        self.cache.pop_lru().map(|(sql, handle)| {
            tracing::debug!(handle = %handle, sql_len = sql.len(), "evicting prepared statement");
            handle
        })
    }

    /// Insert a freshly prepared statement at the most-recently-used position.
    pub fn insert(&mut self, sql: String, handle: StatementHandle) {
        self.cache.put(sql, handle);
    }

    /// Remove every entry, returning the handles for deallocation.
    pub fn drain(&mut self) -> Vec<StatementHandle> {
        let handles = self.cache.iter().map(|(_, h)| *h).collect();
        self.cache.clear();
        self.hits = 0;
        self.misses = 0;
        handles
    }
}

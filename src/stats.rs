//! Cache statistics counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time snapshot of cache statistics.
///
/// Counters are updated atomically but not snapshotted together: each field
/// is individually monotonic, while cross-field relationships may be off by
/// in-flight operations.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    /// Number of successfully found keys.
    pub hits: u64,
    /// Number of not found keys.
    pub misses: u64,
    /// Number of successfully deleted keys.
    pub del_hits: u64,
    /// Number of delete calls that found nothing to delete.
    pub del_misses: u64,
    /// Number of detected key collisions.
    pub collisions: u64,
    /// Number of entries evicted past their life window.
    pub evicted_expired: u64,
    /// Number of entries evicted to make room for new ones.
    pub evicted_no_space: u64,
}

/// Per-shard counters. Atomics so readers never need the shard lock.
#[derive(Debug, Default)]
pub(crate) struct ShardCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    del_hits: AtomicU64,
    del_misses: AtomicU64,
    collisions: AtomicU64,
    evicted_expired: AtomicU64,
    evicted_no_space: AtomicU64,
}

impl ShardCounters {
    pub(crate) fn snapshot(&self) -> Stats {
        Stats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            del_hits: self.del_hits.load(Ordering::Relaxed),
            del_misses: self.del_misses.load(Ordering::Relaxed),
            collisions: self.collisions.load(Ordering::Relaxed),
            evicted_expired: self.evicted_expired.load(Ordering::Relaxed),
            evicted_no_space: self.evicted_no_space.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn inc_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_del_hit(&self) {
        self.del_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_del_miss(&self) {
        self.del_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_collision(&self) {
        self.collisions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_evicted_expired(&self) {
        self.evicted_expired.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_evicted_no_space(&self) {
        self.evicted_no_space.fetch_add(1, Ordering::Relaxed);
    }
}

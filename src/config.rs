//! Cache configuration and shard sizing arithmetic.

use std::sync::Arc;
use std::time::Duration;

use crate::traits::{KeyHasher, Logger, OnRemoveCallback};

/// Minimum number of entries a shard is sized for, however small the
/// entries-in-window hint.
const MIN_ENTRIES_IN_SHARD: usize = 10;

const BYTES_PER_MB: usize = 1_048_576;

/// Configuration for [`ByteCache`](crate::ByteCache).
///
/// Only `shards` is validated (it must be a power of two); the sizing hints
/// trade memory for fewer buffer expansions and can be rough. When the load
/// is predictable, set `max_entries_in_window` and `max_entry_size` so the
/// initial allocation covers it and no expansion ever runs.
#[derive(Clone)]
pub struct Config {
    /// Number of cache shards; must be a power of two.
    pub shards: usize,
    /// Time after which an entry can be evicted.
    pub life_window: Duration,
    /// Interval between expiry sweeps. Zero disables the background worker;
    /// entries then expire only opportunistically during `set`. Sub-second
    /// values are counterproductive, the cache has one-second resolution.
    pub clean_window: Duration,
    /// Expected number of entries within the life window. Sizing hint only.
    pub max_entries_in_window: usize,
    /// Expected size of an entry in bytes. Sizing hint only.
    pub max_entry_size: usize,
    /// Limit for the whole cache, in megabytes; 0 means unlimited. When the
    /// limit is reached the oldest entries are overwritten by new ones. This
    /// caps allocated ring bytes, not live payload.
    pub hard_max_cache_size: usize,
    /// Maps string keys to 64-bit hashes. Defaults to FNV-1a.
    pub hasher: Option<Arc<dyn KeyHasher>>,
    /// Fired when an entry is removed by expiry, displacement pressure, or
    /// an explicit delete. The view passed in aliases ring memory.
    pub on_remove: Option<OnRemoveCallback>,
    /// Log sink. Defaults to a no-op.
    pub logger: Option<Arc<dyn Logger>>,
}

impl Config {
    /// Configuration with sane defaults for the given eviction window.
    pub fn new(life_window: Duration) -> Self {
        Self {
            shards: 1024,
            life_window,
            clean_window: Duration::from_secs(1),
            max_entries_in_window: 1000 * 10 * 60,
            max_entry_size: 500,
            hard_max_cache_size: 0,
            hasher: None,
            on_remove: None,
            logger: None,
        }
    }

    /// Number of entries a single shard is initially sized for.
    pub(crate) fn initial_shard_entries(&self) -> usize {
        (self.max_entries_in_window / self.shards).max(MIN_ENTRIES_IN_SHARD)
    }

    /// Hard byte cap for a single shard's ring; 0 means unlimited.
    pub(crate) fn max_shard_bytes(&self) -> usize {
        if self.hard_max_cache_size > 0 {
            self.hard_max_cache_size * BYTES_PER_MB / self.shards
        } else {
            0
        }
    }

    /// Initial ring allocation for a single shard, clamped to the cap.
    pub(crate) fn initial_shard_bytes(&self) -> usize {
        let initial = self.initial_shard_entries() * self.max_entry_size;
        let max = self.max_shard_bytes();
        if max > 0 && initial > max {
            max
        } else {
            initial
        }
    }
}

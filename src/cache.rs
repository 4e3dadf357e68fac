//! Sharded front controller.
//!
//! `ByteCache` hashes each key to 64 bits, routes it to a shard with
//! `hash & (shards - 1)`, and aggregates the per-shard answers for `len`,
//! `capacity`, and `stats`. When a clean window is configured it also owns
//! the background worker that sweeps expired entries out of every shard.
//!
//! ## Example Usage
//!
//! ```
//! use bytecache::{ByteCache, Config};
//! use std::time::Duration;
//!
//! let mut config = Config::new(Duration::from_secs(60));
//! config.shards = 4;
//! config.max_entries_in_window = 1024;
//! config.max_entry_size = 64;
//!
//! let cache = ByteCache::new(config).unwrap();
//! cache.set("greeting", b"hello").unwrap();
//! assert_eq!(cache.get("greeting").unwrap(), b"hello");
//! cache.close();
//! ```
//!
//! Entries are opaque bytes; serialization sits in front of the cache. Every
//! operation comes in two spellings: one that takes a string key and hashes
//! it internally, and a `_hashed` one that takes a precomputed 64-bit hash
//! and skips the collision check on read.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, select, tick, Sender};

use crate::config::Config;
use crate::ds::entry::EntryView;
use crate::error::{CacheError, ConfigError};
use crate::shard::CacheShard;
use crate::stats::Stats;
use crate::traits::{Clock, Fnv64, KeyHasher, Logger, NopLogger, SystemClock};

/// Concurrent, evicting cache for opaque byte payloads, tuned for very
/// large entry counts with predictable latency.
///
/// Entry storage lives in plain byte buffers rather than as individually
/// managed objects, so holding millions of entries does not mean millions
/// of allocations. Eviction is strictly FIFO by insertion, driven by the
/// configured life window and by space pressure.
pub struct ByteCache {
    shards: Arc<Vec<CacheShard>>,
    shard_mask: u64,
    hasher: Arc<dyn KeyHasher>,
    close_tx: Option<Sender<()>>,
}

impl std::fmt::Debug for ByteCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteCache")
            .field("shard_mask", &self.shard_mask)
            .finish_non_exhaustive()
    }
}

impl ByteCache {
    /// Builds a cache from `config`.
    ///
    /// Fails when the shard count is not a power of two; everything else in
    /// the configuration is taken as-is.
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub(crate) fn with_clock(config: Config, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        if !config.shards.is_power_of_two() {
            return Err(ConfigError::new(format!(
                "shard count must be a power of two, got {}",
                config.shards
            )));
        }

        let hasher = config
            .hasher
            .clone()
            .unwrap_or_else(|| Arc::new(Fnv64) as Arc<dyn KeyHasher>);
        let logger = config
            .logger
            .clone()
            .unwrap_or_else(|| Arc::new(NopLogger) as Arc<dyn Logger>);

        let life_window = config.life_window.as_secs();
        let initial_entries = config.initial_shard_entries();
        let initial_bytes = config.initial_shard_bytes();
        let max_bytes = config.max_shard_bytes();

        let mut shards = Vec::with_capacity(config.shards);
        for _ in 0..config.shards {
            shards.push(CacheShard::new(
                initial_entries,
                initial_bytes,
                max_bytes,
                life_window,
                Arc::clone(&clock),
                Arc::clone(&logger),
                config.on_remove.clone(),
            ));
        }
        let shards = Arc::new(shards);

        let close_tx = if config.clean_window > Duration::ZERO {
            let worker_shards = Arc::clone(&shards);
            let worker_clock = Arc::clone(&clock);
            let ticker = tick(config.clean_window);
            let (close_tx, close_rx) = bounded::<()>(1);
            thread::spawn(move || loop {
                select! {
                    recv(ticker) -> _ => {
                        let now = worker_clock.epoch();
                        for shard in worker_shards.iter() {
                            shard.clean_up(now);
                        }
                    }
                    recv(close_rx) -> _ => break,
                }
            });
            Some(close_tx)
        } else {
            None
        };

        Ok(Self {
            shard_mask: (config.shards - 1) as u64,
            shards,
            hasher,
            close_tx,
        })
    }

    #[inline]
    fn shard_for(&self, hash: u64) -> &CacheShard {
        &self.shards[(hash & self.shard_mask) as usize]
    }

    /// Reads the entry for `key`, returning a copy of the cached payload.
    pub fn get(&self, key: &str) -> Result<Vec<u8>, CacheError> {
        let hash = self.hasher.sum64(key);
        self.shard_for(hash).get(Some(key), hash)
    }

    /// Like [`get`](Self::get) for a precomputed hash. Skips the collision
    /// check, so a colliding key's payload is returned as-is.
    pub fn get_hashed(&self, hash: u64) -> Result<Vec<u8>, CacheError> {
        self.shard_for(hash).get(None, hash)
    }

    /// Reads the entry for `key` and hands it to `processor` as a borrowed
    /// view, avoiding the payload copy. The view aliases the shard's buffer
    /// and must not be retained past the call.
    pub fn get_with_processing<F>(&self, key: &str, mut processor: F) -> Result<(), CacheError>
    where
        F: FnMut(&EntryView<'_>) -> Result<(), CacheError>,
    {
        let hash = self.hasher.sum64(key);
        self.shard_for(hash).get_with(Some(key), hash, &mut processor)
    }

    /// Like [`get_with_processing`](Self::get_with_processing) for a
    /// precomputed hash.
    pub fn get_hashed_with_processing<F>(
        &self,
        hash: u64,
        mut processor: F,
    ) -> Result<(), CacheError>
    where
        F: FnMut(&EntryView<'_>) -> Result<(), CacheError>,
    {
        self.shard_for(hash).get_with(None, hash, &mut processor)
    }

    /// Saves `payload` under `key`.
    pub fn set(&self, key: &str, payload: &[u8]) -> Result<(), CacheError> {
        let hash = self.hasher.sum64(key);
        self.shard_for(hash).set(Some(key), hash, payload)
    }

    /// Like [`set`](Self::set) for a precomputed hash. The stored key is
    /// empty.
    pub fn set_hashed(&self, hash: u64, payload: &[u8]) -> Result<(), CacheError> {
        self.shard_for(hash).set(None, hash, payload)
    }

    /// Concatenates `payload` onto the entry for `key`, creating it when
    /// absent. Useful for accumulating records under one key without a
    /// read-modify-write on the caller's side.
    pub fn append(&self, key: &str, payload: &[u8]) -> Result<(), CacheError> {
        let hash = self.hasher.sum64(key);
        self.shard_for(hash).append(Some(key), hash, payload)
    }

    /// Like [`append`](Self::append) for a precomputed hash.
    pub fn append_hashed(&self, hash: u64, payload: &[u8]) -> Result<(), CacheError> {
        self.shard_for(hash).append(None, hash, payload)
    }

    /// Removes the entry for `key`.
    pub fn delete(&self, key: &str) -> Result<(), CacheError> {
        let hash = self.hasher.sum64(key);
        self.shard_for(hash).delete(hash)
    }

    /// Like [`delete`](Self::delete) for a precomputed hash.
    pub fn delete_hashed(&self, hash: u64) -> Result<(), CacheError> {
        self.shard_for(hash).delete(hash)
    }

    /// Empties every shard. Allocated ring capacity is retained.
    pub fn reset(&self) {
        for shard in self.shards.iter() {
            shard.reset();
        }
    }

    /// Number of entries across all shards. A snapshot: concurrent
    /// mutators may make it stale before it returns.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.len()).sum()
    }

    /// True when no shard holds an entry.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes allocated across all shard rings. Monotonically non-decreasing
    /// for the life of the cache; `reset` does not shrink it.
    pub fn capacity(&self) -> usize {
        self.shards.iter().map(|shard| shard.capacity()).sum()
    }

    /// Sums per-shard statistics. Counters are individually monotonic but
    /// not snapshotted together.
    pub fn stats(&self) -> Stats {
        let mut total = Stats::default();
        for shard in self.shards.iter() {
            let s = shard.stats();
            total.hits += s.hits;
            total.misses += s.misses;
            total.del_hits += s.del_hits;
            total.del_misses += s.del_misses;
            total.collisions += s.collisions;
            total.evicted_expired += s.evicted_expired;
            total.evicted_no_space += s.evicted_no_space;
        }
        total
    }

    /// Calls `processor` for each entry in the cache with a copy decoupled
    /// from ring memory.
    ///
    /// Returning [`CacheError::NotFound`] from the processor stops the
    /// iteration early and counts as success; any other error aborts and is
    /// surfaced. The iteration is not a consistent snapshot: an entry
    /// stored or deleted concurrently may be reflected from any point
    /// during the call, or missed entirely, but no entry is visited twice.
    pub fn range<F>(&self, mut processor: F) -> Result<(), CacheError>
    where
        F: FnMut(&EntryView<'_>) -> Result<(), CacheError>,
    {
        for shard in self.shards.iter() {
            for r in shard.copy_refs() {
                let entry = match shard.copy_entry(r) {
                    Ok(entry) => entry,
                    Err(CacheError::NotFound) => continue,
                    Err(err) => return Err(err),
                };
                match processor(&entry.view()) {
                    Ok(()) => {},
                    Err(CacheError::NotFound) => return Ok(()),
                    Err(err) => return Err(err),
                }
            }
        }
        Ok(())
    }

    /// Signals the background worker to exit. Safe to call more than once;
    /// in-flight operations are not interrupted. Dropping the cache closes
    /// it as well.
    pub fn close(&self) {
        if let Some(close_tx) = &self.close_tx {
            let _ = close_tx.try_send(());
        }
    }
}

impl Drop for ByteCache {
    fn drop(&mut self) {
        self.close();
    }
}

// =============================================================================
// Tests
// =============================================================================

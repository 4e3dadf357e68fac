//! One independent bucket of the cache.
//!
//! A shard pairs a [`BytesRing`] with a hash-to-offset index behind a single
//! read-write lock, and owns the insert protocol that interleaves eviction
//! and retry. Lookups take the read lock; every mutator takes the write
//! lock, so operations within a shard are serializable. Stats counters are
//! atomics and never need the lock.
//!
//! Index invariants while the lock is held: every value is a live offset in
//! the ring; every non-tombstoned entry with a nonzero hash has exactly one
//! binding pointing at it; a newer insert displaces an older one by
//! tombstoning the old entry first.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::ds::entry::{EntryView, OwnedEntry, QRef, MAX_KEY_LEN};
use crate::ds::BytesRing;
use crate::error::{CacheError, QueueError};
use crate::stats::{ShardCounters, Stats};
use crate::traits::{Clock, Logger, OnRemoveCallback, RemoveReason};

struct ShardInner {
    index: FxHashMap<u64, QRef>,
    ring: BytesRing,
}

pub(crate) struct CacheShard {
    inner: RwLock<ShardInner>,
    stats: ShardCounters,
    life_window: u64,
    clock: Arc<dyn Clock>,
    logger: Arc<dyn Logger>,
    on_remove: Option<OnRemoveCallback>,
}

impl CacheShard {
    pub(crate) fn new(
        initial_entries: usize,
        initial_bytes: usize,
        max_bytes: usize,
        life_window: u64,
        clock: Arc<dyn Clock>,
        logger: Arc<dyn Logger>,
        on_remove: Option<OnRemoveCallback>,
    ) -> Self {
        Self {
            inner: RwLock::new(ShardInner {
                index: FxHashMap::with_capacity_and_hasher(initial_entries, Default::default()),
                ring: BytesRing::new(initial_bytes, max_bytes, Arc::clone(&logger)),
            }),
            stats: ShardCounters::default(),
            life_window,
            clock,
            logger,
            on_remove,
        }
    }

    /// Resolves `hash` to a readable offset, counting hits, misses, and
    /// collisions. `key` is `None` for the pre-hashed entry points, which
    /// skip the collision check.
    fn lookup(&self, inner: &ShardInner, key: Option<&str>, hash: u64) -> Result<QRef, CacheError> {
        let Some(&r) = inner.index.get(&hash) else {
            self.stats.inc_miss();
            return Err(CacheError::NotFound);
        };
        if let Err(err) = inner.ring.peek(r) {
            self.stats.inc_miss();
            return Err(err.into());
        }
        if let Some(key) = key {
            if inner.ring.collides(r, key.as_bytes()) {
                self.logger.printf(format_args!(
                    "collision detected: keys {:?} and {:?} share hash {:#x}",
                    key,
                    String::from_utf8_lossy(inner.ring.key_at(r)),
                    hash,
                ));
                self.stats.inc_collision();
                return Err(CacheError::NotFound);
            }
        }
        self.stats.inc_hit();
        Ok(r)
    }

    /// Returns a copy of the payload stored for `hash`.
    pub(crate) fn get(&self, key: Option<&str>, hash: u64) -> Result<Vec<u8>, CacheError> {
        let inner = self.inner.read();
        let r = self.lookup(&inner, key, hash)?;
        Ok(inner.ring.payload_copy(r))
    }

    /// Hands the entry for `hash` to `processor` as a borrowed view. The
    /// read lock is held for the duration of the call.
    pub(crate) fn get_with(
        &self,
        key: Option<&str>,
        hash: u64,
        processor: &mut dyn FnMut(&EntryView<'_>) -> Result<(), CacheError>,
    ) -> Result<(), CacheError> {
        let inner = self.inner.read();
        let r = self.lookup(&inner, key, hash)?;
        let view = inner.ring.get(r)?;
        processor(&view)
    }

    /// Stores `payload` under `hash`, displacing any previous entry for the
    /// same hash and evicting the oldest entries until the new one fits.
    pub(crate) fn set(&self, key: Option<&str>, hash: u64, payload: &[u8]) -> Result<(), CacheError> {
        let mut inner = self.inner.write();
        self.set_locked(&mut inner, key, hash, payload)
    }

    fn set_locked(
        &self,
        inner: &mut ShardInner,
        key: Option<&str>,
        hash: u64,
        payload: &[u8],
    ) -> Result<(), CacheError> {
        let key = key.unwrap_or("").as_bytes();
        if key.len() > MAX_KEY_LEN {
            // The key length field on the wire is a u16.
            return Err(CacheError::TooLarge(QueueError::EntryTooBig));
        }
        let now = self.clock.epoch();

        // Displace any previous entry for this hash. The binding goes away
        // even if the tombstone write fails; a dangling binding is worse
        // than a leaked tombstone.
        if let Some(prev) = inner.index.remove(&hash) {
            let _ = inner.ring.delete(prev);
        }

        // Opportunistic expiry of the oldest entry.
        if let Ok(oldest) = inner.ring.oldest() {
            if now.saturating_sub(inner.ring.timestamp_at(oldest)) > self.life_window {
                let _ = self.evict_oldest(inner, RemoveReason::Expired);
            }
        }

        let entry = EntryView {
            timestamp: now,
            hash,
            key,
            payload,
        };
        loop {
            match inner.ring.push(&entry) {
                Ok(r) => {
                    inner.index.insert(hash, r);
                    return Ok(());
                },
                Err(_) => {
                    if let Err(err) = self.evict_oldest(inner, RemoveReason::NoSpace) {
                        return Err(CacheError::TooLarge(err));
                    }
                },
            }
        }
    }

    /// Concatenates `payload` onto the entry for `hash`, or stores it alone
    /// when no entry exists. Atomic only with respect to this shard's lock.
    pub(crate) fn append(
        &self,
        key: Option<&str>,
        hash: u64,
        payload: &[u8],
    ) -> Result<(), CacheError> {
        let mut inner = self.inner.write();
        let combined = match self.lookup(&inner, key, hash) {
            Ok(r) => {
                let existing = inner.ring.get(r)?;
                let mut data = Vec::with_capacity(existing.payload.len() + payload.len());
                data.extend_from_slice(existing.payload);
                data.extend_from_slice(payload);
                data
            },
            Err(CacheError::NotFound) => payload.to_vec(),
            Err(err) => return Err(err),
        };
        self.set_locked(&mut inner, key, hash, &combined)
    }

    /// Tombstones the entry for `hash` and drops its binding.
    pub(crate) fn delete(&self, hash: u64) -> Result<(), CacheError> {
        let mut inner = self.inner.write();

        let Some(&r) = inner.index.get(&hash) else {
            self.stats.inc_del_miss();
            return Err(CacheError::NotFound);
        };
        if let Err(err) = inner.ring.delete(r) {
            self.stats.inc_del_miss();
            return Err(err.into());
        }
        inner.index.remove(&hash);

        if let Some(on_remove) = &self.on_remove {
            if let Ok(view) = inner.ring.get(r) {
                // The tombstone zeroed the hash field; restore it so the
                // callback sees the entry as it was stored.
                let view = EntryView { hash, ..view };
                on_remove(&view, RemoveReason::Deleted);
            }
        }
        self.stats.inc_del_hit();
        Ok(())
    }

    /// Evicts entries older than the life window, oldest first.
    pub(crate) fn clean_up(&self, now: u64) {
        let mut inner = self.inner.write();
        loop {
            let Ok(oldest) = inner.ring.oldest() else {
                break;
            };
            if now.saturating_sub(inner.ring.timestamp_at(oldest)) <= self.life_window {
                break;
            }
            if self.evict_oldest(&mut inner, RemoveReason::Expired).is_err() {
                break;
            }
        }
    }

    /// Pops the oldest entry. Tombstones and plugs are dropped silently;
    /// live entries lose their binding and are reported to the callback.
    ///
    /// # Panics
    ///
    /// Panics when called with [`RemoveReason::Deleted`]; explicit deletes
    /// flow through [`CacheShard::delete`].
    fn evict_oldest(&self, inner: &mut ShardInner, reason: RemoveReason) -> Result<(), QueueError> {
        let oldest = inner.ring.pop()?;
        let hash = inner.ring.hash_at(oldest);
        if hash == 0 {
            return Ok(());
        }
        inner.index.remove(&hash);

        match reason {
            RemoveReason::Expired => self.stats.inc_evicted_expired(),
            RemoveReason::NoSpace => self.stats.inc_evicted_no_space(),
            RemoveReason::Deleted => panic!("explicit deletes do not flow through eviction"),
        }

        if let Some(on_remove) = &self.on_remove {
            if let Ok(view) = inner.ring.get(oldest) {
                on_remove(&view, reason);
            }
        }
        Ok(())
    }

    /// Snapshot of the offsets currently bound in the index. Used by range
    /// iteration; the snapshot may go stale as soon as the lock drops.
    pub(crate) fn copy_refs(&self) -> Vec<QRef> {
        let inner = self.inner.read();
        inner.index.values().copied().collect()
    }

    /// Reads the entry at `r` into an owned copy, decoupled from ring
    /// memory before the lock is released.
    pub(crate) fn copy_entry(&self, r: QRef) -> Result<OwnedEntry, CacheError> {
        let inner = self.inner.read();
        Ok(inner.ring.get(r)?.to_owned_entry())
    }

    /// Drops every entry. Ring capacity is retained.
    pub(crate) fn reset(&self) {
        let mut inner = self.inner.write();
        inner.index.clear();
        inner.ring.reset();
    }

    /// Number of live bindings.
    pub(crate) fn len(&self) -> usize {
        self.inner.read().index.len()
    }

    /// Allocated ring bytes.
    pub(crate) fn capacity(&self) -> usize {
        self.inner.read().ring.capacity()
    }

    pub(crate) fn stats(&self) -> Stats {
        self.stats.snapshot()
    }
}

// =============================================================================
// Tests
// =============================================================================

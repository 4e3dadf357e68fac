//! FIFO ring queue of variable-length entries over one contiguous byte buffer.
//!
//! Every push returns a [`QRef`], the byte offset the entry was written at,
//! and that offset stays valid until the entry is popped, across any number
//! of intervening pushes, pops, and buffer expansions. Stable offsets are
//! what lets a shard index millions of entries without per-entry allocation.
//!
//! ## Architecture
//!
//! ```text
//!   Unwrapped (tail >= head):            Wrapped (tail < head):
//!
//!   0        head          tail  right   0      tail       head       right
//!   │  free  │█████████████│ free │      │██████│   free   │██████████│
//!   └────────┴─────────────┴──────┘      └──────┴──────────┴──────────┴──┘
//!            live = [head, tail)         live = [head, right) ∪ [0, tail)
//!            right == tail               right = high-water before wrap
//! ```
//!
//! ## Expansion Keeps Offsets Stable
//!
//! Growing a wrapped ring would normally move the low segment and invalidate
//! every outstanding offset. Instead, the low segment stays where it is and
//! the dead span between it and the old head is overwritten with a single
//! tombstoned "plug" entry, which eviction later skips silently:
//!
//! ```text
//!   before:  │CCCC│  gap   │BBBBBBBB│            tail=4, head=12, right=20
//!   after:   │CCCC│ plug   │BBBBBBBB│  free...   head=0, tail=right=20
//! ```
//!
//! The queue is unsynchronized; the owning shard serializes access.

use std::sync::Arc;

use crate::ds::entry::{self, EntryView, QRef, HEADER_SIZE};
use crate::error::{CacheError, QueueError};
use crate::traits::Logger;

/// Byte ring queue. Push appends at `tail`, pop advances `head`, expansion
/// doubles capacity while leaving every previously issued [`QRef`] valid.
pub struct BytesRing {
    buf: Vec<u8>,
    head: usize,
    tail: usize,
    right: usize,
    count: usize,
    max_capacity: usize,
    logger: Arc<dyn Logger>,
}

impl BytesRing {
    /// Creates a ring with `initial` bytes preallocated and a hard cap of
    /// `max_capacity` bytes (0 = unlimited).
    pub fn new(initial: usize, max_capacity: usize, logger: Arc<dyn Logger>) -> Self {
        Self {
            buf: vec![0; initial],
            head: 0,
            tail: 0,
            right: 0,
            count: 0,
            max_capacity,
            logger,
        }
    }

    /// Copies `entry` to the end of the queue, expanding the buffer if
    /// needed, and returns the offset it was written at.
    pub fn push(&mut self, entry: &EntryView<'_>) -> Result<QRef, QueueError> {
        let size = entry.size();

        if self.tail >= self.head {
            // Unwrapped. Try after tail, then before head, then grow.
            if self.buf.len() - self.tail < size {
                if self.head >= size + HEADER_SIZE {
                    // Wrap the tail; `right` keeps the old high-water mark.
                    self.tail = 0;
                } else if self.max_capacity > 0 && self.buf.len() + size >= self.max_capacity {
                    return Err(QueueError::Full);
                } else {
                    self.expand(size)?;
                }
            }
        } else {
            // Wrapped. The free span is [tail, head); a header-sized gap is
            // reserved so the plug written on expansion is always encodable.
            if self.head - self.tail < size + HEADER_SIZE {
                if self.max_capacity > 0 && self.buf.len() + size >= self.max_capacity {
                    return Err(QueueError::Full);
                }
                self.expand(size)?;
            }
        }

        entry::write(&mut self.buf, self.tail, entry);
        let offset = self.tail;
        self.tail += size;
        if self.tail > self.head {
            self.right = self.tail;
        }
        self.count += 1;
        Ok(QRef(offset))
    }

    /// Removes the oldest entry, returning the offset it lived at. The bytes
    /// are not cleared; the offset must not be read after a later push.
    pub fn pop(&mut self) -> Result<QRef, QueueError> {
        if self.count == 0 {
            return Err(QueueError::Empty);
        }
        if !entry::is_valid(&self.buf, self.head) {
            return Err(QueueError::InvalidIndex);
        }

        let offset = self.head;
        self.head += entry::size_at(&self.buf, offset);
        if self.head == self.right {
            self.head = 0;
            if self.tail == self.right {
                self.tail = 0;
            }
            self.right = self.tail;
        }
        self.count -= 1;
        Ok(QRef(offset))
    }

    /// Checks that `r` references a readable entry. Moves nothing.
    pub fn peek(&self, r: QRef) -> Result<(), QueueError> {
        if self.count == 0 {
            return Err(QueueError::Empty);
        }
        if !entry::is_valid(&self.buf, r.offset()) || r.offset() > self.right {
            return Err(QueueError::InvalidIndex);
        }
        Ok(())
    }

    /// Offset of the oldest entry.
    pub fn oldest(&self) -> Result<QRef, QueueError> {
        self.peek(QRef(self.head))?;
        Ok(QRef(self.head))
    }

    /// Reads the entry at `r` as a view aliasing the ring buffer.
    pub fn get(&self, r: QRef) -> Result<EntryView<'_>, CacheError> {
        entry::read(&self.buf, r.offset())
    }

    /// Copies the payload at `r`; safe to use outside the shard lock.
    pub fn payload_copy(&self, r: QRef) -> Vec<u8> {
        entry::payload_at(&self.buf, r.offset()).to_vec()
    }

    /// Timestamp field of the entry at `r`.
    pub fn timestamp_at(&self, r: QRef) -> u64 {
        entry::timestamp_at(&self.buf, r.offset())
    }

    /// Hash field of the entry at `r`; zero means tombstoned.
    pub fn hash_at(&self, r: QRef) -> u64 {
        entry::hash_at(&self.buf, r.offset())
    }

    /// True when the stored key at `r` differs from `key`.
    pub fn collides(&self, r: QRef, key: &[u8]) -> bool {
        entry::key_at(&self.buf, r.offset()) != key
    }

    /// Key bytes of the entry at `r`, aliasing the ring buffer.
    pub fn key_at(&self, r: QRef) -> &[u8] {
        entry::key_at(&self.buf, r.offset())
    }

    /// Tombstones the entry at `r` in place by zeroing its hash. Space is
    /// reclaimed only when the tombstone reaches `head` during eviction.
    pub fn delete(&mut self, r: QRef) -> Result<(), QueueError> {
        if self.count == 0 {
            return Err(QueueError::Empty);
        }
        if !entry::is_valid(&self.buf, r.offset()) || r.offset() > self.right {
            return Err(QueueError::InvalidIndex);
        }
        entry::clear_hash(&mut self.buf, r.offset());
        Ok(())
    }

    /// Empties the queue. The buffer keeps its current size.
    pub fn reset(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.right = 0;
        self.count = 0;
    }

    /// Number of entries in the queue, tombstones and plugs included.
    pub fn len(&self) -> usize {
        self.count
    }

    /// True when the queue holds no entries.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of allocated buffer bytes.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Reallocates the buffer so at least `minimum` more bytes fit, keeping
    /// all existing offsets unchanged.
    fn expand(&mut self, minimum: usize) -> Result<(), QueueError> {
        let current = self.buf.len();
        let mut capacity = current.max(minimum) * 2;
        if self.max_capacity > 0 && capacity > self.max_capacity {
            capacity = self.max_capacity;
        }
        if capacity < minimum {
            return Err(QueueError::EntryTooBig);
        }

        let mut grown = vec![0u8; capacity];
        grown[..self.right].copy_from_slice(&self.buf[..self.right]);
        if self.tail < self.head {
            // The low segment [0, tail) must keep its offsets; the dead span
            // up to the old head becomes a plug that eviction skips.
            entry::plug(&mut grown, self.tail, self.head);
            self.head = 0;
            self.tail = self.right;
            self.count += 1;
        }
        self.buf = grown;

        self.logger.printf(format_args!(
            "bytes ring expanded from {current} to {capacity} bytes"
        ));
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::NopLogger;

    fn ring(initial: usize, max: usize) -> BytesRing {
        BytesRing::new(initial, max, Arc::new(NopLogger))
    }

    /// Entry with an empty key and `payload_len` repeated bytes; total size
    /// is `HEADER_SIZE + payload_len`.
    fn blob(fill: u8, payload_len: usize) -> (Vec<u8>, u64) {
        (vec![fill; payload_len], 0xDADA_DADA_DADA_DADA)
    }

    fn view<'a>(payload: &'a [u8], hash: u64) -> EntryView<'a> {
        EntryView {
            timestamp: 0x5555_5555_5555_5555,
            hash,
            key: b"",
            payload,
        }
    }

    #[test]
    fn pop_of_empty_queue_fails() {
        let mut q = ring(10, 0);
        assert_eq!(q.pop(), Err(QueueError::Empty));
    }

    #[test]
    fn push_then_pop_round_trips() {
        let mut q = ring(100, 0);
        let entry = EntryView {
            timestamp: 7,
            hash: 42,
            key: b"key",
            payload: b"hello",
        };

        let r = q.push(&entry).unwrap();
        assert_eq!(r, QRef(0));
        assert_eq!(q.len(), 1);

        let popped = q.pop().unwrap();
        assert_eq!(popped, QRef(0));
        assert_eq!(q.get(popped).unwrap(), entry);
        assert_eq!(q.len(), 0);
    }

    #[test]
    fn peek_reports_empty_and_out_of_bounds() {
        let mut q = ring(100, 0);
        assert_eq!(q.peek(QRef(0)), Err(QueueError::Empty));

        let (payload, hash) = blob(b'a', 1);
        q.push(&view(&payload, hash)).unwrap();
        assert_eq!(q.peek(QRef(0)), Ok(()));
        assert_eq!(q.peek(QRef(10_000)), Err(QueueError::InvalidIndex));
    }

    #[test]
    fn get_reads_middle_entry_without_moving_pointers() {
        let mut q = ring(100, 0);
        let (pa, h) = blob(b'a', 1);
        let (pb, _) = blob(b'b', 1);
        let (pc, _) = blob(b'c', 1);

        q.push(&view(&pa, h)).unwrap();
        let r = q.push(&view(&pb, h)).unwrap();
        q.push(&view(&pc, h)).unwrap();

        assert_eq!(q.get(r).unwrap().payload, b"b");
        assert_eq!(q.len(), 3);
    }

    #[test]
    fn reset_empties_but_keeps_capacity() {
        let mut q = ring(200, 0);
        let (payload, hash) = blob(b'a', 8);
        q.push(&view(&payload, hash)).unwrap();
        q.push(&view(&payload, hash)).unwrap();
        q.push(&view(&payload, hash)).unwrap();

        q.reset();

        assert_eq!(q.len(), 0);
        assert_eq!(q.capacity(), 200);
        assert_eq!(q.peek(QRef(0)), Err(QueueError::Empty));

        // Still usable after reset.
        let r = q.push(&view(&payload, hash)).unwrap();
        assert_eq!(r, QRef(0));
        assert_eq!(q.pop(), Ok(QRef(0)));
    }

    #[test]
    fn tail_wraps_into_space_freed_by_pop() {
        // Capacity 110: a 70-byte entry, a 30-byte entry, then after popping
        // the first, a 30-byte push wraps to offset 0 without growing.
        let mut q = ring(110, 0);
        let (pa, h) = blob(b'a', 48);
        let (pb, _) = blob(b'b', 8);
        let (pc, _) = blob(b'c', 8);

        q.push(&view(&pa, h)).unwrap();
        q.push(&view(&pb, h)).unwrap();
        q.pop().unwrap();
        let rc = q.push(&view(&pc, h)).unwrap();

        assert_eq!(q.capacity(), 110);
        assert_eq!(rc, QRef(0));

        let r = q.pop().unwrap();
        assert_eq!(q.get(r).unwrap().payload, pb.as_slice());
    }

    #[test]
    fn fragmented_push_grows_and_keeps_offsets() {
        // A(25) + B(28) + C(28) + 10 slack. After A is popped the free space
        // is split 25 head / 10 tail, so D forces a doubling; offsets issued
        // before the growth must still resolve.
        let (pa, h) = blob(b'a', 3);
        let (pb, _) = blob(b'b', 6);
        let (pc, _) = blob(b'c', 6);
        let (pd, _) = blob(b'd', 6);
        let qsize = (HEADER_SIZE + 3) + 2 * (HEADER_SIZE + 6) + 10;
        let mut q = ring(qsize, 0);

        q.push(&view(&pa, h)).unwrap();
        let rb = q.push(&view(&pb, h)).unwrap();
        q.pop().unwrap();
        let rc = q.push(&view(&pc, h)).unwrap();
        let rd = q.push(&view(&pd, h)).unwrap();

        assert_eq!(q.capacity(), qsize * 2);
        assert_eq!(q.get(rb).unwrap().payload, pb.as_slice());
        assert_eq!(q.get(rc).unwrap().payload, pc.as_slice());
        assert_eq!(q.get(rd).unwrap().payload, pd.as_slice());
    }

    #[test]
    fn wrapped_expansion_plugs_gap_and_keeps_offsets() {
        // A(92) + B(32) + 10 slack = 134. Popping A and pushing C(52) wraps
        // the tail; D(62) fits in neither segment and forces expansion. The
        // gap between the low segment and the old head becomes a 40-byte
        // plug that pops out silently between C and B.
        let (pa, h) = blob(b'a', 70);
        let (pb, _) = blob(b'b', 10);
        let (pc, _) = blob(b'c', 30);
        let (pd, _) = blob(b'd', 40);
        let qsize = (HEADER_SIZE + 70) + (HEADER_SIZE + 10) + 10;
        let mut q = ring(qsize, 0);

        q.push(&view(&pa, h)).unwrap();
        let rb = q.push(&view(&pb, h)).unwrap();
        q.pop().unwrap();
        let rc = q.push(&view(&pc, h)).unwrap();
        assert_eq!(rc, QRef(0));
        let rd = q.push(&view(&pd, h)).unwrap();

        assert_eq!(q.capacity(), qsize * 2);
        assert_eq!(q.get(rb).unwrap().payload, pb.as_slice());
        assert_eq!(q.get(rd).unwrap().payload, pd.as_slice());

        // Pop order: C, the plug left by expansion, B, D.
        let r = q.pop().unwrap();
        assert_eq!(q.get(r).unwrap().payload, pc.as_slice());

        let r = q.pop().unwrap();
        let gap = q.get(r).unwrap();
        assert_eq!(gap.size(), 40);
        assert_eq!(gap.hash, 0);

        let r = q.pop().unwrap();
        assert_eq!(q.get(r).unwrap().payload, pb.as_slice());

        let r = q.pop().unwrap();
        assert_eq!(q.get(r).unwrap().payload, pd.as_slice());
        assert!(q.is_empty());
    }

    #[test]
    fn hard_cap_rejects_push_that_cannot_fit() {
        // Cap = A(47) + B(27) + 5. B forces a clamped expansion; C can never
        // fit and fails without disturbing A and B.
        let (pa, h) = blob(b'a', 25);
        let (pb, _) = blob(b'b', 5);
        let (pc, _) = blob(b'c', 25);
        let cap = (HEADER_SIZE + 25) + (HEADER_SIZE + 5) + 5;
        let mut q = ring(HEADER_SIZE + 25, cap);

        q.push(&view(&pa, h)).unwrap();
        q.push(&view(&pb, h)).unwrap();
        assert_eq!(q.capacity(), cap);

        assert_eq!(q.push(&view(&pc, h)), Err(QueueError::Full));
        assert_eq!(q.capacity(), cap);

        let r = q.pop().unwrap();
        assert_eq!(q.get(r).unwrap().payload, pa.as_slice());
        let r = q.pop().unwrap();
        assert_eq!(q.get(r).unwrap().payload, pb.as_slice());
    }

    #[test]
    fn zero_initial_capacity_expands_on_first_push() {
        let mut q = ring(0, 0);
        let (payload, hash) = blob(b'a', 8);

        let r = q.push(&view(&payload, hash)).unwrap();

        assert_eq!(r, QRef(0));
        assert_eq!(q.capacity(), (HEADER_SIZE + 8) * 2);
        assert_eq!(q.get(r).unwrap().payload, payload.as_slice());
    }

    #[test]
    fn oversized_entry_doubles_from_its_own_size() {
        let mut q = ring(11, 0);
        let (payload, hash) = blob(b'a', 100);

        q.push(&view(&payload, hash)).unwrap();

        assert_eq!(q.capacity(), (HEADER_SIZE + 100) * 2);
        let r = q.pop().unwrap();
        assert_eq!(q.get(r).unwrap().payload, payload.as_slice());
    }

    #[test]
    fn delete_tombstones_without_freeing() {
        let mut q = ring(100, 0);
        let (pa, h) = blob(b'a', 4);
        let r = q.push(&view(&pa, h)).unwrap();

        q.delete(r).unwrap();

        assert_eq!(q.len(), 1);
        assert_eq!(q.hash_at(r), 0);
        // Key and payload survive the tombstone.
        assert_eq!(q.get(r).unwrap().payload, pa.as_slice());

        assert_eq!(q.delete(QRef(10_000)), Err(QueueError::InvalidIndex));
        q.pop().unwrap();
        assert_eq!(q.delete(r), Err(QueueError::Empty));
    }

    #[test]
    fn collides_compares_stored_key() {
        let mut q = ring(100, 0);
        let entry = EntryView {
            timestamp: 1,
            hash: 9,
            key: b"alpha",
            payload: b"v",
        };
        let r = q.push(&entry).unwrap();

        assert!(!q.collides(r, b"alpha"));
        assert!(q.collides(r, b"beta"));
        assert_eq!(q.key_at(r), b"alpha");
    }

    #[test]
    fn oldest_tracks_head_across_pops() {
        let mut q = ring(200, 0);
        let (pa, h) = blob(b'a', 2);
        let (pb, _) = blob(b'b', 2);
        let ra = q.push(&view(&pa, h)).unwrap();
        let rb = q.push(&view(&pb, h)).unwrap();

        assert_eq!(q.oldest(), Ok(ra));
        q.pop().unwrap();
        assert_eq!(q.oldest(), Ok(rb));
        q.pop().unwrap();
        assert_eq!(q.oldest(), Err(QueueError::Empty));
    }
}

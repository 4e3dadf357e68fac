//! In-place codec for cache entries.
//!
//! An entry is serialized into a caller-supplied byte buffer at a given
//! offset; nothing here allocates unless a copy is explicitly requested.
//!
//! ## Serialized Layout
//!
//! ```text
//!   offset  width  field
//!   ──────  ─────  ───────────────────────────────────────────
//!        0      4  total size in bytes (including this field)
//!        4      8  timestamp (seconds)
//!       12      8  key hash (0 = tombstoned)
//!       20      2  key length L
//!       22      L  key bytes
//!     22+L   rest  payload bytes
//! ```
//!
//! All integers are little-endian, no padding. The 22-byte header is also
//! the minimum size of any entry: a "plug" entry is a bare header with a
//! zeroed hash, fabricated to span a gap so that offsets issued before the
//! gap was created keep resolving.

use crate::error::CacheError;

pub(crate) const SIZE_LEN: usize = 4;

const OFF_TS: usize = SIZE_LEN;
const OFF_HASH: usize = OFF_TS + 8;
const OFF_KEY_LEN: usize = OFF_HASH + 8;

/// Size of the fixed entry header; the minimum size of any entry.
pub const HEADER_SIZE: usize = OFF_KEY_LEN + 2;

/// Maximum key length the 2-byte length field can carry.
pub const MAX_KEY_LEN: usize = u16::MAX as usize;

// =============================================================================
// References
// =============================================================================

/// Opaque handle to an entry inside a ring buffer.
///
/// A `QRef` stays valid across ring expansions until the entry it names is
/// popped; it is only meaningful to the ring that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QRef(pub(crate) usize);

impl QRef {
    #[inline]
    pub(crate) fn offset(self) -> usize {
        self.0
    }
}

// =============================================================================
// Entry views
// =============================================================================

/// Borrowed view of one cache entry.
///
/// When produced by a read, `key` and `payload` alias the ring buffer and
/// are valid only while the owning shard's lock is held; callbacks and
/// processors must not retain them. The same type doubles as the write
/// input, borrowing the caller's key and payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryView<'a> {
    /// Insertion time in whole seconds.
    pub timestamp: u64,
    /// 64-bit key hash; zero marks a tombstoned entry.
    pub hash: u64,
    /// Key bytes.
    pub key: &'a [u8],
    /// Payload bytes.
    pub payload: &'a [u8],
}

impl<'a> EntryView<'a> {
    /// Number of bytes needed to store this entry, header included.
    #[inline]
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.key.len() + self.payload.len()
    }

    /// Copies the key out; safe to use after the shard lock is released.
    pub fn copy_key(&self) -> Vec<u8> {
        self.key.to_vec()
    }

    /// Copies the payload out; safe to use after the shard lock is released.
    pub fn copy_payload(&self) -> Vec<u8> {
        self.payload.to_vec()
    }

    /// The key as UTF-8, lossily. Keys set through the string API are
    /// always valid UTF-8.
    pub fn key_str(&self) -> std::borrow::Cow<'a, str> {
        String::from_utf8_lossy(self.key)
    }

    /// Detaches the view into an [`OwnedEntry`] with freshly allocated
    /// key and payload buffers.
    pub fn to_owned_entry(&self) -> OwnedEntry {
        OwnedEntry {
            timestamp: self.timestamp,
            hash: self.hash,
            key: self.key.to_vec(),
            payload: self.payload.to_vec(),
        }
    }
}

/// A cache entry decoupled from ring memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedEntry {
    /// Insertion time in whole seconds.
    pub timestamp: u64,
    /// 64-bit key hash.
    pub hash: u64,
    /// Key bytes.
    pub key: Vec<u8>,
    /// Payload bytes.
    pub payload: Vec<u8>,
}

impl OwnedEntry {
    /// Borrows the owned entry as an [`EntryView`].
    pub fn view(&self) -> EntryView<'_> {
        EntryView {
            timestamp: self.timestamp,
            hash: self.hash,
            key: &self.key,
            payload: &self.payload,
        }
    }
}

// =============================================================================
// Codec
// =============================================================================

#[inline]
fn read_u16(buf: &[u8], offset: usize) -> u16 {
    let mut raw = [0u8; 2];
    raw.copy_from_slice(&buf[offset..offset + 2]);
    u16::from_le_bytes(raw)
}

#[inline]
fn read_u32(buf: &[u8], offset: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_le_bytes(raw)
}

#[inline]
fn read_u64(buf: &[u8], offset: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_le_bytes(raw)
}

/// Total size of the entry starting at `offset`.
#[inline]
pub(crate) fn size_at(buf: &[u8], offset: usize) -> usize {
    read_u32(buf, offset) as usize
}

/// Timestamp field of the entry at `offset`.
#[inline]
pub(crate) fn timestamp_at(buf: &[u8], offset: usize) -> u64 {
    read_u64(buf, offset + OFF_TS)
}

/// Hash field of the entry at `offset`; zero means tombstoned.
#[inline]
pub(crate) fn hash_at(buf: &[u8], offset: usize) -> u64 {
    read_u64(buf, offset + OFF_HASH)
}

/// Key bytes of the entry at `offset`.
#[inline]
pub(crate) fn key_at(buf: &[u8], offset: usize) -> &[u8] {
    let key_len = read_u16(buf, offset + OFF_KEY_LEN) as usize;
    &buf[offset + HEADER_SIZE..offset + HEADER_SIZE + key_len]
}

/// Payload bytes of the entry at `offset`.
#[inline]
pub(crate) fn payload_at(buf: &[u8], offset: usize) -> &[u8] {
    let size = size_at(buf, offset);
    let key_len = read_u16(buf, offset + OFF_KEY_LEN) as usize;
    &buf[offset + HEADER_SIZE + key_len..offset + size]
}

/// Zeroes the hash field in place, tombstoning the entry. It keeps its
/// space and its position in the FIFO but will never match a lookup again.
#[inline]
pub(crate) fn clear_hash(buf: &mut [u8], offset: usize) {
    buf[offset + OFF_HASH..offset + OFF_HASH + 8].fill(0);
}

/// Sanity-checks that `offset` plausibly references an entry.
///
/// Permissive on purpose: it guards against obviously bad offsets, not
/// against adversarial buffer contents.
pub(crate) fn is_valid(buf: &[u8], offset: usize) -> bool {
    if offset + SIZE_LEN > buf.len() {
        return false;
    }
    let size = size_at(buf, offset);
    size >= HEADER_SIZE || buf.len() >= size
}

/// Serializes `entry` at `offset`.
///
/// # Panics
///
/// Panics if the buffer cannot hold the entry or the key exceeds
/// [`MAX_KEY_LEN`]; callers must have ensured capacity beforehand.
pub(crate) fn write(buf: &mut [u8], offset: usize, entry: &EntryView<'_>) {
    let size = entry.size();
    assert!(
        offset + size <= buf.len(),
        "entry of {size} bytes does not fit at offset {offset}"
    );
    assert!(entry.key.len() <= MAX_KEY_LEN, "key length exceeds u16");

    buf[offset..offset + SIZE_LEN].copy_from_slice(&(size as u32).to_le_bytes());
    buf[offset + OFF_TS..offset + OFF_HASH].copy_from_slice(&entry.timestamp.to_le_bytes());
    buf[offset + OFF_HASH..offset + OFF_KEY_LEN].copy_from_slice(&entry.hash.to_le_bytes());
    buf[offset + OFF_KEY_LEN..offset + HEADER_SIZE]
        .copy_from_slice(&(entry.key.len() as u16).to_le_bytes());
    buf[offset + HEADER_SIZE..offset + HEADER_SIZE + entry.key.len()].copy_from_slice(entry.key);
    buf[offset + HEADER_SIZE + entry.key.len()..offset + size].copy_from_slice(entry.payload);
}

/// Reads the entry at `offset` as a borrowed view.
pub(crate) fn read(buf: &[u8], offset: usize) -> Result<EntryView<'_>, CacheError> {
    if !is_valid(buf, offset) {
        return Err(CacheError::Corrupted);
    }
    Ok(EntryView {
        timestamp: timestamp_at(buf, offset),
        hash: hash_at(buf, offset),
        key: key_at(buf, offset),
        payload: payload_at(buf, offset),
    })
}

/// Overwrites `[from, to)` with a single tombstoned filler entry.
///
/// A reader starting at `from` afterwards sees a valid entry of length
/// `to - from` whose hash is zero, so eviction skips it silently. The gap
/// is never smaller than a header; the ring's wrap rule reserves that much.
pub(crate) fn plug(buf: &mut [u8], from: usize, to: usize) {
    debug_assert!(to - from >= HEADER_SIZE);
    buf[from..from + SIZE_LEN].copy_from_slice(&((to - from) as u32).to_le_bytes());
    buf[from + SIZE_LEN..to].fill(0);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry<'a>() -> EntryView<'a> {
        EntryView {
            timestamp: 0x5555_5555_5555_5555,
            hash: 0xDADA_DADA_DADA_DADA,
            key: b"key",
            payload: b"data",
        }
    }

    #[test]
    fn size_counts_header_key_and_payload() {
        assert_eq!(sample_entry().size(), 22 + 3 + 4);
        let empty = EntryView {
            timestamp: 0,
            hash: 1,
            key: b"",
            payload: b"",
        };
        assert_eq!(empty.size(), HEADER_SIZE);
    }

    #[test]
    fn encode_then_decode_round_trips() {
        let entry = sample_entry();
        let mut buf = vec![0u8; 100];

        write(&mut buf, 0, &entry);
        let decoded = read(&buf, 0).expect("decode failed");

        assert_eq!(decoded, entry);
    }

    #[test]
    fn encode_at_nonzero_offset_round_trips() {
        let entry = sample_entry();
        let mut buf = vec![0xAA; 100];

        write(&mut buf, 37, &entry);
        let decoded = read(&buf, 37).expect("decode failed");

        assert_eq!(decoded, entry);
        assert_eq!(size_at(&buf, 37), 29);
        assert_eq!(hash_at(&buf, 37), entry.hash);
        assert_eq!(timestamp_at(&buf, 37), entry.timestamp);
        assert_eq!(key_at(&buf, 37), b"key");
        assert_eq!(payload_at(&buf, 37), b"data");
    }

    #[test]
    #[should_panic]
    fn write_into_short_buffer_panics() {
        let mut buf = vec![0u8; 28];
        write(&mut buf, 0, &sample_entry());
    }

    #[test]
    fn plug_fabricates_tombstoned_filler() {
        let mut buf = vec![b'x'; 100];

        plug(&mut buf, 0, 100);
        let entry = read(&buf, 0).expect("plug is not readable");

        assert_eq!(entry.size(), 100);
        assert_eq!(entry.hash, 0);
        assert_eq!(entry.timestamp, 0);
        assert!(entry.key.is_empty());
        assert!(entry.payload.iter().all(|b| *b == 0));
    }

    #[test]
    fn clear_hash_tombstones_in_place() {
        let entry = sample_entry();
        let mut buf = vec![0u8; 64];
        write(&mut buf, 0, &entry);

        clear_hash(&mut buf, 0);

        let decoded = read(&buf, 0).unwrap();
        assert_eq!(decoded.hash, 0);
        assert_eq!(decoded.key, entry.key);
        assert_eq!(decoded.payload, entry.payload);
    }

    #[test]
    fn validation_rejects_offsets_past_the_buffer() {
        let buf = vec![0u8; 10];
        assert!(!is_valid(&buf, 8));
        assert!(!is_valid(&buf, 100));
        assert!(!is_valid(&[], 0));
    }

    #[test]
    fn read_of_invalid_offset_reports_corruption() {
        let buf = vec![0u8; 2];
        assert_eq!(read(&buf, 0), Err(CacheError::Corrupted));
    }

    #[test]
    fn owned_entry_view_round_trips() {
        let entry = sample_entry();
        let owned = entry.to_owned_entry();
        assert_eq!(owned.view(), entry);
        assert_eq!(entry.copy_key(), b"key".to_vec());
        assert_eq!(entry.copy_payload(), b"data".to_vec());
        assert_eq!(entry.key_str(), "key");
    }
}

//! Error types for the bytecache library.
//!
//! ## Key Components
//!
//! - [`ConfigError`]: Returned when cache configuration parameters are invalid
//!   (e.g. a shard count that is not a power of two).
//! - [`QueueError`]: Raw failures surfaced by the byte ring queue.
//! - [`CacheError`]: Caller-facing errors produced by cache operations. Queue
//!   failures observed during `set`/`append` are wrapped as
//!   [`CacheError::TooLarge`]; everything else passes through unchanged.
//!
//! ## Example Usage
//!
//! ```
//! use bytecache::error::CacheError;
//! use bytecache::{ByteCache, Config};
//! use std::time::Duration;
//!
//! let mut config = Config::new(Duration::from_secs(60));
//! config.shards = 2;
//! config.max_entries_in_window = 128;
//! config.max_entry_size = 64;
//!
//! let cache = ByteCache::new(config).unwrap();
//! assert_eq!(cache.get("absent").unwrap_err(), CacheError::NotFound);
//! ```

use std::fmt;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Error returned when cache configuration parameters are invalid.
///
/// Produced by [`ByteCache::new`](crate::ByteCache::new). Carries a
/// human-readable description of which parameter failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError(String);

impl ConfigError {
    /// Creates a new `ConfigError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// QueueError
// ---------------------------------------------------------------------------

/// Failures surfaced by the byte ring queue.
///
/// Only [`QueueError::Full`] and [`QueueError::EntryTooBig`] can reach a
/// caller of `set`/`append`, and then only wrapped inside
/// [`CacheError::TooLarge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// The queue holds no entries.
    Empty,
    /// The hard capacity limit was reached.
    Full,
    /// The offset does not reference a readable entry.
    InvalidIndex,
    /// The queue cannot expand far enough to hold the entry.
    EntryTooBig,
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            QueueError::Empty => "byte queue is empty",
            QueueError::Full => "byte queue is full, size limit is reached",
            QueueError::InvalidIndex => "byte queue index is out of bounds (0 <= index < right)",
            QueueError::EntryTooBig => "byte queue cannot expand, entry is too big",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for QueueError {}

// ---------------------------------------------------------------------------
// CacheError
// ---------------------------------------------------------------------------

/// Caller-facing errors produced by cache operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheError {
    /// No entry exists for the key, or a hash collision was detected on read.
    NotFound,
    /// An entry at an allegedly valid offset failed sanity checks.
    Corrupted,
    /// A queue failure passed through unchanged (e.g. a failed peek).
    Queue(QueueError),
    /// Eviction could not free enough room for the entry being stored.
    TooLarge(QueueError),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::NotFound => f.write_str("entry not found"),
            CacheError::Corrupted => f.write_str("cache entry is corrupted, unable to read"),
            CacheError::Queue(err) => err.fmt(f),
            CacheError::TooLarge(err) => {
                write!(f, "new entry is bigger than max shard size: {err}")
            },
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Queue(err) | CacheError::TooLarge(err) => Some(err),
            _ => None,
        }
    }
}

impl From<QueueError> for CacheError {
    fn from(err: QueueError) -> Self {
        CacheError::Queue(err)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

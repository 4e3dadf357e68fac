//! bytecache: sharded, evicting in-process cache for opaque byte payloads.
//!
//! Entries are packed into per-shard byte ring buffers instead of being
//! individually allocated, so very large entry counts stay cheap to hold
//! and predictable to access. Keys are 64-bit hashed onto a power-of-two
//! number of shards; eviction is strictly FIFO, driven by a TTL window and
//! by space pressure.

pub mod ds;

pub mod cache;
pub mod config;
pub mod error;
pub mod prelude;
pub mod stats;
pub mod traits;

mod shard;

pub use cache::ByteCache;
pub use config::Config;
pub use stats::Stats;

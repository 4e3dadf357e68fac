pub use crate::cache::ByteCache;
pub use crate::config::Config;
pub use crate::ds::entry::{EntryView, OwnedEntry, QRef};
pub use crate::error::{CacheError, ConfigError, QueueError};
pub use crate::stats::Stats;
pub use crate::traits::{
    Clock, Fnv64, KeyHasher, Logger, ManualClock, NopLogger, OnRemoveCallback, RemoveReason,
    SystemClock, TraceLogger,
};

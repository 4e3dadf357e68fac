pub mod bytes_ring;
pub mod entry;

pub use bytes_ring::BytesRing;
pub use entry::{EntryView, OwnedEntry, QRef};

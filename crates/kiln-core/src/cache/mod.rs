//! Incremental file cache for Kiln
//!
//! Every path the build touches gets one [`CacheEntry`]. Derived artifacts
//! (text, bytes, parsed unit, reference info, emitted output) are stamped
//! with the modification time they were computed from, so a rebuild only
//! redoes work for files whose time moved.

mod entry;
mod file_cache;
mod freshness;
mod hash;

pub use entry::{CacheEntry, EntryId, Freshness, Stamp};
pub use file_cache::FileCache;
pub use freshness::FreshnessEngine;
pub use hash::hash_config;

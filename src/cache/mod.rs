//! Response cache for offline support.
//!
//! This module provides named partitions of HTTP responses that:
//! - Key entries by normalized request identity (GET + URL)
//! - Keep entries in insertion order so callers can evict oldest-first
//! - Store frozen copies that can be re-served any number of times
//! - Live behind a `CacheStorage` backend (SQLite on disk, or in memory)

mod memory;
mod names;
mod storage;
mod store;
mod traits;

pub use memory::MemoryStorage;
pub use names::CacheNames;
pub use storage::SqliteStorage;
pub use store::{CacheStore, Partition};
pub use traits::{CacheKey, CacheStorage, CachedEntry, StoredResponse};

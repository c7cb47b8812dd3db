//! Read-through caching of raw API payloads.
//!
//! This module provides a flat key/value cache that:
//! - Stores raw payloads under `<prefix>_<id>` keys with no expiry
//! - Serves cached payloads unless a refresh is forced
//! - Allows at most one in-flight remote fetch per key

mod layer;
mod storage;
mod traits;

pub use layer::CacheLayer;
pub use storage::{CacheStorage, ConfiguredStorage};
pub use traits::Cacheable;

#[cfg(test)]
pub use storage::MemoryStorage;

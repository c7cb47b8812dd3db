//! Core traits and types for the caching system.

use chrono::{DateTime, Utc};

/// Trait for entities whose raw payloads are cached by remote id.
pub trait Cacheable {
  /// Key prefix for this entity type (e.g., "task")
  fn cache_prefix() -> &'static str;

  /// Cache key for the entity with the given remote id, e.g. `task_42`
  fn cache_key(id: i64) -> String {
    format!("{}_{}", Self::cache_prefix(), id)
  }
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// Create a new cache result from cached data.
  pub fn from_cache(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
      cached_at: Some(cached_at),
    }
  }
}

/// Indicates where cached data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fetched from the remote API
  Network,
  /// Served from the cache
  Cache,
}

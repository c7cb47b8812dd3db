//! Read-through cache layer in front of the remote fetch.

use color_eyre::{eyre::eyre, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

use super::storage::CacheStorage;
use super::traits::CacheResult;

type KeyLocks = Mutex<HashMap<String, KeyEntry>>;

#[derive(Default)]
struct KeyEntry {
  lock: Arc<AsyncMutex<()>>,
  holders: usize,
}

/// One caller's claim on a key's lock entry. The entry is removed when the
/// last claim is dropped, whether the fetch finished or was cancelled.
struct KeyClaim<'a> {
  locks: &'a KeyLocks,
  key: &'a str,
  lock: Arc<AsyncMutex<()>>,
}

impl<'a> KeyClaim<'a> {
  fn acquire(locks: &'a KeyLocks, key: &'a str) -> Result<Self> {
    let mut map = locks.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let entry = map.entry(key.to_string()).or_default();
    entry.holders += 1;
    Ok(Self {
      locks,
      key,
      lock: Arc::clone(&entry.lock),
    })
  }
}

impl Drop for KeyClaim<'_> {
  fn drop(&mut self) {
    if let Ok(mut map) = self.locks.lock() {
      if let Some(entry) = map.get_mut(self.key) {
        entry.holders = entry.holders.saturating_sub(1);
        if entry.holders == 0 {
          map.remove(self.key);
        }
      }
    }
  }
}

/// Cache layer that manages caching logic and network fetching.
///
/// Entries never expire. A fetch for a key holds that key's lock until the
/// fetched value is stored, so concurrent misses for one key trigger a single
/// remote call.
pub struct CacheLayer<S: CacheStorage> {
  storage: Arc<S>,
  in_flight: Arc<KeyLocks>,
}

impl<S: CacheStorage> CacheLayer<S> {
  /// Create a new cache layer with the given storage backend.
  pub fn new(storage: S) -> Self {
    Self {
      storage: Arc::new(storage),
      in_flight: Arc::new(Mutex::new(HashMap::new())),
    }
  }

  /// Fetch a single value with caching.
  ///
  /// 1. Unless `force`, return the cached value if present
  /// 2. Take the per-key lock; unless `force`, check the cache again since a
  ///    concurrent caller may have filled it while we waited
  /// 3. Fetch from network and store the result
  ///
  /// Fetch errors propagate and leave the cache untouched.
  pub async fn fetch_one<T, F, Fut>(&self, key: &str, force: bool, fetcher: F) -> Result<CacheResult<T>>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    if !force {
      if let Some(cached) = self.storage.get::<T>(key)? {
        debug!(key, "cache hit");
        return Ok(CacheResult::from_cache(cached.value, cached.cached_at));
      }
    }

    let claim = KeyClaim::acquire(&self.in_flight, key)?;
    let _guard = claim.lock.lock().await;
    self.fetch_locked(key, force, fetcher).await
  }

  async fn fetch_locked<T, F, Fut>(&self, key: &str, force: bool, fetcher: F) -> Result<CacheResult<T>>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    if !force {
      if let Some(cached) = self.storage.get::<T>(key)? {
        debug!(key, "cache filled by concurrent fetch");
        return Ok(CacheResult::from_cache(cached.value, cached.cached_at));
      }
    }

    debug!(key, force, "cache miss, fetching");
    let data = fetcher().await?;
    self.storage.set(key, &data)?;
    Ok(CacheResult::from_network(data))
  }

  #[cfg(test)]
  fn in_flight_len(&self) -> usize {
    self.in_flight.lock().map(|l| l.len()).unwrap_or(0)
  }
}

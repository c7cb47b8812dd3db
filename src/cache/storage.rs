//! Cache storage trait and backend implementations.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use crate::config::{CacheBackend, Config};

/// A single cached value.
#[derive(Debug, Clone)]
pub struct CachedEntry<T> {
  pub value: T,
  /// When the value was stored
  pub cached_at: DateTime<Utc>,
}

/// Trait for cache storage backends.
///
/// Flat key/value semantics: no expiry, no eviction.
pub trait CacheStorage: Send + Sync {
  /// Get the value stored under `key`.
  fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<CachedEntry<T>>>;

  /// Store `value` under `key`, replacing any previous value.
  fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()>;
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStorage;

impl CacheStorage for NoopStorage {
  fn get<T: DeserializeOwned>(&self, _key: &str) -> Result<Option<CachedEntry<T>>> {
    Ok(None) // Always miss
  }

  fn set<T: Serialize>(&self, _key: &str, _value: &T) -> Result<()> {
    Ok(()) // Discard
  }
}

/// Process-local storage.
#[derive(Default)]
pub struct MemoryStorage {
  entries: Mutex<HashMap<String, (Value, DateTime<Utc>)>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }
}

impl CacheStorage for MemoryStorage {
  fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<CachedEntry<T>>> {
    let entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    match entries.get(key) {
      Some((value, cached_at)) => {
        let value = serde_json::from_value(value.clone())
          .map_err(|e| eyre!("Failed to deserialize cached value: {}", e))?;
        Ok(Some(CachedEntry {
          value,
          cached_at: *cached_at,
        }))
      }
      None => Ok(None),
    }
  }

  fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
    let value =
      serde_json::to_value(value).map_err(|e| eyre!("Failed to serialize value: {}", e))?;
    let mut entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    entries.insert(key.to_string(), (value, Utc::now()));
    Ok(())
  }
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open or create the cache database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Open a cache that lives only as long as this value.
  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- Raw payload cache (stores serialized JSON)
CREATE TABLE IF NOT EXISTS payload_cache (
    cache_key TEXT PRIMARY KEY,
    data BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl CacheStorage for SqliteStorage {
  fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<CachedEntry<T>>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let result: Option<(Vec<u8>, String)> = conn
      .query_row(
        "SELECT data, cached_at FROM payload_cache WHERE cache_key = ?",
        params![key],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read cache entry {}: {}", key, e))?;

    match result {
      Some((data, cached_at_str)) => {
        let value: T = serde_json::from_slice(&data)
          .map_err(|e| eyre!("Failed to deserialize cached value: {}", e))?;
        let cached_at = parse_datetime(&cached_at_str)?;
        Ok(Some(CachedEntry { value, cached_at }))
      }
      None => Ok(None),
    }
  }

  fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
    let data =
      serde_json::to_vec(value).map_err(|e| eyre!("Failed to serialize value: {}", e))?;
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO payload_cache (cache_key, data, cached_at)
         VALUES (?, ?, datetime('now'))",
        params![key, data],
      )
      .map_err(|e| eyre!("Failed to store cache entry {}: {}", key, e))?;

    Ok(())
  }
}

/// Backend selected at runtime from configuration.
pub enum ConfiguredStorage {
  Sqlite(SqliteStorage),
  Memory(MemoryStorage),
  Noop(NoopStorage),
}

impl ConfiguredStorage {
  pub fn from_config(config: &Config) -> Result<Self> {
    match config.cache.backend {
      CacheBackend::Sqlite => Ok(Self::Sqlite(SqliteStorage::open(&config.cache_path()?)?)),
      CacheBackend::Memory => Ok(Self::Memory(MemoryStorage::new())),
      CacheBackend::None => Ok(Self::Noop(NoopStorage)),
    }
  }
}

impl CacheStorage for ConfiguredStorage {
  fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<CachedEntry<T>>> {
    match self {
      Self::Sqlite(s) => s.get(key),
      Self::Memory(s) => s.get(key),
      Self::Noop(s) => s.get(key),
    }
  }

  fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
    match self {
      Self::Sqlite(s) => s.set(key, value),
      Self::Memory(s) => s.set(key, value),
      Self::Noop(s) => s.set(key, value),
    }
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

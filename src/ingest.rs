//! Task ingestion: read-through fetch of a task payload and its
//! denormalization into the relational store.

use color_eyre::Result;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use crate::asana::api_types::ApiTask;
use crate::asana::client::TaskSource;
use crate::asana::types::Task;
use crate::cache::{CacheLayer, CacheStorage, Cacheable};
use crate::db::Database;

/// Mirrors remote tasks into the local store.
pub struct TaskIngestor<R: TaskSource, S: CacheStorage> {
  source: R,
  cache: CacheLayer<S>,
  db: Arc<Database>,
}

impl<R: TaskSource, S: CacheStorage> TaskIngestor<R, S> {
  pub fn new(source: R, cache: CacheLayer<S>, db: Arc<Database>) -> Self {
    Self { source, cache, db }
  }

  /// Fetch a task by remote id, serving the cached payload unless `force`
  /// is set, and store it locally.
  pub async fn fetch_by_id(&self, id: i64, force: bool) -> Result<Task> {
    let key = Task::cache_key(id);
    let payload = self
      .cache
      .fetch_one(&key, force, || self.source.get_task(id))
      .await?;
    debug!(id, source = ?payload.source, cached_at = ?payload.cached_at, "task payload ready");

    self.create_from_json(&payload.data)
  }

  /// Store a raw task payload and return the task as persisted.
  ///
  /// Absent or differently-shaped relation slots leave that relation empty.
  /// Any other payload problem fails the call with nothing written.
  pub fn create_from_json(&self, payload: &Value) -> Result<Task> {
    store_payload(&self.db, payload)
  }
}

/// Validate a raw task payload and write it to `db` in one transaction.
pub fn store_payload(db: &Database, payload: &Value) -> Result<Task> {
  let record = ApiTask::from_payload(payload)?.into_record()?;
  let task = db.save_task(&record)?;
  info!(
    id = task.id,
    tags = task.tags.len(),
    projects = task.projects.len(),
    "saved task"
  );
  Ok(task)
}

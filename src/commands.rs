//! Command-line subcommands and their handlers.

use clap::{Subcommand, ValueEnum};
use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use serde_json::Value;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::asana::client::{AsanaClient, TaskSource};
use crate::asana::types::Task;
use crate::cache::{CacheLayer, CacheStorage, ConfiguredStorage};
use crate::config::Config;
use crate::db::Database;
use crate::ingest::{store_payload, TaskIngestor};

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Fetch tasks from Asana (cached unless --force) and store them locally
  Fetch {
    /// Remote task ids
    #[arg(required = true)]
    ids: Vec<i64>,
    /// Bypass the cache and refresh it from the API
    #[arg(short, long)]
    force: bool,
    /// Print tasks as JSON
    #[arg(long)]
    json: bool,
  },
  /// Store a task payload read from a JSON file, without contacting the API
  Import {
    file: PathBuf,
    #[arg(long)]
    json: bool,
  },
  /// Show a locally stored task
  Show {
    id: i64,
    #[arg(long)]
    json: bool,
  },
  /// List locally stored entities ordered by name
  List {
    #[arg(value_enum)]
    kind: EntityKind,
  },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
  Tasks,
  Projects,
  Tags,
  Assignees,
  Workspaces,
}

pub async fn run(command: Command, config: &Config) -> Result<()> {
  let db = Arc::new(Database::open(&config.database_path()?)?);

  match command {
    Command::Fetch { ids, force, json } => {
      let client = AsanaClient::new(&config.asana)?;
      let storage = ConfiguredStorage::from_config(config)?;
      let ingestor = TaskIngestor::new(client, CacheLayer::new(storage), db);
      println!("{}", fetch_tasks(&ingestor, &ids, force, json).await?);
    }
    Command::Import { file, json } => {
      let payload = read_payload(&file)?;
      let task = store_payload(&db, &payload)?;
      println!("{}", render_task(&task, json)?);
    }
    Command::Show { id, json } => {
      let task = db
        .get_task(id)?
        .ok_or_else(|| eyre!("Task {} is not stored locally. Fetch it first.", id))?;
      println!("{}", render_task(&task, json)?);
    }
    Command::List { kind } => {
      print!("{}", render_list(&db, kind)?);
    }
  }

  Ok(())
}

/// Fetch every id concurrently; the first failure aborts the batch.
async fn fetch_tasks<R: TaskSource, S: CacheStorage>(
  ingestor: &TaskIngestor<R, S>,
  ids: &[i64],
  force: bool,
  json: bool,
) -> Result<String> {
  let tasks = try_join_all(ids.iter().map(|&id| ingestor.fetch_by_id(id, force))).await?;
  let rendered = tasks
    .iter()
    .map(|task| render_task(task, json))
    .collect::<Result<Vec<_>>>()?;
  Ok(rendered.join("\n"))
}

fn read_payload(path: &Path) -> Result<Value> {
  let contents = std::fs::read_to_string(path)
    .map_err(|e| eyre!("Failed to read {}: {}", path.display(), e))?;
  serde_json::from_str(&contents).map_err(|e| eyre!("Failed to parse {}: {}", path.display(), e))
}

fn render_task(task: &Task, json: bool) -> Result<String> {
  if json {
    return serde_json::to_string_pretty(task).map_err(|e| eyre!("Failed to serialize task: {}", e));
  }

  let mut out = String::new();
  let state = if task.completed { "done" } else { "open" };
  writeln!(out, "#{} {} [{}]", task.id, task.name, state)?;
  if let Some(assignee) = &task.assignee {
    writeln!(out, "  assignee:  {} ({})", assignee, task.assignee_status)?;
  }
  if let Some(workspace) = &task.workspace {
    writeln!(out, "  workspace: {}", workspace)?;
  }
  if let Some(due_on) = &task.due_on {
    writeln!(out, "  due:       {}", due_on)?;
  }
  if let Some(completed_at) = &task.completed_at {
    writeln!(out, "  completed: {}", completed_at)?;
  }
  if let Some(parent_id) = task.parent_id {
    writeln!(out, "  parent:    #{}", parent_id)?;
  }
  if !task.projects.is_empty() {
    let names: Vec<_> = task.projects.iter().map(|p| p.name.as_str()).collect();
    writeln!(out, "  projects:  {}", names.join(", "))?;
  }
  if !task.tags.is_empty() {
    let names: Vec<_> = task.tags.iter().map(|t| t.name.as_str()).collect();
    writeln!(out, "  tags:      {}", names.join(", "))?;
  }
  if !task.notes.is_empty() {
    writeln!(out)?;
    for line in task.notes.lines() {
      writeln!(out, "  {}", line)?;
    }
  }

  Ok(out.trim_end().to_string())
}

fn render_list(db: &Database, kind: EntityKind) -> Result<String> {
  let mut out = String::new();
  match kind {
    EntityKind::Tasks => {
      for task in db.list_tasks()? {
        let mark = if task.completed { "x" } else { " " };
        writeln!(out, "[{}] {}\t{}", mark, task.id, task)?;
      }
    }
    EntityKind::Projects => {
      for project in db.list_projects()? {
        writeln!(out, "{}\t{}", project.id, project)?;
      }
    }
    EntityKind::Tags => {
      for tag in db.list_tags()? {
        writeln!(out, "{}\t{}", tag.id, tag)?;
      }
    }
    EntityKind::Assignees => {
      for assignee in db.list_assignees()? {
        writeln!(out, "{}\t{}", assignee.id, assignee)?;
      }
    }
    EntityKind::Workspaces => {
      for workspace in db.list_workspaces()? {
        let org = if workspace.is_organization {
          " (organization)"
        } else {
          ""
        };
        writeln!(out, "{}\t{}{}", workspace.id, workspace, org)?;
      }
    }
  }
  Ok(out)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStorage;
  use crate::config::DatabaseConfig;
  use serde_json::json;
  use std::collections::HashMap;
  use std::future::Future;

  /// Serves canned payloads keyed by task id
  struct CannedSource(HashMap<i64, Value>);

  impl TaskSource for CannedSource {
    fn get_task(&self, id: i64) -> impl Future<Output = Result<Value>> + Send {
      let payload = self.0.get(&id).cloned();
      async move { payload.ok_or_else(|| eyre!("task {} not found", id)) }
    }
  }

  fn canned_ingestor() -> (TaskIngestor<CannedSource, MemoryStorage>, Arc<Database>) {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let source = CannedSource(HashMap::from([(1, payload())]));
    let ingestor = TaskIngestor::new(source, CacheLayer::new(MemoryStorage::new()), Arc::clone(&db));
    (ingestor, db)
  }

  fn payload() -> Value {
    json!({
      "data": {
        "id": 1,
        "name": "Fix bug",
        "notes": "Crashes on start\nOnly on Tuesdays",
        "assignee_status": "today",
        "completed": false,
        "completed_at": null,
        "created_at": "2013-01-01T00:00:00.000Z",
        "due_on": "2013-01-10",
        "modified_at": null,
        "assignee": {"id": 10, "name": "Alice"},
        "workspace": {"id": 100, "name": "Acme", "is_organization": true},
        "tags": [{"id": 5, "name": "urgent"}, {"id": 4, "name": "backend"}],
        "projects": [{"id": 7, "name": "Backend"}],
        "parent": {"id": 77, "name": "Epic"}
      }
    })
  }

  fn stored_task() -> (Database, Task) {
    let db = Database::open_in_memory().unwrap();
    let task = store_payload(&db, &payload()).unwrap();
    (db, task)
  }

  #[test]
  fn renders_task_summary() {
    let (_db, task) = stored_task();
    let text = render_task(&task, false).unwrap();

    assert!(text.starts_with("#1 Fix bug [open]"));
    assert!(text.contains("assignee:  Alice (today)"));
    assert!(text.contains("workspace: Acme"));
    assert!(text.contains("due:       2013-01-10"));
    assert!(text.contains("parent:    #77"));
    assert!(text.contains("tags:      backend, urgent"));
    assert!(text.contains("  Only on Tuesdays"));
  }

  #[test]
  fn renders_task_json() {
    let (_db, task) = stored_task();
    let value: Value = serde_json::from_str(&render_task(&task, true).unwrap()).unwrap();
    assert_eq!(value["id"], 1);
    assert_eq!(value["assignee"]["name"], "Alice");
    assert_eq!(value["tags"][0]["name"], "backend");
  }

  #[test]
  fn renders_lists() {
    let (db, _) = stored_task();
    assert_eq!(render_list(&db, EntityKind::Tasks).unwrap(), "[ ] 1\tFix bug\n");
    assert_eq!(
      render_list(&db, EntityKind::Tags).unwrap(),
      "4\tbackend\n5\turgent\n"
    );
    assert_eq!(
      render_list(&db, EntityKind::Workspaces).unwrap(),
      "100\tAcme (organization)\n"
    );
    assert_eq!(render_list(&db, EntityKind::Assignees).unwrap(), "10\tAlice\n");
    assert_eq!(render_list(&db, EntityKind::Projects).unwrap(), "7\tBackend\n");
  }

  #[tokio::test]
  async fn fetch_stores_and_renders_tasks() {
    let (ingestor, db) = canned_ingestor();

    let text = fetch_tasks(&ingestor, &[1], false, false).await.unwrap();
    assert!(text.starts_with("#1 Fix bug [open]"));
    assert!(text.contains("tags:      backend, urgent"));
    assert_eq!(db.get_task(1).unwrap().unwrap().parent_id, Some(77));

    let json_text = fetch_tasks(&ingestor, &[1, 1], false, true).await.unwrap();
    assert_eq!(json_text.matches("\"Fix bug\"").count(), 2);
  }

  #[tokio::test]
  async fn fetch_fails_when_any_id_fails() {
    let (ingestor, db) = canned_ingestor();

    let err = fetch_tasks(&ingestor, &[1, 2], false, false)
      .await
      .unwrap_err();
    assert!(err.to_string().contains("task 2 not found"));
    assert!(db.get_task(2).unwrap().is_none());
  }

  fn file_config(dir: &Path) -> Config {
    Config {
      database: DatabaseConfig {
        path: Some(dir.join("scrumsana.db")),
      },
      ..Config::default()
    }
  }

  #[tokio::test]
  async fn import_stores_payload_file() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("task.json");
    std::fs::write(&file, payload().to_string()).unwrap();
    let config = file_config(dir.path());

    run(Command::Import { file, json: false }, &config)
      .await
      .unwrap();

    let db = Database::open(&config.database_path().unwrap()).unwrap();
    let task = db.get_task(1).unwrap().unwrap();
    assert_eq!(task.parent_id, Some(77));
    assert_eq!(task.projects.len(), 1);
  }

  #[tokio::test]
  async fn import_rejects_invalid_json() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("task.json");
    std::fs::write(&file, "{not json").unwrap();

    let err = run(Command::Import { file, json: false }, &file_config(dir.path()))
      .await
      .unwrap_err();
    assert!(err.to_string().contains("Failed to parse"));
  }

  #[tokio::test]
  async fn show_unknown_task_fails() {
    let dir = tempfile::tempdir().unwrap();
    let err = run(Command::Show { id: 5, json: false }, &file_config(dir.path()))
      .await
      .unwrap_err();
    assert!(err.to_string().contains("not stored locally"));
  }
}

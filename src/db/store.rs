//! Entity persistence: get-or-create for related entities, transactional task
//! upsert, and name-ordered queries.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension, Params, Row};
use tracing::debug;

use super::Database;
use crate::asana::types::{
  Assignee, EntityRef, Project, Tag, Task, TaskRecord, Workspace, WorkspaceRef,
};

const TASK_SELECT: &str = "SELECT t.id, t.name, t.notes, t.assignee_status, t.completed,
       t.completed_at, t.created_at, t.due_on, t.modified_at, t.parent_id,
       a.id, a.name, w.id, w.name, w.is_organization
  FROM tasks t
  LEFT JOIN assignees a ON a.id = t.assignee_id
  LEFT JOIN workspaces w ON w.id = t.workspace_id";

impl Database {
  /// Write a task, its related entities and its tag/project sets in one
  /// transaction, then read it back.
  ///
  /// Related entities are get-or-created by id: an existing row keeps its
  /// stored name. The task row and both association sets are fully replaced.
  pub fn save_task(&self, record: &TaskRecord) -> Result<Task> {
    let mut conn = self.conn()?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;
    write_task(&tx, record)?;
    tx.commit()
      .map_err(|e| eyre!("Failed to commit task {}: {}", record.id, e))?;

    load_task(&conn, record.id)?.ok_or_else(|| eyre!("Task {} missing after save", record.id))
  }

  /// Get a stored task by remote id
  pub fn get_task(&self, id: i64) -> Result<Option<Task>> {
    let conn = self.conn()?;
    load_task(&conn, id)
  }

  pub fn list_tasks(&self) -> Result<Vec<Task>> {
    let conn = self.conn()?;
    let sql = format!("{} ORDER BY t.name, t.id", TASK_SELECT);
    let mut tasks = query_list(&conn, &sql, [], task_from_row)?;
    for task in &mut tasks {
      task.tags = load_tags(&conn, task.id)?;
      task.projects = load_projects(&conn, task.id)?;
    }
    Ok(tasks)
  }

  pub fn list_projects(&self) -> Result<Vec<Project>> {
    let conn = self.conn()?;
    query_list(
      &conn,
      "SELECT id, name FROM projects ORDER BY name, id",
      [],
      |row| {
        Ok(Project {
          id: row.get(0)?,
          name: row.get(1)?,
        })
      },
    )
  }

  pub fn list_tags(&self) -> Result<Vec<Tag>> {
    let conn = self.conn()?;
    query_list(&conn, "SELECT id, name FROM tags ORDER BY name, id", [], |row| {
      Ok(Tag {
        id: row.get(0)?,
        name: row.get(1)?,
      })
    })
  }

  pub fn list_assignees(&self) -> Result<Vec<Assignee>> {
    let conn = self.conn()?;
    query_list(
      &conn,
      "SELECT id, name FROM assignees ORDER BY name, id",
      [],
      |row| {
        Ok(Assignee {
          id: row.get(0)?,
          name: row.get(1)?,
        })
      },
    )
  }

  pub fn list_workspaces(&self) -> Result<Vec<Workspace>> {
    let conn = self.conn()?;
    query_list(
      &conn,
      "SELECT id, name, is_organization FROM workspaces ORDER BY name, id",
      [],
      |row| {
        Ok(Workspace {
          id: row.get(0)?,
          name: row.get(1)?,
          is_organization: row.get(2)?,
        })
      },
    )
  }
}

fn write_task(conn: &Connection, r: &TaskRecord) -> Result<()> {
  if let Some(assignee) = &r.assignee {
    get_or_create(conn, "assignees", assignee)?;
  }
  if let Some(workspace) = &r.workspace {
    get_or_create_workspace(conn, workspace)?;
  }
  for tag in &r.tags {
    get_or_create(conn, "tags", tag)?;
  }
  for project in &r.projects {
    get_or_create(conn, "projects", project)?;
  }

  conn
    .execute(
      "INSERT INTO tasks (id, name, notes, assignee_status, completed, completed_at,
                          created_at, due_on, modified_at, assignee_id, workspace_id, parent_id)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
       ON CONFLICT(id) DO UPDATE SET
         name = excluded.name,
         notes = excluded.notes,
         assignee_status = excluded.assignee_status,
         completed = excluded.completed,
         completed_at = excluded.completed_at,
         created_at = excluded.created_at,
         due_on = excluded.due_on,
         modified_at = excluded.modified_at,
         assignee_id = excluded.assignee_id,
         workspace_id = excluded.workspace_id,
         parent_id = excluded.parent_id",
      params![
        r.id,
        r.name,
        r.notes,
        r.assignee_status,
        r.completed,
        r.completed_at,
        r.created_at,
        r.due_on,
        r.modified_at,
        r.assignee.as_ref().map(|a| a.id),
        r.workspace.as_ref().map(|w| w.id),
        r.parent_id,
      ],
    )
    .map_err(|e| eyre!("Failed to store task {}: {}", r.id, e))?;

  conn
    .execute("DELETE FROM task_tags WHERE task_id = ?1", params![r.id])
    .map_err(|e| eyre!("Failed to clear tags of task {}: {}", r.id, e))?;
  for tag in &r.tags {
    conn
      .execute(
        "INSERT OR IGNORE INTO task_tags (task_id, tag_id) VALUES (?1, ?2)",
        params![r.id, tag.id],
      )
      .map_err(|e| eyre!("Failed to tag task {}: {}", r.id, e))?;
  }

  conn
    .execute("DELETE FROM task_projects WHERE task_id = ?1", params![r.id])
    .map_err(|e| eyre!("Failed to clear projects of task {}: {}", r.id, e))?;
  for project in &r.projects {
    conn
      .execute(
        "INSERT OR IGNORE INTO task_projects (task_id, project_id) VALUES (?1, ?2)",
        params![r.id, project.id],
      )
      .map_err(|e| eyre!("Failed to add task {} to project: {}", r.id, e))?;
  }

  Ok(())
}

/// Insert `(id, name)` into `table` unless the id exists. An existing row keeps its name.
fn get_or_create(conn: &Connection, table: &'static str, r: &EntityRef) -> Result<()> {
  conn
    .execute(
      &format!("INSERT OR IGNORE INTO {} (id, name) VALUES (?1, ?2)", table),
      params![r.id, r.name],
    )
    .map_err(|e| eyre!("Failed to store {} {}: {}", table, r.id, e))?;

  let stored: String = conn
    .query_row(
      &format!("SELECT name FROM {} WHERE id = ?1", table),
      params![r.id],
      |row| row.get(0),
    )
    .map_err(|e| eyre!("Failed to read {} {}: {}", table, r.id, e))?;

  if stored != r.name {
    debug!(table, id = r.id, stored = %stored, incoming = %r.name, "keeping stored name");
  }
  Ok(())
}

fn get_or_create_workspace(conn: &Connection, w: &WorkspaceRef) -> Result<()> {
  let inserted = conn
    .execute(
      "INSERT OR IGNORE INTO workspaces (id, name, is_organization) VALUES (?1, ?2, ?3)",
      params![w.id, w.name, w.is_organization],
    )
    .map_err(|e| eyre!("Failed to store workspace {}: {}", w.id, e))?;

  if inserted == 0 {
    debug!(id = w.id, "workspace already stored");
  }
  Ok(())
}

fn load_task(conn: &Connection, id: i64) -> Result<Option<Task>> {
  let sql = format!("{} WHERE t.id = ?1", TASK_SELECT);
  let task = conn
    .query_row(&sql, params![id], task_from_row)
    .optional()
    .map_err(|e| eyre!("Failed to load task {}: {}", id, e))?;

  match task {
    Some(mut task) => {
      task.tags = load_tags(conn, id)?;
      task.projects = load_projects(conn, id)?;
      Ok(Some(task))
    }
    None => Ok(None),
  }
}

fn load_tags(conn: &Connection, task_id: i64) -> Result<Vec<Tag>> {
  query_list(
    conn,
    "SELECT g.id, g.name FROM tags g
       JOIN task_tags tt ON tt.tag_id = g.id
      WHERE tt.task_id = ?1
      ORDER BY g.name, g.id",
    params![task_id],
    |row| {
      Ok(Tag {
        id: row.get(0)?,
        name: row.get(1)?,
      })
    },
  )
}

fn load_projects(conn: &Connection, task_id: i64) -> Result<Vec<Project>> {
  query_list(
    conn,
    "SELECT p.id, p.name FROM projects p
       JOIN task_projects tp ON tp.project_id = p.id
      WHERE tp.task_id = ?1
      ORDER BY p.name, p.id",
    params![task_id],
    |row| {
      Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
      })
    },
  )
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
  let assignee = match (row.get::<_, Option<i64>>(10)?, row.get::<_, Option<String>>(11)?) {
    (Some(id), Some(name)) => Some(Assignee { id, name }),
    _ => None,
  };
  let workspace = match (
    row.get::<_, Option<i64>>(12)?,
    row.get::<_, Option<String>>(13)?,
    row.get::<_, Option<bool>>(14)?,
  ) {
    (Some(id), Some(name), is_organization) => Some(Workspace {
      id,
      name,
      is_organization: is_organization.unwrap_or(false),
    }),
    _ => None,
  };

  Ok(Task {
    id: row.get(0)?,
    name: row.get(1)?,
    notes: row.get(2)?,
    assignee_status: row.get(3)?,
    completed: row.get(4)?,
    completed_at: row.get(5)?,
    created_at: row.get(6)?,
    due_on: row.get(7)?,
    modified_at: row.get(8)?,
    parent_id: row.get(9)?,
    assignee,
    workspace,
    projects: Vec::new(),
    tags: Vec::new(),
  })
}

fn query_list<T, P, F>(conn: &Connection, sql: &str, params: P, f: F) -> Result<Vec<T>>
where
  P: Params,
  F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
  let mut stmt = conn
    .prepare(sql)
    .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

  let rows = stmt
    .query_map(params, f)
    .map_err(|e| eyre!("Failed to run query: {}", e))?;

  rows
    .collect::<rusqlite::Result<Vec<T>>>()
    .map_err(|e| eyre!("Failed to read row: {}", e))
}

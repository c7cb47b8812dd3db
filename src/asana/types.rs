use serde::Serialize;
use std::fmt;

/// Asana project
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Project {
  pub id: i64,
  pub name: String,
}

/// Asana tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tag {
  pub id: i64,
  pub name: String,
}

/// Asana user a task is assigned to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assignee {
  pub id: i64,
  pub name: String,
}

/// Asana workspace or organization
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Workspace {
  pub id: i64,
  pub name: String,
  pub is_organization: bool,
}

/// Task as stored locally, with related entities resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
  pub id: i64,
  pub name: String,
  pub notes: String,
  pub assignee_status: String,
  pub completed: bool,
  pub completed_at: Option<String>,
  pub created_at: String,
  pub due_on: Option<String>,
  pub modified_at: Option<String>,
  pub assignee: Option<Assignee>,
  pub workspace: Option<Workspace>,
  /// Remote id of the parent task, which may not be mirrored locally
  pub parent_id: Option<i64>,
  /// Ordered by name
  pub projects: Vec<Project>,
  /// Ordered by name
  pub tags: Vec<Tag>,
}

/// Reference to a related entity as it appears inside a task payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRef {
  pub id: i64,
  pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceRef {
  pub id: i64,
  pub name: String,
  pub is_organization: bool,
}

/// Validated task payload, ready to be written to the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRecord {
  pub id: i64,
  pub name: String,
  pub notes: String,
  pub assignee_status: String,
  pub completed: bool,
  pub completed_at: Option<String>,
  pub created_at: String,
  pub due_on: Option<String>,
  pub modified_at: Option<String>,
  pub assignee: Option<EntityRef>,
  pub workspace: Option<WorkspaceRef>,
  pub parent_id: Option<i64>,
  pub projects: Vec<EntityRef>,
  pub tags: Vec<EntityRef>,
}

macro_rules! display_name {
  ($($ty:ty),*) => {
    $(
      impl fmt::Display for $ty {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
          f.write_str(&self.name)
        }
      }
    )*
  };
}

display_name!(Project, Tag, Assignee, Workspace, Task);

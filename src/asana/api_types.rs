//! Serde-deserializable types matching Asana API responses.
//!
//! Scalar task fields are strict: a missing key or a wrong type fails the
//! whole payload. Relation slots (`assignee`, `workspace`, `tags`,
//! `projects`, `parent`) are kept as raw JSON and classified by shape, so an
//! absent or differently-shaped slot means "no relation" instead of an error.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

use super::types::{EntityRef, TaskRecord, WorkspaceRef};

// ============================================================================
// Response envelopes
// ============================================================================

/// Successful responses wrap the resource in `data`
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope {
  pub data: Value,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorMessage {
  #[serde(default)]
  pub message: String,
}

/// Error responses carry a list of messages
#[derive(Debug, Deserialize)]
pub struct ApiErrorResponse {
  #[serde(default)]
  pub errors: Vec<ApiErrorMessage>,
}

impl ApiErrorResponse {
  pub fn summary(&self) -> String {
    self
      .errors
      .iter()
      .map(|e| e.message.as_str())
      .filter(|m| !m.is_empty())
      .collect::<Vec<_>>()
      .join("; ")
  }
}

/// Strip the `{"data": ...}` envelope if present.
pub fn unwrap_data(value: Value) -> Value {
  match value {
    Value::Object(mut map) if map.len() == 1 && map.contains_key("data") => {
      map.remove("data").unwrap_or(Value::Null)
    }
    other => other,
  }
}

// ============================================================================
// Task payload
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiTask {
  #[serde(deserialize_with = "deserialize_id")]
  pub id: i64,
  pub name: String,
  pub notes: String,
  pub assignee_status: String,
  pub completed: bool,
  // Nullable, but the key itself is required
  #[serde(deserialize_with = "Option::deserialize")]
  pub completed_at: Option<String>,
  pub created_at: String,
  #[serde(deserialize_with = "Option::deserialize")]
  pub due_on: Option<String>,
  #[serde(deserialize_with = "Option::deserialize")]
  pub modified_at: Option<String>,
  #[serde(default)]
  pub assignee: Option<Value>,
  #[serde(default)]
  pub workspace: Option<Value>,
  #[serde(default)]
  pub parent: Option<Value>,
  #[serde(default)]
  pub tags: Option<Value>,
  #[serde(default)]
  pub projects: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ApiEntityRef {
  #[serde(deserialize_with = "deserialize_id")]
  id: i64,
  name: String,
}

#[derive(Debug, Deserialize)]
struct ApiWorkspaceRef {
  #[serde(deserialize_with = "deserialize_id")]
  id: i64,
  name: String,
  #[serde(default)]
  is_organization: bool,
}

#[derive(Debug, Deserialize)]
struct ApiParentRef {
  #[serde(deserialize_with = "deserialize_id")]
  id: i64,
}

impl ApiTask {
  /// Parse a raw task payload (with or without the `data` envelope).
  pub fn from_payload(payload: &Value) -> Result<Self> {
    let body = unwrap_data(payload.clone());
    serde_json::from_value(body).map_err(|e| eyre!("Invalid task payload: {}", e))
  }

  /// Classify the relation slots and produce a record ready for storage.
  pub fn into_record(self) -> Result<TaskRecord> {
    let assignee = mapping::<ApiEntityRef>("assignee", self.assignee)?.map(EntityRef::from);
    let workspace = mapping::<ApiWorkspaceRef>("workspace", self.workspace)?.map(|w| WorkspaceRef {
      id: w.id,
      name: w.name,
      is_organization: w.is_organization,
    });
    let tags = sequence::<ApiEntityRef>("tags", self.tags)?
      .into_iter()
      .map(EntityRef::from)
      .collect();
    let projects = sequence::<ApiEntityRef>("projects", self.projects)?
      .into_iter()
      .map(EntityRef::from)
      .collect();
    let parent_id = parent_id(self.parent)?;

    Ok(TaskRecord {
      id: self.id,
      name: self.name,
      notes: self.notes,
      assignee_status: self.assignee_status,
      completed: self.completed,
      completed_at: self.completed_at,
      created_at: self.created_at,
      due_on: self.due_on,
      modified_at: self.modified_at,
      assignee,
      workspace,
      parent_id,
      projects,
      tags,
    })
  }
}

impl From<ApiEntityRef> for EntityRef {
  fn from(r: ApiEntityRef) -> Self {
    EntityRef {
      id: r.id,
      name: r.name,
    }
  }
}

// ============================================================================
// Helpers
// ============================================================================

/// Accept ids as JSON integers or as strings of digits
fn deserialize_id<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
  D: Deserializer<'de>,
{
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum RawId {
    Int(i64),
    Str(String),
  }

  match RawId::deserialize(deserializer)? {
    RawId::Int(id) => Ok(id),
    RawId::Str(s) => s
      .parse()
      .map_err(|_| serde::de::Error::custom(format!("invalid id '{}'", s))),
  }
}

fn value_kind(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "bool",
    Value::Number(_) => "number",
    Value::String(_) => "string",
    Value::Array(_) => "array",
    Value::Object(_) => "object",
  }
}

/// A mapping slot parses into `T`; anything that is not a mapping is absent.
fn mapping<T: serde::de::DeserializeOwned>(slot: &str, value: Option<Value>) -> Result<Option<T>> {
  match value {
    Some(v @ Value::Object(_)) => serde_json::from_value(v)
      .map(Some)
      .map_err(|e| eyre!("Invalid {} in task payload: {}", slot, e)),
    Some(Value::Null) | None => Ok(None),
    Some(other) => {
      debug!(slot, kind = value_kind(&other), "ignoring non-mapping relation");
      Ok(None)
    }
  }
}

/// A sequence slot parses each mapping entry; non-mapping entries are skipped
/// and a slot that is not a sequence is empty.
fn sequence<T: serde::de::DeserializeOwned>(slot: &str, value: Option<Value>) -> Result<Vec<T>> {
  let items = match value {
    Some(Value::Array(items)) => items,
    Some(Value::Null) | None => return Ok(Vec::new()),
    Some(other) => {
      debug!(slot, kind = value_kind(&other), "ignoring non-sequence relation");
      return Ok(Vec::new());
    }
  };

  let mut out = Vec::with_capacity(items.len());
  for item in items {
    if !item.is_object() {
      debug!(slot, kind = value_kind(&item), "skipping non-mapping entry");
      continue;
    }
    let parsed = serde_json::from_value(item)
      .map_err(|e| eyre!("Invalid entry in {} of task payload: {}", slot, e))?;
    out.push(parsed);
  }
  Ok(out)
}

/// Parent is either a compact task mapping or a bare id
fn parent_id(value: Option<Value>) -> Result<Option<i64>> {
  match value {
    Some(Value::Number(n)) => Ok(n.as_i64()),
    Some(v @ Value::Object(_)) => serde_json::from_value::<ApiParentRef>(v)
      .map(|p| Some(p.id))
      .map_err(|e| eyre!("Invalid parent in task payload: {}", e)),
    Some(Value::Null) | None => Ok(None),
    Some(other) => {
      debug!(kind = value_kind(&other), "ignoring unrecognised parent");
      Ok(None)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn base_payload() -> Value {
    json!({
      "id": 1,
      "name": "Fix bug",
      "notes": "",
      "assignee_status": "inbox",
      "completed": false,
      "completed_at": null,
      "created_at": "2013-01-01T00:00:00.000Z",
      "due_on": null,
      "modified_at": "2013-01-02T00:00:00.000Z",
    })
  }

  fn record(payload: Value) -> Result<TaskRecord> {
    ApiTask::from_payload(&payload)?.into_record()
  }

  #[test]
  fn missing_relations_are_empty() {
    let r = record(base_payload()).unwrap();
    assert_eq!(r.id, 1);
    assert_eq!(r.name, "Fix bug");
    assert_eq!(r.assignee, None);
    assert_eq!(r.workspace, None);
    assert_eq!(r.parent_id, None);
    assert!(r.tags.is_empty());
    assert!(r.projects.is_empty());
  }

  #[test]
  fn wrong_shaped_relations_are_empty() {
    let mut payload = base_payload();
    payload["assignee"] = json!("alice");
    payload["workspace"] = json!([1, 2]);
    payload["tags"] = json!({"id": 5, "name": "urgent"});
    payload["projects"] = json!(7);
    payload["parent"] = json!("nope");

    let r = record(payload).unwrap();
    assert_eq!(r.assignee, None);
    assert_eq!(r.workspace, None);
    assert_eq!(r.parent_id, None);
    assert!(r.tags.is_empty());
    assert!(r.projects.is_empty());
  }

  #[test]
  fn parses_relations() {
    let mut payload = base_payload();
    payload["assignee"] = json!({"id": 10, "name": "Alice"});
    payload["workspace"] = json!({"id": 100, "name": "Acme", "is_organization": true});
    payload["tags"] = json!([{"id": 5, "name": "urgent"}, "junk", {"id": "6", "name": "later"}]);
    payload["projects"] = json!([{"id": 7, "name": "Backend"}]);
    payload["parent"] = json!({"id": 42, "name": "Epic"});

    let r = record(payload).unwrap();
    assert_eq!(
      r.assignee,
      Some(EntityRef {
        id: 10,
        name: "Alice".into()
      })
    );
    assert_eq!(
      r.workspace,
      Some(WorkspaceRef {
        id: 100,
        name: "Acme".into(),
        is_organization: true
      })
    );
    assert_eq!(r.tags.iter().map(|t| t.id).collect::<Vec<_>>(), vec![5, 6]);
    assert_eq!(r.projects.len(), 1);
    assert_eq!(r.parent_id, Some(42));
  }

  #[test]
  fn workspace_defaults_to_non_organization() {
    let mut payload = base_payload();
    payload["workspace"] = json!({"id": 100, "name": "Acme"});
    let r = record(payload).unwrap();
    assert!(!r.workspace.unwrap().is_organization);
  }

  #[test]
  fn bare_parent_id() {
    let mut payload = base_payload();
    payload["parent"] = json!(42);
    assert_eq!(record(payload).unwrap().parent_id, Some(42));
  }

  #[test]
  fn accepts_data_envelope() {
    let r = record(json!({ "data": base_payload() })).unwrap();
    assert_eq!(r.id, 1);
  }

  #[test]
  fn missing_required_scalar_is_fatal() {
    let mut payload = base_payload();
    payload.as_object_mut().unwrap().remove("assignee_status");
    assert!(record(payload).is_err());
  }

  #[test]
  fn missing_nullable_key_is_fatal() {
    let mut payload = base_payload();
    payload.as_object_mut().unwrap().remove("due_on");
    assert!(record(payload).is_err());
  }

  #[test]
  fn wrong_scalar_type_is_fatal() {
    let mut payload = base_payload();
    payload["completed"] = json!("no");
    assert!(record(payload).is_err());
  }

  #[test]
  fn mapping_without_id_is_fatal() {
    let mut payload = base_payload();
    payload["assignee"] = json!({"name": "Alice"});
    let err = record(payload).unwrap_err();
    assert!(err.to_string().contains("assignee"));
  }

  #[test]
  fn tag_entry_without_name_is_fatal() {
    let mut payload = base_payload();
    payload["tags"] = json!([{"id": 5}]);
    assert!(record(payload).is_err());
  }

  #[test]
  fn non_numeric_string_id_is_rejected() {
    let mut payload = base_payload();
    payload["id"] = json!("abc");
    assert!(record(payload).is_err());
  }

  #[test]
  fn error_summary_joins_messages() {
    let resp: ApiErrorResponse = serde_json::from_value(json!({
      "errors": [{"message": "task: Unknown object"}, {"message": "try again"}]
    }))
    .unwrap();
    assert_eq!(resp.summary(), "task: Unknown object; try again");
  }

  #[test]
  fn unwrap_data_leaves_other_objects() {
    let v = json!({"data": 1, "extra": 2});
    assert_eq!(unwrap_data(v.clone()), v);
    assert_eq!(unwrap_data(json!({"data": {"id": 1}})), json!({"id": 1}));
  }
}

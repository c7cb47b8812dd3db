use crate::asana::api_types::{ApiEnvelope, ApiErrorResponse};
use crate::config::{AsanaConfig, AuthType, Config};
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use url::Url;

/// Source of raw task payloads.
pub trait TaskSource: Send + Sync {
  /// Fetch the task with the given remote id as raw JSON.
  fn get_task(&self, id: i64) -> impl Future<Output = Result<Value>> + Send;
}

impl<T: TaskSource> TaskSource for Arc<T> {
  fn get_task(&self, id: i64) -> impl Future<Output = Result<Value>> + Send {
    (**self).get_task(id)
  }
}

/// Asana API client wrapper
#[derive(Clone)]
pub struct AsanaClient {
  http: reqwest::Client,
  base_url: Url,
  api_key: String,
  auth: AuthType,
}

impl AsanaClient {
  pub fn new(config: &AsanaConfig) -> Result<Self> {
    let api_key = Config::get_api_key()?;
    Self::with_api_key(config, api_key)
  }

  pub fn with_api_key(config: &AsanaConfig, api_key: String) -> Result<Self> {
    let mut builder = reqwest::Client::builder();
    if let Some(secs) = config.timeout_secs {
      builder = builder.timeout(Duration::from_secs(secs));
    }
    let http = builder
      .build()
      .map_err(|e| eyre!("Failed to create Asana client: {}", e))?;

    Ok(Self {
      http,
      base_url: parse_base_url(&config.url)?,
      auth: config.auth_type.resolve(&api_key),
      api_key,
    })
  }

  fn task_url(&self, id: i64) -> Result<Url> {
    self
      .base_url
      .join(&format!("tasks/{}", id))
      .map_err(|e| eyre!("Failed to build task URL: {}", e))
  }

  fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    match self.auth {
      AuthType::Bearer => request.bearer_auth(&self.api_key),
      // Legacy keys are the username with an empty password
      AuthType::Basic | AuthType::Auto => request.basic_auth(&self.api_key, Some("")),
    }
  }

  /// Get a single task by id
  pub async fn get_task(&self, id: i64) -> Result<Value> {
    let url = self.task_url(id)?;
    info!(id, %url, "fetching task");

    let response = self
      .authorize(self.http.get(url))
      .send()
      .await
      .map_err(|e| eyre!("Failed to get task {}: {}", id, e))?;

    let status = response.status();
    let body: Value = response
      .json()
      .await
      .map_err(|e| eyre!("Failed to read task {} response: {}", id, e))?;

    parse_task_response(id, status, body)
  }
}

impl TaskSource for AsanaClient {
  fn get_task(&self, id: i64) -> impl Future<Output = Result<Value>> + Send {
    AsanaClient::get_task(self, id)
  }
}

/// Base URLs are joined with relative paths, so they need a trailing slash.
fn parse_base_url(raw: &str) -> Result<Url> {
  let normalized = if raw.ends_with('/') {
    raw.to_string()
  } else {
    format!("{}/", raw)
  };
  Url::parse(&normalized).map_err(|e| eyre!("Invalid Asana API URL '{}': {}", raw, e))
}

fn parse_task_response(id: i64, status: reqwest::StatusCode, body: Value) -> Result<Value> {
  if !status.is_success() {
    let detail = serde_json::from_value::<ApiErrorResponse>(body)
      .map(|e| e.summary())
      .unwrap_or_default();
    return Err(eyre!("Failed to get task {}: HTTP {} {}", id, status, detail));
  }

  let envelope: ApiEnvelope = serde_json::from_value(body)
    .map_err(|e| eyre!("Failed to parse task {} response: {}", id, e))?;
  Ok(envelope.data)
}

#[cfg(test)]
mod tests {
  use super::*;
  use reqwest::StatusCode;
  use serde_json::json;

  fn client(url: &str, auth_type: AuthType, key: &str) -> AsanaClient {
    let config = AsanaConfig {
      url: url.to_string(),
      auth_type,
      timeout_secs: Some(5),
    };
    AsanaClient::with_api_key(&config, key.to_string()).unwrap()
  }

  #[test]
  fn task_url_keeps_api_version_segment() {
    let c = client("https://app.asana.com/api/1.0", AuthType::Auto, "k");
    assert_eq!(
      c.task_url(42).unwrap().as_str(),
      "https://app.asana.com/api/1.0/tasks/42"
    );

    let c = client("http://localhost:9000/api/", AuthType::Auto, "k");
    assert_eq!(
      c.task_url(7).unwrap().as_str(),
      "http://localhost:9000/api/tasks/7"
    );
  }

  #[test]
  fn invalid_base_url_is_rejected() {
    let config = AsanaConfig {
      url: "not a url".to_string(),
      ..AsanaConfig::default()
    };
    assert!(AsanaClient::with_api_key(&config, "k".to_string()).is_err());
  }

  #[test]
  fn auth_scheme_is_resolved_from_key() {
    assert_eq!(
      client("https://x/", AuthType::Auto, "1/123:abc").auth,
      AuthType::Bearer
    );
    assert_eq!(
      client("https://x/", AuthType::Auto, "legacy").auth,
      AuthType::Basic
    );
  }

  #[test]
  fn authorize_sets_header() {
    let c = client("https://x/", AuthType::Bearer, "1/123:abc");
    let req = c.authorize(c.http.get("https://x/tasks/1")).build().unwrap();
    assert_eq!(
      req.headers()["authorization"].to_str().unwrap(),
      "Bearer 1/123:abc"
    );

    let c = client("https://x/", AuthType::Basic, "key");
    let req = c.authorize(c.http.get("https://x/tasks/1")).build().unwrap();
    assert!(req.headers()["authorization"]
      .to_str()
      .unwrap()
      .starts_with("Basic "));
  }

  #[test]
  fn success_response_is_unwrapped() {
    let body = json!({"data": {"id": 1, "name": "Fix bug"}});
    let task = parse_task_response(1, StatusCode::OK, body).unwrap();
    assert_eq!(task, json!({"id": 1, "name": "Fix bug"}));
  }

  #[test]
  fn error_response_carries_api_message() {
    let body = json!({"errors": [{"message": "task: Not a recognized ID: 99"}]});
    let err = parse_task_response(99, StatusCode::NOT_FOUND, body).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("404"));
    assert!(msg.contains("Not a recognized ID"));
  }

  #[test]
  fn success_without_envelope_is_an_error() {
    assert!(parse_task_response(1, StatusCode::OK, json!({"id": 1})).is_err());
  }
}

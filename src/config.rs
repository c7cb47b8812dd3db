use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_API_URL: &str = "https://app.asana.com/api/1.0";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub asana: AsanaConfig,
  #[serde(default)]
  pub database: DatabaseConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
  /// Auto-detect from the key: personal access tokens contain a `/`
  #[default]
  Auto,
  /// Legacy API key sent as the Basic auth username with an empty password
  Basic,
  /// Personal access token sent as a Bearer token
  Bearer,
}

impl AuthType {
  /// Resolve `Auto` into a concrete scheme for the given key.
  pub fn resolve(self, api_key: &str) -> AuthType {
    match self {
      AuthType::Auto if api_key.contains('/') => AuthType::Bearer,
      AuthType::Auto => AuthType::Basic,
      other => other,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AsanaConfig {
  #[serde(default = "default_api_url")]
  pub url: String,
  #[serde(default)]
  pub auth_type: AuthType,
  /// Request timeout; the HTTP client default applies when unset
  pub timeout_secs: Option<u64>,
}

impl Default for AsanaConfig {
  fn default() -> Self {
    Self {
      url: default_api_url(),
      auth_type: AuthType::default(),
      timeout_secs: None,
    }
  }
}

fn default_api_url() -> String {
  DEFAULT_API_URL.to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseConfig {
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
  /// Separate SQLite file, survives restarts
  #[default]
  Sqlite,
  /// Process-local map
  Memory,
  /// Caching disabled, every lookup misses
  None,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
  #[serde(default)]
  pub backend: CacheBackend,
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
  /// EnvFilter directive, overridden by RUST_LOG
  #[serde(default = "default_log_level")]
  pub level: String,
  /// Write logs to this file instead of stderr
  pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
      file: None,
    }
  }
}

fn default_log_level() -> String {
  "warn".to_string()
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./scrumsana.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/scrumsana/config.yaml
  ///
  /// Falls back to defaults when no file is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("scrumsana.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("scrumsana").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    // An empty file deserializes to null
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))
  }

  /// Get the Asana API key from environment variables.
  ///
  /// Checks SCRUMSANA_ASANA_API_KEY first, then ASANA_API_KEY as fallback.
  pub fn get_api_key() -> Result<String> {
    std::env::var("SCRUMSANA_ASANA_API_KEY")
      .or_else(|_| std::env::var("ASANA_API_KEY"))
      .map_err(|_| {
        eyre!(
          "Asana API key not found. Set SCRUMSANA_ASANA_API_KEY or ASANA_API_KEY environment variable."
        )
      })
  }

  /// Relational store location, defaulting to the user data directory.
  pub fn database_path(&self) -> Result<PathBuf> {
    match &self.database.path {
      Some(p) => Ok(p.clone()),
      None => Ok(data_dir()?.join("scrumsana.db")),
    }
  }

  /// Cache database location, defaulting to the user data directory.
  pub fn cache_path(&self) -> Result<PathBuf> {
    match &self.cache.path {
      Some(p) => Ok(p.clone()),
      None => Ok(data_dir()?.join("cache.db")),
    }
  }
}

fn data_dir() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(data_dir.join("scrumsana"))
}

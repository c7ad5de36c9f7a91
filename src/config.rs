use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  /// Endpoint path per resource kind (e.g. `userSkills: users/me/skills`).
  /// Kinds not listed use their own name as the path.
  #[serde(default)]
  pub resources: BTreeMap<String, String>,
  #[serde(default)]
  pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  #[serde(default = "default_base_url")]
  pub base_url: String,
  /// Per-request timeout; a timeout surfaces as a network failure
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: default_base_url(),
      timeout_secs: default_timeout_secs(),
    }
  }
}

fn default_base_url() -> String {
  "http://localhost:3000/api".to_string()
}

fn default_timeout_secs() -> u64 {
  30
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// How long fetched collections stay fresh
  #[serde(default = "default_ttl_secs")]
  pub ttl_secs: u64,
}

impl CacheConfig {
  pub fn ttl(&self) -> chrono::Duration {
    chrono::Duration::seconds(self.ttl_secs.min(i64::MAX as u64) as i64)
  }
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      ttl_secs: default_ttl_secs(),
    }
  }
}

fn default_ttl_secs() -> u64 {
  300
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
  /// Filter directive used when SKILLSYNC_LOG is not set
  #[serde(default = "default_log_level")]
  pub level: String,
  /// Log file directory (default: $XDG_DATA_HOME/skillsync/logs)
  pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
      directory: None,
    }
  }
}

fn default_log_level() -> String {
  "info".to_string()
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./skillsync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/skillsync/config.yaml
  ///
  /// With no file found the defaults are used. `SKILLSYNC_BASE_URL`
  /// overrides `api.base_url` either way.
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

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };

    if let Ok(base_url) = std::env::var("SKILLSYNC_BASE_URL") {
      config.api.base_url = base_url;
    }

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("skillsync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("skillsync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;
    if config.api.timeout_secs == 0 {
      return Err(eyre!("api.timeout_secs must be greater than zero"));
    }
    Ok(config)
  }
}

//! Configuration management for Quire
//!
//! Configuration is read from a YAML file, then overridden by `QUIRE_*`
//! environment variables, then by CLI flags.

use crate::error::{QuireError, Result};
use crate::ratelimit::interval_for;
use crate::sync::strategy_from_name;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure for Quire
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Local session store settings
    #[serde(default)]
    pub store: StoreConfig,
    /// Remote mirror settings
    #[serde(default)]
    pub remote: RemoteConfig,
    /// Literature lookup settings
    #[serde(default)]
    pub literature: LiteratureConfig,
}

/// Local session store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Maximum number of retained sessions
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Directory holding the sled database
    ///
    /// Defaults to the platform data directory for Quire.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Storage backend: `sled` or `memory`
    #[serde(default = "default_backend")]
    pub backend: String,
}

fn default_max_sessions() -> usize {
    crate::sync::DEFAULT_MAX_SESSIONS
}

fn default_backend() -> String {
    "sled".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            data_dir: None,
            backend: default_backend(),
        }
    }
}

/// Remote mirror configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Whether sessions are mirrored at all
    #[serde(default)]
    pub enabled: bool,

    /// Base URL of the PostgREST-style service
    #[serde(default)]
    pub base_url: String,

    /// API key, sent as `apikey` and as a bearer token
    #[serde(default)]
    pub api_key: Option<String>,

    /// Table holding the session records
    #[serde(default = "default_table")]
    pub table: String,

    /// Per-request timeout (seconds)
    #[serde(default = "default_remote_timeout")]
    pub timeout_seconds: u64,

    /// Extra sends of a failed mutation before it is marked failed
    #[serde(default)]
    pub retry_attempts: u32,

    /// `remote_wins` or `newest_wins`
    #[serde(default = "default_conflict_strategy")]
    pub conflict_strategy: String,
}

fn default_table() -> String {
    "chat_sessions".to_string()
}

fn default_remote_timeout() -> u64 {
    15
}

fn default_conflict_strategy() -> String {
    "remote_wins".to_string()
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: String::new(),
            api_key: None,
            table: default_table(),
            timeout_seconds: default_remote_timeout(),
            retry_attempts: 0,
            conflict_strategy: default_conflict_strategy(),
        }
    }
}

/// Literature lookup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiteratureConfig {
    /// Base URL of the paper search API
    #[serde(default = "default_literature_url")]
    pub base_url: String,

    /// Admission rate for outgoing requests
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: f64,

    /// Maximum number of waiting requests; unbounded when unset
    #[serde(default)]
    pub max_queue: Option<usize>,

    /// Per-request timeout (seconds)
    #[serde(default = "default_literature_timeout")]
    pub timeout_seconds: u64,

    /// Optional API key, sent as `x-api-key`
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_literature_url() -> String {
    "https://api.semanticscholar.org/graph/v1".to_string()
}

fn default_requests_per_second() -> f64 {
    3.0
}

fn default_literature_timeout() -> u64 {
    30
}

impl Default for LiteratureConfig {
    fn default() -> Self {
        Self {
            base_url: default_literature_url(),
            requests_per_second: default_requests_per_second(),
            max_queue: None,
            timeout_seconds: default_literature_timeout(),
            api_key: None,
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| QuireError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| QuireError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(max_sessions) = std::env::var("QUIRE_MAX_SESSIONS") {
            if let Ok(value) = max_sessions.parse() {
                self.store.max_sessions = value;
            } else {
                tracing::warn!("Invalid QUIRE_MAX_SESSIONS: {}", max_sessions);
            }
        }

        if let Ok(data_dir) = std::env::var("QUIRE_DATA_DIR") {
            self.store.data_dir = Some(PathBuf::from(data_dir));
        }

        if let Ok(url) = std::env::var("QUIRE_REMOTE_URL") {
            self.remote.base_url = url;
        }

        if let Ok(key) = std::env::var("QUIRE_REMOTE_API_KEY") {
            self.remote.api_key = Some(key);
        }

        if let Ok(enabled) = std::env::var("QUIRE_REMOTE_ENABLED") {
            match enabled.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => self.remote.enabled = true,
                "0" | "false" | "no" => self.remote.enabled = false,
                _ => tracing::warn!("Invalid QUIRE_REMOTE_ENABLED: {}", enabled),
            }
        }

        if let Ok(rps) = std::env::var("QUIRE_LITERATURE_RPS") {
            if let Ok(value) = rps.parse() {
                self.literature.requests_per_second = value;
            } else {
                tracing::warn!("Invalid QUIRE_LITERATURE_RPS: {}", rps);
            }
        }

        if let Ok(key) = std::env::var("QUIRE_LITERATURE_API_KEY") {
            self.literature.api_key = Some(key);
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }

        if let Some(backend) = &cli.backend {
            self.store.backend = backend.clone();
        }
    }

    /// Directory for the sled database
    ///
    /// # Errors
    ///
    /// Returns error if no `data_dir` is set and the platform has no home
    /// directory to derive one from
    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.store.data_dir {
            return Ok(dir.clone());
        }
        ProjectDirs::from("org", "quire", "quire")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or_else(|| {
                QuireError::Config("Could not determine a data directory".to_string()).into()
            })
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        if self.store.max_sessions == 0 {
            return Err(
                QuireError::Config("store.max_sessions must be greater than 0".to_string()).into(),
            );
        }

        if self.store.max_sessions > 1000 {
            return Err(QuireError::Config(
                "store.max_sessions must be less than or equal to 1000".to_string(),
            )
            .into());
        }

        let valid_backends = ["sled", "memory"];
        if !valid_backends.contains(&self.store.backend.as_str()) {
            return Err(QuireError::Config(format!(
                "Invalid store backend: {}. Must be one of: {}",
                self.store.backend,
                valid_backends.join(", ")
            ))
            .into());
        }

        if self.remote.enabled {
            if self.remote.base_url.is_empty() {
                return Err(QuireError::Config(
                    "remote.base_url is required when remote.enabled is true".to_string(),
                )
                .into());
            }
            url::Url::parse(&self.remote.base_url)
                .map_err(|e| QuireError::Config(format!("Invalid remote.base_url: {}", e)))?;
        }

        if self.remote.timeout_seconds == 0 {
            return Err(QuireError::Config(
                "remote.timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        strategy_from_name(&self.remote.conflict_strategy)?;

        let rps = self.literature.requests_per_second;
        interval_for(rps).map_err(|e| {
            QuireError::Config(format!("literature.requests_per_second is invalid: {}", e))
        })?;

        if self.literature.max_queue == Some(0) {
            return Err(QuireError::Config(
                "literature.max_queue must be greater than 0 when set".to_string(),
            )
            .into());
        }

        if self.literature.timeout_seconds == 0 {
            return Err(QuireError::Config(
                "literature.timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        url::Url::parse(&self.literature.base_url)
            .map_err(|e| QuireError::Config(format!("Invalid literature.base_url: {}", e)))?;

        Ok(())
    }
}

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StratusConfig {
    pub server: ServerConfig,
    pub retrieval: RetrievalConfig,
    pub session: SessionConfig,
    pub inventory: InventoryConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Result cap per index group in fan-out search.
    pub top_k_per_group: usize,
    /// Deadline per group before it is treated as failed.
    pub group_timeout_ms: u64,
    /// Items retrieved per group before context budgeting.
    pub context_retrieve_k: usize,
    /// Default token budget for agent-context builds.
    pub max_context_tokens: usize,
    /// Token-to-character conversion for the context budget.
    pub chars_per_token: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SessionConfig {
    pub default_ttl_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct InventoryConfig {
    pub default_region: String,
    /// Importance floor for `keep_important` session cleanup.
    pub cleanup_importance_threshold: f64,
}

impl Default for StratusConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            retrieval: RetrievalConfig::default(),
            session: SessionConfig::default(),
            inventory: InventoryConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8180,
            log_level: "info".into(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k_per_group: 5,
            group_timeout_ms: 2_000,
            context_retrieve_k: 5,
            max_context_tokens: 4_000,
            chars_per_token: 4,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_ttl_seconds: 3_600,
        }
    }
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            default_region: "us-east-1".into(),
            cleanup_importance_threshold: 0.7,
        }
    }
}

/// Returns `~/.stratus/`
pub fn default_stratus_dir() -> PathBuf {
    dirs::home_dir()
        .expect("home directory must exist")
        .join(".stratus")
}

/// Returns the default config file path: `~/.stratus/config.toml`
pub fn default_config_path() -> PathBuf {
    default_stratus_dir().join("config.toml")
}

impl StratusConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            StratusConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (STRATUS_HOST, STRATUS_PORT,
    /// STRATUS_LOG_LEVEL, STRATUS_REGION).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("STRATUS_HOST") {
            self.server.host = val;
        }
        if let Ok(val) = std::env::var("STRATUS_PORT") {
            if let Ok(port) = val.parse() {
                self.server.port = port;
            }
        }
        if let Ok(val) = std::env::var("STRATUS_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("STRATUS_REGION") {
            self.inventory.default_region = val;
        }
    }

    /// The configured context budget in characters.
    pub fn context_char_budget(&self) -> usize {
        self.retrieval.max_context_tokens * self.retrieval.chars_per_token
    }
}

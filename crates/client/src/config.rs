use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::DEFAULT_CAPACITY;
use crate::error::ConfigError;
use crate::ingest::IngestPoll;
use crate::orchestrator::OrchestratorConfig;

pub const SERVER_URL_ENV: &str = "AUGUSTUS_SERVER_URL";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    pub server_url: String,
    pub storage_path: Option<PathBuf>,
    pub cache_capacity: usize,
    pub sign_out_delay_ms: u64,
    pub ingest_poll_interval_ms: u64,
    pub ingest_timeout_ms: Option<u64>,
    pub max_query_length: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:3000".to_string(),
            storage_path: None,
            cache_capacity: DEFAULT_CAPACITY,
            sign_out_delay_ms: 1500,
            ingest_poll_interval_ms: 1500,
            ingest_timeout_ms: None,
            max_query_length: augustus_shared::MAX_QUERY_LENGTH,
        }
    }
}

impl ClientConfig {
    /// Load from the default location, creating it with defaults on first run.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        if let Ok(url) = std::env::var(SERVER_URL_ENV) {
            config.server_url = normalize_server_url(&url)?;
        }
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Self::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.display().to_string(),
            source,
        })?;
        let mut config: ClientConfig = serde_json::from_str(&content)?;
        config.server_url = normalize_server_url(&config.server_url)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let unwritable = |source| ConfigError::Unreadable {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(unwritable)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(unwritable)?;
        Ok(())
    }

    pub fn set_server_url(&mut self, url: &str) -> Result<(), ConfigError> {
        self.server_url = normalize_server_url(url)?;
        self.save()
    }

    pub fn storage_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.storage_path {
            Some(path) => Ok(path.clone()),
            None => {
                let home = dirs::home_dir().ok_or(ConfigError::NoHome)?;
                Ok(home.join(".local").join("share").join("augustus").join("state.db"))
            }
        }
    }

    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_query_length: self.max_query_length,
            sign_out_delay: Duration::from_millis(self.sign_out_delay_ms),
        }
    }

    pub fn ingest_poll(&self, timeout: Option<Duration>) -> IngestPoll {
        IngestPoll::new(
            Duration::from_millis(self.ingest_poll_interval_ms),
            timeout.or(self.ingest_timeout_ms.map(Duration::from_millis)),
        )
    }

    pub fn config_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHome)?;
        Ok(home.join(".config").join("augustus").join("config.json"))
    }
}

/// Require an absolute http(s) URL and drop trailing slashes.
pub fn normalize_server_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let rest = trimmed
        .strip_prefix("http://")
        .or_else(|| trimmed.strip_prefix("https://"))
        .ok_or_else(|| ConfigError::InvalidUrl(raw.to_string()))?;

    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if host.is_empty() || host.contains(char::is_whitespace) {
        return Err(ConfigError::InvalidUrl(raw.to_string()));
    }
    Ok(trimmed.to_string())
}

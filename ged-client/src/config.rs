use std::fs;
use std::path::Path;
use std::time::Duration;

use ged_model::DocumentId;
use serde::{Deserialize, Serialize};

/// Default settings for the GED HTTP client.
#[derive(Debug, Clone, Copy)]
pub struct ClientDefaults {
    pub base_url: &'static str,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub user_agent: &'static str,
}

/// Shared defaults so CLI, GUI and tests stay in sync.
pub const GED_CLIENT_DEFAULTS: ClientDefaults = ClientDefaults {
    base_url: "http://localhost:8080/api",
    timeout_secs: 30,
    max_retries: 2,
    retry_backoff_ms: 250,
    user_agent: concat!("ged-client/", env!("CARGO_PKG_VERSION")),
};

/// Upper bound for `retry_backoff_ms`; the wait before attempt `n` is `n` times this.
pub const MAX_RETRY_BACKOFF_MS: u64 = 60_000;

pub const ENV_BASE_URL: &str = "GED_API_BASE_URL";
pub const ENV_TOKEN: &str = "GED_API_TOKEN";
pub const ENV_TIMEOUT_SECS: &str = "GED_HTTP_TIMEOUT_SECS";
pub const ENV_MAX_RETRIES: &str = "GED_HTTP_MAX_RETRIES";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Connection settings for the search and document-file APIs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub base_url: String,
    /// Bearer token obtained from the identity provider. Acquisition is external.
    #[serde(default)]
    pub auth_token: Option<String>,
    pub timeout_secs: u64,
    /// Extra attempts after the first one on connect/timeout errors and 5xx.
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        default_client_config()
    }
}

/// Convenience helper to build a [`ClientConfig`] from the shared defaults.
pub fn default_client_config() -> ClientConfig {
    ClientConfig {
        base_url: GED_CLIENT_DEFAULTS.base_url.into(),
        auth_token: None,
        timeout_secs: GED_CLIENT_DEFAULTS.timeout_secs,
        max_retries: GED_CLIENT_DEFAULTS.max_retries,
        retry_backoff_ms: GED_CLIENT_DEFAULTS.retry_backoff_ms,
        user_agent: GED_CLIENT_DEFAULTS.user_agent.into(),
    }
}

impl ClientConfig {
    /// Defaults overridden by whatever `lookup` returns for the `GED_*` keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = default_client_config();
        if let Some(url) = lookup(ENV_BASE_URL) {
            cfg.base_url = url.trim().to_string();
        }
        if let Some(token) = lookup(ENV_TOKEN) {
            let token = token.trim();
            cfg.auth_token = if token.is_empty() { None } else { Some(token.to_string()) };
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            cfg.timeout_secs = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::Parse(format!("{ENV_TIMEOUT_SECS}: `{raw}` is not a number")))?;
        }
        if let Some(raw) = lookup(ENV_MAX_RETRIES) {
            cfg.max_retries = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::Parse(format!("{ENV_MAX_RETRIES}: `{raw}` is not a number")))?;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let cfg: ClientConfig = serde_json::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        if let Some(dir) = path.as_ref().parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        let text = serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        fs::write(path, text)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!("base_url must be http(s): `{}`", self.base_url)));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeout_secs must be greater than zero".into()));
        }
        if self.retry_backoff_ms > MAX_RETRY_BACKOFF_MS {
            return Err(ConfigError::Invalid(format!(
                "retry_backoff_ms must be at most {MAX_RETRY_BACKOFF_MS}, got {}",
                self.retry_backoff_ms
            )));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    fn base(&self) -> &str {
        self.base_url.trim().trim_end_matches('/')
    }

    pub fn search_url(&self) -> String {
        format!("{}/documents/search", self.base())
    }

    pub fn file_url(&self, id: DocumentId) -> String {
        format!("{}/documents/{}/file", self.base(), id)
    }
}

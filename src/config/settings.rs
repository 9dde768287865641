//! Ambient settings: shared secret, backend location, timeouts, gate scope.
//!
//! Resolution order (later wins):
//! 1. Built-in defaults.
//! 2. Optional YAML file named by `MCP_VIDEO_SERVER_CONFIG`.
//! 3. Individual environment variables.
//!
//! CLI flags are applied on top by the caller.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use super::errors::ConfigError;
use super::{API_BASE_URL_ENV, API_KEY_ENV, AUTH_SCOPE_ENV, CONFIG_FILE_ENV};

// ─── Defaults ────────────────────────────────────────────────────────────────

/// Shared secret accepted by the request gate unless overridden.
pub const DEFAULT_API_KEY: &str = "mcp_video_api_key_2024";

/// Base URL of the video data service.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8001";

/// Outbound request timeout for calls to the video data service.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ─── AuthScope ───────────────────────────────────────────────────────────────

/// Which inbound requests the API-key gate validates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthScope {
    /// Only tool discovery (`tools/list`).
    #[default]
    Discovery,
    /// Discovery and every `tools/call`.
    All,
}

impl AuthScope {
    /// Whether `tools/call` requests must also carry the secret.
    pub fn gates_calls(self) -> bool {
        matches!(self, AuthScope::All)
    }
}

impl fmt::Display for AuthScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthScope::Discovery => f.write_str("discovery"),
            AuthScope::All => f.write_str("all"),
        }
    }
}

impl FromStr for AuthScope {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "discovery" => Ok(AuthScope::Discovery),
            "all" => Ok(AuthScope::All),
            _ => Err(ConfigError::UnknownAuthScope {
                value: s.to_string(),
            }),
        }
    }
}

// ─── Settings ────────────────────────────────────────────────────────────────

/// Fully resolved ambient settings.
#[derive(Clone)]
pub struct Settings {
    /// Shared secret for the request gate.
    pub api_key: String,
    /// Base URL of the video data service (no trailing slash).
    pub api_base_url: String,
    /// Timeout applied to each outbound HTTP call.
    pub request_timeout: Duration,
    /// Which requests the gate validates.
    pub auth_scope: AuthScope,
}

// Hand-written so the secret never lands in logs via `{:?}`.
impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("api_key", &"<redacted>")
            .field("api_base_url", &self.api_base_url)
            .field("request_timeout", &self.request_timeout)
            .field("auth_scope", &self.auth_scope)
            .finish()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: DEFAULT_API_KEY.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            auth_scope: AuthScope::Discovery,
        }
    }
}

/// On-disk shape of the YAML settings file. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SettingsFile {
    api_key: Option<String>,
    api_base_url: Option<String>,
    request_timeout_secs: Option<u64>,
    auth_scope: Option<AuthScope>,
}

impl Settings {
    /// Load settings from the file named by `MCP_VIDEO_SERVER_CONFIG` (if any)
    /// and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut settings = match non_empty_env(CONFIG_FILE_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        settings.apply_env()?;
        Ok(settings)
    }

    /// Load settings from an explicit YAML file, without consulting the environment.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let mut settings = Self::default();
        settings.apply_file(path)?;
        Ok(settings)
    }

    /// Override the outbound request timeout (CLI `--timeout`).
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn apply_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::SettingsFile {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let file: SettingsFile =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::SettingsFile {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        if let Some(key) = file.api_key {
            self.api_key = key;
        }
        if let Some(url) = file.api_base_url {
            self.api_base_url = normalize_base_url(&url);
        }
        if let Some(secs) = file.request_timeout_secs {
            self.request_timeout = Duration::from_secs(secs);
        }
        if let Some(scope) = file.auth_scope {
            self.auth_scope = scope;
        }

        tracing::debug!(path = %path.display(), "applied settings file");
        Ok(())
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(key) = non_empty_env(API_KEY_ENV) {
            self.api_key = key;
        }
        if let Some(url) = non_empty_env(API_BASE_URL_ENV) {
            self.api_base_url = normalize_base_url(&url);
        }
        if let Some(scope) = non_empty_env(AUTH_SCOPE_ENV) {
            self.auth_scope = scope.parse()?;
        }
        Ok(())
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────

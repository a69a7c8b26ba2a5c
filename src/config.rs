//! Configuration file parser for ~/.config/newsline/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! `BACKEND_URL` and `API_KEY` environment variables take precedence over the
//! file. The backend pair is only required when a request is about to be made,
//! and is resolved through [`Config::backend`].
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("BACKEND_URL is not set (environment or config file)")]
    MissingBackendUrl,

    #[error("API_KEY is not set (environment or config file)")]
    MissingApiKey,

    #[error("Invalid backend URL: {0}")]
    InvalidBackendUrl(#[from] url::ParseError),

    #[error("Insecure backend URL: HTTPS required (except localhost for development)")]
    InsecureBackendUrl,

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level client configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
///
/// Custom Debug impl masks `api_key`.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the backend API, e.g. `https://api.example.com`.
    pub backend_url: Option<String>,

    /// Static API key sent with every backend request.
    pub api_key: Option<String>,

    /// How long a cached feed stays valid, in seconds.
    pub cache_max_age_secs: u64,

    /// Items requested for the first page of a feed.
    pub first_page_size: u32,

    /// Items requested for every later page.
    pub page_size: u32,

    /// Upper bound on any single backend request, in seconds.
    pub request_timeout_secs: u64,

    /// Where the CLI keeps session tokens between runs.
    pub session_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: None,
            api_key: None,
            cache_max_age_secs: 300,
            first_page_size: 10,
            page_size: 9,
            request_timeout_secs: 30,
            session_file: None,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("backend_url", &self.backend_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("cache_max_age_secs", &self.cache_max_age_secs)
            .field("first_page_size", &self.first_page_size)
            .field("page_size", &self.page_size)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("session_file", &self.session_file)
            .finish()
    }
}

/// Resolved, validated connection settings for [`ApiClient`](crate::api::ApiClient).
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: Url,
    pub api_key: SecretString,
    pub timeout: Duration,
}

/// Page sizes for feed pagination.
///
/// The first page carries one extra "featured" item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSizes {
    pub first: u32,
    pub rest: u32,
}

impl Default for PageSizes {
    fn default() -> Self {
        Self { first: 10, rest: 9 }
    }
}

impl PageSizes {
    pub fn limit_for(&self, skip: usize) -> u32 {
        if skip == 0 {
            self.first
        } else {
            self.rest
        }
    }
}

const KNOWN_KEYS: [&str; 7] = [
    "backend_url",
    "api_key",
    "cache_max_age_secs",
    "first_page_size",
    "page_size",
    "request_timeout_secs",
    "session_file",
];

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Apply `BACKEND_URL` / `API_KEY` from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.apply_env(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`; non-empty values win over the file.
    pub fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup("BACKEND_URL").filter(|v| !v.trim().is_empty()) {
            self.backend_url = Some(url);
        }
        if let Some(key) = lookup("API_KEY").filter(|v| !v.trim().is_empty()) {
            self.api_key = Some(key);
        }
        self
    }

    /// Resolve the backend connection settings, failing fast when incomplete.
    pub fn backend(&self) -> Result<BackendConfig, ConfigError> {
        let raw_url = self
            .backend_url
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::MissingBackendUrl)?;
        let api_key = self
            .api_key
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)?;
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "request_timeout_secs",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(BackendConfig {
            base_url: validate_backend_url(raw_url)?,
            api_key: SecretString::from(api_key.to_string()),
            timeout: Duration::from_secs(self.request_timeout_secs),
        })
    }

    pub fn cache_max_age(&self) -> Duration {
        Duration::from_secs(self.cache_max_age_secs)
    }

    /// Page sizes, with zero values replaced by the defaults.
    pub fn page_sizes(&self) -> PageSizes {
        let defaults = PageSizes::default();
        PageSizes {
            first: if self.first_page_size == 0 {
                defaults.first
            } else {
                self.first_page_size
            },
            rest: if self.page_size == 0 {
                defaults.rest
            } else {
                self.page_size
            },
        }
    }
}

/// Parse the backend URL and enforce HTTPS so the API key and bearer tokens
/// never travel in clear text. Plain HTTP is allowed only for localhost.
pub fn validate_backend_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw)?;
    match url.scheme() {
        "https" => Ok(url),
        "http" => {
            let is_localhost = matches!(url.host_str(), Some("localhost" | "127.0.0.1" | "[::1]"));
            if is_localhost {
                tracing::warn!(backend_url = %url, "Using non-HTTPS backend URL (localhost only)");
                Ok(url)
            } else {
                tracing::error!(backend_url = %url, "Rejecting non-HTTPS backend URL");
                Err(ConfigError::InsecureBackendUrl)
            }
        }
        _ => Err(ConfigError::InsecureBackendUrl),
    }
}

// ============================================================================
// Tests
// ============================================================================

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::{ApaaiError, Result};

pub const DEFAULT_ENDPOINT: &str = "http://localhost:8787";
pub const ENDPOINT_ENV: &str = "APAAI_ENDPOINT";
pub const API_KEY_ENV: &str = "APAAI_KEY";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// AuthScheme / RouteStyle
// ---------------------------------------------------------------------------

/// How the API key travels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthScheme {
    /// `x-api-key: <key>`
    #[default]
    ApiKeyHeader,
    /// `authorization: Bearer <key>`
    Bearer,
}

/// Which path layout the service uses for approve/reject.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteStyle {
    /// `/approve/{id}`, `/reject/{id}`
    #[default]
    Legacy,
    /// `/actions/{id}/approve`, `/actions/{id}/reject`
    Nested,
}

// ---------------------------------------------------------------------------
// ClientConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default)]
    pub auth: AuthScheme,
    #[serde(default)]
    pub approval_routes: RouteStyle,
    /// Extra headers sent with every request.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: None,
            auth: AuthScheme::default(),
            approval_routes: RouteStyle::default(),
            headers: BTreeMap::new(),
            timeout_secs: None,
        }
    }
}

impl ClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Endpoint without trailing slashes.
    pub fn base_url(&self) -> &str {
        self.endpoint.trim_end_matches('/')
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// `~/.apaai/config.yaml`, if a home directory is known.
    pub fn default_path() -> Option<PathBuf> {
        home::home_dir().map(|h| h.join(".apaai").join("config.yaml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ApaaiError::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        let data = std::fs::read_to_string(path)?;
        let cfg: ClientConfig = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    /// Load `explicit` (must exist), else the default path when present,
    /// else built-in defaults; then apply environment overrides.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let mut cfg = match explicit {
            Some(p) => Self::load(p)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(p) => Self::load(&p)?,
                None => Self::default(),
            },
        };
        cfg.apply_env(|k| std::env::var(k).ok());
        Ok(cfg)
    }

    /// `APAAI_ENDPOINT` and `APAAI_KEY` override the file values. Empty
    /// values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(endpoint) = lookup(ENDPOINT_ENV).filter(|v| !v.trim().is_empty()) {
            self.endpoint = endpoint;
        }
        if let Some(key) = lookup(API_KEY_ENV).filter(|v| !v.trim().is_empty()) {
            self.api_key = Some(key);
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        atomic_write(path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        // 1. Endpoint must be an absolute http(s) URL
        match reqwest::Url::parse(self.base_url()) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {
                // 2. Credentials over plain http to a remote host
                let local = matches!(url.host_str(), Some("localhost" | "127.0.0.1" | "[::1]"));
                if url.scheme() == "http" && !local && self.api_key.is_some() {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Warning,
                        message: format!(
                            "api key is sent in clear text to '{}'; use https",
                            self.base_url()
                        ),
                    });
                }
            }
            Ok(url) => warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!("endpoint scheme '{}' is not http or https", url.scheme()),
            }),
            Err(e) => warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!("endpoint '{}' is not a valid URL: {e}", self.endpoint),
            }),
        }

        // 3. Empty api key is almost certainly a templating mistake
        if self.api_key.as_deref().is_some_and(|k| k.trim().is_empty()) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "api_key is set but empty".to_string(),
            });
        }

        // 4. Header names/values must be valid HTTP
        for (name, value) in &self.headers {
            if reqwest::header::HeaderName::from_bytes(name.as_bytes()).is_err() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("invalid header name '{name}'"),
                });
            } else if reqwest::header::HeaderValue::from_str(value).is_err() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("invalid value for header '{name}'"),
                });
            }
        }

        // 5. Auth headers in `headers` get overwritten by api_key
        if self.api_key.is_some() {
            let shadowed = match self.auth {
                AuthScheme::ApiKeyHeader => "x-api-key",
                AuthScheme::Bearer => "authorization",
            };
            if self.headers.keys().any(|k| k.eq_ignore_ascii_case(shadowed)) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("header '{shadowed}' is overridden by api_key"),
                });
            }
        }

        if self.timeout_secs == Some(0) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "timeout_secs must be greater than zero".to_string(),
            });
        }

        warnings
    }
}

/// Atomically write `data` to `path` using a tempfile in the same directory.
fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

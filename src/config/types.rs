//! Core configuration types and loading.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

use super::security::{RateLimitConfig, UploadTokenConfig};

/// Environment variable names recognised by [`Config::apply_env_overrides`].
pub mod env {
    pub const BIND: &str = "REPORTGATE_BIND";
    pub const CREATE_MAX: &str = "REPORTGATE_CREATE_MAX";
    pub const CREATE_WINDOW_SECS: &str = "REPORTGATE_CREATE_WINDOW_SECS";
    pub const EVIDENCE_MAX: &str = "REPORTGATE_EVIDENCE_MAX";
    pub const EVIDENCE_WINDOW_SECS: &str = "REPORTGATE_EVIDENCE_WINDOW_SECS";
    pub const UPLOAD_TOKEN_SECRET: &str = "REPORTGATE_UPLOAD_TOKEN_SECRET";
    pub const UPLOAD_TOKEN_TTL_SECS: &str = "REPORTGATE_UPLOAD_TOKEN_TTL_SECS";
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },
}

/// Service configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Per-endpoint admission quotas.
    #[serde(default)]
    pub rate_limits: RateLimitConfig,
    /// Upload token signing.
    #[serde(default)]
    pub upload_token: UploadTokenConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load from `path` when it exists, defaults otherwise.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            tracing::info!(path = %path.display(), "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Apply environment-style overrides on top of the loaded file.
    ///
    /// Numeric values that do not parse are dropped so the defaults apply;
    /// non-positive ones are kept and resolved to defaults later. A bind
    /// address that does not parse is an error.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(env::BIND) {
            self.server.bind = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                name: env::BIND,
                value: value.clone(),
            })?;
        }

        let numeric = |name: &str| lookup(name).map(|v| v.trim().parse::<i64>().ok());

        if let Some(v) = numeric(env::CREATE_MAX) {
            self.rate_limits.create.max_requests = v;
        }
        if let Some(v) = numeric(env::CREATE_WINDOW_SECS) {
            self.rate_limits.create.window_secs = v;
        }
        if let Some(v) = numeric(env::EVIDENCE_MAX) {
            self.rate_limits.evidence.max_requests = v;
        }
        if let Some(v) = numeric(env::EVIDENCE_WINDOW_SECS) {
            self.rate_limits.evidence.window_secs = v;
        }
        if let Some(v) = numeric(env::UPLOAD_TOKEN_TTL_SECS) {
            self.upload_token.ttl_secs = v;
        }
        if let Some(secret) = lookup(env::UPLOAD_TOKEN_SECRET) {
            self.upload_token.secret = Some(secret);
        }

        Ok(())
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Listen address (default: 127.0.0.1:8080).
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    /// Serve Prometheus metrics on `/metrics` (default: true).
    #[serde(default = "default_true")]
    pub metrics: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            metrics: true,
        }
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

pub(super) fn default_true() -> bool {
    true
}

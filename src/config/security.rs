//! Security configuration for rate limiting and upload tokens.

use serde::Deserialize;
use std::time::Duration;

/// Default quota for report creation: 5 per minute.
pub const DEFAULT_CREATE_QUOTA: RateQuota = RateQuota::new(5, 60);

/// Default quota for evidence attachment: 20 per 10 minutes.
pub const DEFAULT_EVIDENCE_QUOTA: RateQuota = RateQuota::new(20, 600);

/// Rate limiting configuration, one rule per protected operation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RateLimitConfig {
    /// Report creation (`POST /reports`).
    #[serde(default)]
    pub create: RateLimitRule,
    /// Evidence attachment (`POST /reports/:id/evidence`).
    #[serde(default)]
    pub evidence: RateLimitRule,
    /// Seconds between sweeps of expired rate buckets (default: 60).
    #[serde(default)]
    pub sweep_interval_secs: Option<i64>,
}

impl RateLimitConfig {
    pub fn create_quota(&self) -> RateQuota {
        self.create.resolve(DEFAULT_CREATE_QUOTA)
    }

    pub fn evidence_quota(&self) -> RateQuota {
        self.evidence.resolve(DEFAULT_EVIDENCE_QUOTA)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(positive_or(self.sweep_interval_secs, default_sweep_interval_secs()))
    }
}

/// Limit/window pair as written in the file or environment.
///
/// Kept signed and optional so that missing, zero or negative values can be
/// replaced by defaults when resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct RateLimitRule {
    /// Maximum admissions per window.
    #[serde(default)]
    pub max_requests: Option<i64>,
    /// Window length in seconds.
    #[serde(default)]
    pub window_secs: Option<i64>,
}

impl RateLimitRule {
    /// Effective quota, taking each value from `defaults` when not positive.
    pub fn resolve(&self, defaults: RateQuota) -> RateQuota {
        let limit = positive(self.max_requests)
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(defaults.limit);
        let window = positive(self.window_secs)
            .and_then(|v| u64::try_from(v).ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.window);
        RateQuota { limit, window }
    }
}

/// Resolved limit/window pair passed to the rate limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateQuota {
    pub limit: u32,
    pub window: Duration,
}

impl RateQuota {
    pub const fn new(limit: u32, window_secs: u64) -> Self {
        Self {
            limit,
            window: Duration::from_secs(window_secs),
        }
    }
}

fn positive(v: Option<i64>) -> Option<i64> {
    v.filter(|v| *v > 0)
}

fn positive_or(v: Option<i64>, default: u64) -> u64 {
    positive(v)
        .and_then(|v| u64::try_from(v).ok())
        .unwrap_or(default)
}

fn default_sweep_interval_secs() -> u64 {
    60
}

/// Upload capability token configuration.
#[derive(Clone, Deserialize, Default)]
pub struct UploadTokenConfig {
    /// HMAC signing secret. Required; there is no fallback to any other
    /// credential.
    #[serde(default)]
    pub secret: Option<String>,
    /// Token lifetime in seconds (default: 1800).
    #[serde(default)]
    pub ttl_secs: Option<i64>,
}

impl UploadTokenConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(positive_or(self.ttl_secs, default_token_ttl_secs()))
    }

    /// Configured secret, if present and not blank.
    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref().filter(|s| !s.trim().is_empty())
    }
}

impl std::fmt::Debug for UploadTokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadTokenConfig")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("ttl_secs", &self.ttl_secs)
            .finish()
    }
}

fn default_token_ttl_secs() -> u64 {
    1800
}

/// Check if a signing secret looks like a placeholder or is too short.
pub fn is_weak_secret(secret: &str) -> bool {
    let lowered = secret.to_ascii_lowercase();
    secret.len() < 16
        || lowered.contains("changeme")
        || lowered.contains("default")
        || lowered.contains("secret")
}

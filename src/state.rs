//! Shared application state.
//!
//! Built once at startup and handed to every handler behind an `Arc`.
//! Tests build a fresh state per case, so no rate buckets leak between them.

use crate::config::Config;
use crate::reports::ReportStore;
use crate::security::{RateLimitManager, UploadTokenService};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

pub struct AppState {
    pub config: Config,
    pub rate_limiter: Arc<RateLimitManager>,
    pub tokens: UploadTokenService,
    pub reports: Arc<dyn ReportStore>,
}

impl AppState {
    pub fn new(config: Config, reports: Arc<dyn ReportStore>) -> Self {
        let rate_limiter = Arc::new(RateLimitManager::with_sweep_interval(
            config.rate_limits.sweep_interval(),
        ));
        let tokens = UploadTokenService::new(
            config.upload_token.secret().map(str::to_string),
            config.upload_token.ttl(),
        );

        Self {
            config,
            rate_limiter,
            tokens,
            reports,
        }
    }
}

/// Periodically sweep expired rate buckets.
///
/// Complements the lazy sweep inside `check` for quiet periods with no
/// traffic to trigger it.
pub fn spawn_sweep_task(rate_limiter: Arc<RateLimitManager>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let removed = rate_limiter.sweep_expired();
            if removed > 0 {
                debug!(removed, remaining = rate_limiter.stats().buckets, "rate bucket sweep");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::MemoryReportStore;

    #[test]
    fn state_without_secret_has_unconfigured_tokens() {
        let state = AppState::new(Config::default(), Arc::new(MemoryReportStore::new()));
        assert!(!state.tokens.is_configured());
        assert_eq!(state.rate_limiter.stats().buckets, 0);
    }

    #[test]
    fn state_uses_configured_secret_and_ttl() {
        let config: Config = toml::from_str(
            r#"
[upload_token]
secret = "0f1e2d3c4b5a69788796a5b4c3d2e1f0"
ttl_secs = 60
"#,
        )
        .unwrap();
        let state = AppState::new(config, Arc::new(MemoryReportStore::new()));
        assert!(state.tokens.is_configured());
        assert_eq!(state.tokens.ttl(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn sweep_task_removes_expired_buckets() {
        let limiter = Arc::new(RateLimitManager::new());
        let past = chrono::Utc::now() - chrono::TimeDelta::seconds(120);
        limiter.check_identity_at("ns", "c", 1, Duration::from_secs(10), past);
        assert_eq!(limiter.stats().buckets, 1);

        let handle = spawn_sweep_task(Arc::clone(&limiter), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();

        assert_eq!(limiter.stats().buckets, 0);
    }
}

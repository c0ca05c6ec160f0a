//! reportgated - report intake HTTP daemon.

use reportgate::config::{self, Config, ValidationWarning};
use reportgate::reports::MemoryReportStore;
use reportgate::state::{AppState, spawn_sweep_task};
use reportgate::{http, metrics};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "reportgate.toml".to_string());

    let mut config = Config::load_or_default(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;
    config.apply_env_overrides(|name| std::env::var(name).ok())?;

    // SECURITY: Refuse to start without an upload token secret.
    match config::validate(&config) {
        Ok(warnings) => {
            for warning in warnings {
                match warning {
                    ValidationWarning::WeakUploadTokenSecret => warn!(
                        "upload token secret looks weak; generate one with: openssl rand -hex 32"
                    ),
                    ValidationWarning::NonPositiveValue(name) => {
                        warn!(setting = name, "non-positive value ignored, using default")
                    }
                }
            }
        }
        Err(errors) => {
            for e in &errors {
                error!("FATAL: {}", e);
            }
            return Err(anyhow::anyhow!(
                "Refusing to start with invalid configuration. See error messages above."
            ));
        }
    }

    let create = config.rate_limits.create_quota();
    let evidence = config.rate_limits.evidence_quota();
    info!(
        bind = %config.server.bind,
        create_limit = create.limit,
        create_window_secs = create.window.as_secs(),
        evidence_limit = evidence.limit,
        evidence_window_secs = evidence.window.as_secs(),
        token_ttl_secs = config.upload_token.ttl().as_secs(),
        "Starting reportgated"
    );

    if config.server.metrics {
        metrics::init();
        info!("Metrics initialized");
    } else {
        info!("Metrics disabled");
    }

    let bind = config.server.bind;
    let sweep_interval = config.rate_limits.sweep_interval();
    let state = Arc::new(AppState::new(config, Arc::new(MemoryReportStore::new())));

    // Start rate bucket sweep task
    spawn_sweep_task(Arc::clone(&state.rate_limiter), sweep_interval);
    info!(
        interval_secs = sweep_interval.as_secs(),
        "Rate bucket sweep task started"
    );

    let listener = tokio::net::TcpListener::bind(bind).await.map_err(|e| {
        error!(%bind, error = %e, "Failed to bind HTTP listener");
        e
    })?;

    http::serve(listener, state).await?;

    Ok(())
}

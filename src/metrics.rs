//! Prometheus metrics collection for reportgate.
//!
//! Exposed on `/metrics` when `[server] metrics = true`.
//!
//! - `reportgate_admitted_total{namespace}` - Requests admitted by the rate limiter
//! - `reportgate_rate_limited_total{namespace}` - Requests denied by the rate limiter
//! - `reportgate_rate_buckets` - Tracked rate buckets after the last sweep
//! - `reportgate_tokens_issued_total` - Upload tokens issued
//! - `reportgate_token_rejections_total{reason}` - Upload tokens rejected, by reason
//! - `reportgate_request_duration_seconds{route}` - Handler latency
//!
//! Recording helpers are no-ops until [`init`] has run, so library code and
//! unit tests can call them freely.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Admission control
// ========================================================================

pub static ADMITTED: OnceLock<IntCounterVec> = OnceLock::new();

pub static RATE_LIMITED: OnceLock<IntCounterVec> = OnceLock::new();

pub static RATE_BUCKETS: OnceLock<IntGauge> = OnceLock::new();

// ========================================================================
// Upload tokens
// ========================================================================

pub static TOKENS_ISSUED: OnceLock<IntCounter> = OnceLock::new();

pub static TOKEN_REJECTIONS: OnceLock<IntCounterVec> = OnceLock::new();

// ========================================================================
// HTTP
// ========================================================================

pub static REQUEST_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Safe to call more than once; only the first call registers.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            if $metric.get().is_none() {
                match $init {
                    Ok(m) => {
                        if let Err(e) = r.register(Box::new(m.clone())) {
                            tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
                        }
                        let _ = $metric.set(m);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, concat!("Failed to create metric ", stringify!($metric)));
                    }
                }
            }
        };
    }

    register!(ADMITTED, IntCounterVec::new(Opts::new("reportgate_admitted_total", "Requests admitted by the rate limiter"), &["namespace"]));
    register!(RATE_LIMITED, IntCounterVec::new(Opts::new("reportgate_rate_limited_total", "Requests denied by the rate limiter"), &["namespace"]));
    register!(RATE_BUCKETS, IntGauge::new("reportgate_rate_buckets", "Tracked rate buckets"));
    register!(TOKENS_ISSUED, IntCounter::new("reportgate_tokens_issued_total", "Upload tokens issued"));
    register!(TOKEN_REJECTIONS, IntCounterVec::new(Opts::new("reportgate_token_rejections_total", "Upload tokens rejected by reason"), &["reason"]));
    register!(REQUEST_LATENCY, HistogramVec::new(
        HistogramOpts::new("reportgate_request_duration_seconds", "Handler latency by route")
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        &["route"]));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

/// Record one admission decision.
#[inline]
pub fn record_admission(namespace: &str, allowed: bool) {
    let metric = if allowed { &ADMITTED } else { &RATE_LIMITED };
    if let Some(c) = metric.get() {
        c.with_label_values(&[namespace]).inc();
    }
}

#[inline]
pub fn set_rate_buckets(count: usize) {
    if let Some(g) = RATE_BUCKETS.get() {
        g.set(i64::try_from(count).unwrap_or(i64::MAX));
    }
}

#[inline]
pub fn record_token_issued() {
    if let Some(c) = TOKENS_ISSUED.get() {
        c.inc();
    }
}

#[inline]
pub fn record_token_rejection(reason: &str) {
    if let Some(c) = TOKEN_REJECTIONS.get() {
        c.with_label_values(&[reason]).inc();
    }
}

/// Record handler latency for a route.
#[inline]
pub fn record_request(route: &str, duration_secs: f64) {
    if let Some(h) = REQUEST_LATENCY.get() {
        h.with_label_values(&[route]).observe(duration_secs);
    }
}

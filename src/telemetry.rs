//! Telemetry utilities for request timing and tracing spans.

use std::time::Instant;

/// Guard for timing a handler and recording its latency.
///
/// Records latency when dropped.
pub struct RequestTimer {
    route: &'static str,
    start: Instant,
}

impl RequestTimer {
    /// Start timing a route.
    pub fn new(route: &'static str) -> Self {
        Self {
            route,
            start: Instant::now(),
        }
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        crate::metrics::record_request(self.route, duration);
    }
}

/// Standardized span constructors.
pub mod spans {
    use tracing::{Span, info_span};

    /// Create a span for one HTTP request.
    pub fn request(route: &str, client: &str) -> Span {
        info_span!("request", route = %route, client = %client)
    }

    /// Create a span for a request scoped to one report.
    pub fn report(route: &str, client: &str, report_id: &str) -> Span {
        info_span!("request", route = %route, client = %client, report = %report_id)
    }
}

//! reportgate - admission control and upload capability tokens for a
//! public report intake service.
//!
//! Anonymous callers may create reports (rate limited per client and
//! endpoint) and then attach evidence to the report they created using a
//! short-lived HMAC-signed upload token returned at creation time.

pub mod config;
pub mod error;
pub mod http;
pub mod metrics;
pub mod reports;
pub mod security;
pub mod state;
pub mod telemetry;

pub use config::Config;
pub use error::{ApiError, TokenError};
pub use security::{RateLimitDecision, RateLimitManager, UploadTokenService};
pub use state::AppState;

//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Core config structs, file loading and environment overrides
//! - [`security`]: Rate limit quotas and upload token settings
//! - [`validation`]: Startup checks (missing secret, non-positive values)

mod security;
mod types;
pub mod validation;

pub use security::{
    DEFAULT_CREATE_QUOTA, DEFAULT_EVIDENCE_QUOTA, RateLimitConfig, RateLimitRule, RateQuota,
    UploadTokenConfig, is_weak_secret,
};
pub use types::{Config, ConfigError, ServerConfig, env};
pub use validation::{ValidationError, ValidationWarning, validate};

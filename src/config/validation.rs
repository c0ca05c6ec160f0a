//! Configuration validation.
//!
//! Validates configuration at startup to catch deployment errors early.

use super::Config;
use super::security::is_weak_secret;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error(
        "upload_token.secret is required (set [upload_token].secret or REPORTGATE_UPLOAD_TOKEN_SECRET)"
    )]
    MissingUploadTokenSecret,
}

/// Non-fatal findings reported at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationWarning {
    WeakUploadTokenSecret,
    /// Configured value replaced by its default.
    NonPositiveValue(&'static str),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<Vec<ValidationWarning>, Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    match config.upload_token.secret() {
        None => errors.push(ValidationError::MissingUploadTokenSecret),
        Some(secret) if is_weak_secret(secret) => {
            warnings.push(ValidationWarning::WeakUploadTokenSecret)
        }
        Some(_) => {}
    }

    let rate_limits = &config.rate_limits;
    let numeric = [
        ("rate_limits.create.max_requests", rate_limits.create.max_requests),
        ("rate_limits.create.window_secs", rate_limits.create.window_secs),
        ("rate_limits.evidence.max_requests", rate_limits.evidence.max_requests),
        ("rate_limits.evidence.window_secs", rate_limits.evidence.window_secs),
        ("rate_limits.sweep_interval_secs", rate_limits.sweep_interval_secs),
        ("upload_token.ttl_secs", config.upload_token.ttl_secs),
    ];
    for (name, value) in numeric {
        if value.is_some_and(|v| v <= 0) {
            warnings.push(ValidationWarning::NonPositiveValue(name));
        }
    }

    if errors.is_empty() {
        Ok(warnings)
    } else {
        Err(errors)
    }
}

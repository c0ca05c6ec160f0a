//! Security module for reportgate.
//!
//! Provides the guards in front of the public report endpoints:
//! - **Client Identity**: proxy-header based caller resolution
//! - **Rate Limiting**: fixed-window admission control per namespace and client
//! - **Upload Tokens**: HMAC-SHA256 capability tokens for evidence uploads
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                  Security Module                     │
//! ├──────────────────┬──────────────────┬────────────────┤
//! │ Client Identity  │  Rate Limiting   │ Upload Tokens  │
//! │ X-Forwarded-For  │  DashMap window  │  HMAC-SHA256   │
//! │ X-Real-IP        │  lazy sweep      │  ct compare    │
//! └──────────────────┴──────────────────┴────────────────┘
//! ```

pub mod client_identity;
pub mod rate_limit;
pub mod upload_token;

pub use client_identity::{UNKNOWN_CLIENT, resolve_client_identity};
pub use rate_limit::{RateLimitDecision, RateLimitManager, RateLimitStats};
pub use upload_token::{
    DEFAULT_TOKEN_TTL, UploadTokenClaims, UploadTokenService, issue_token, issue_token_at,
    verify_token, verify_token_at,
};

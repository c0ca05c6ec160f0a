//! Upload capability tokens.
//!
//! A token grants one narrow permission: attaching evidence to the report
//! it was issued for, until it expires. It is not tied to any account.
//!
//! # Format
//!
//! ```text
//! base64url(json{"sub": <report id>, "exp": <unix secs>}) "." base64url(hmac_sha256(secret, payload))
//! ```
//!
//! Both halves use the URL-safe alphabet without padding. The payload is
//! encoded, not encrypted: anyone can read it, nobody without the secret
//! can forge it. It must never carry more than the subject and expiry.
//!
//! # Security Model
//!
//! - Signature is checked before the payload is decoded
//! - Signature comparison is constant time (`subtle`)
//! - A missing secret denies both issuance and verification
//! - Stateless: a valid token can be replayed until it expires
//! - One static secret; rotating it invalidates every outstanding token

use crate::error::TokenError;
use crate::metrics;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use std::time::Duration;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

/// Default lifetime of an upload token (30 minutes).
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

const SEPARATOR: char = '.';

/// Claims carried by a verified token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadTokenClaims {
    /// Public id of the report the token authorizes.
    #[serde(rename = "sub")]
    pub subject_id: String,
    /// Expiry as Unix seconds.
    #[serde(rename = "exp")]
    pub expires_at: i64,
}

/// HMAC-SHA256 over the encoded payload, base64url encoded.
fn sign(secret: &str, encoded_payload: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(encoded_payload.as_bytes());
    Some(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
}

fn secret_is_configured(secret: &str) -> bool {
    !secret.trim().is_empty()
}

/// Issue a token for `subject_id` valid for `ttl` from now.
///
/// Returns `None` when the subject is empty or the secret is unconfigured.
/// Callers treat `None` as "upload authorization unavailable".
pub fn issue_token(subject_id: &str, secret: &str, ttl: Duration) -> Option<String> {
    issue_token_at(subject_id, secret, ttl, Utc::now())
}

pub fn issue_token_at(
    subject_id: &str,
    secret: &str,
    ttl: Duration,
    now: DateTime<Utc>,
) -> Option<String> {
    if subject_id.is_empty() || !secret_is_configured(secret) {
        return None;
    }

    let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
    let claims = UploadTokenClaims {
        subject_id: subject_id.to_string(),
        expires_at: now.timestamp().saturating_add(ttl_secs),
    };

    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).ok()?);
    let signature = sign(secret, &payload)?;
    Some(format!("{payload}{SEPARATOR}{signature}"))
}

/// Verify that `token` authorizes action on `subject_id`.
pub fn verify_token(
    subject_id: &str,
    token: &str,
    secret: &str,
) -> Result<UploadTokenClaims, TokenError> {
    verify_token_at(subject_id, token, secret, Utc::now())
}

pub fn verify_token_at(
    subject_id: &str,
    token: &str,
    secret: &str,
    now: DateTime<Utc>,
) -> Result<UploadTokenClaims, TokenError> {
    if !secret_is_configured(secret) {
        return Err(TokenError::NotConfigured);
    }
    if subject_id.is_empty() || token.is_empty() {
        return Err(TokenError::MissingInput);
    }

    let (payload, signature) = token
        .split_once(SEPARATOR)
        .filter(|(p, s)| !p.is_empty() && !s.is_empty())
        .ok_or(TokenError::MalformedToken)?;

    let expected = sign(secret, payload).ok_or(TokenError::NotConfigured)?;
    let matches = expected.len() == signature.len()
        && bool::from(expected.as_bytes().ct_eq(signature.as_bytes()));
    if !matches {
        return Err(TokenError::BadSignature);
    }

    // Only signed bytes reach the decoder.
    let claims: UploadTokenClaims = URL_SAFE_NO_PAD
        .decode(payload)
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .filter(|c: &UploadTokenClaims| !c.subject_id.is_empty())
        .ok_or(TokenError::MalformedPayload)?;

    if claims.subject_id != subject_id {
        return Err(TokenError::SubjectMismatch);
    }
    if claims.expires_at <= now.timestamp() {
        return Err(TokenError::Expired);
    }

    Ok(claims)
}

/// Upload token issuer/verifier bound to the process-wide secret.
///
/// Holds no mutable state; safe to share and call concurrently.
#[derive(Clone)]
pub struct UploadTokenService {
    secret: Option<Zeroizing<String>>,
    ttl: Duration,
}

impl UploadTokenService {
    /// Blank secrets are treated as unconfigured.
    pub fn new(secret: Option<String>, ttl: Duration) -> Self {
        let secret = secret
            .filter(|s| secret_is_configured(s))
            .map(Zeroizing::new);
        Self { secret, ttl }
    }

    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn secret(&self) -> &str {
        self.secret.as_ref().map(|s| s.as_str()).unwrap_or("")
    }

    pub fn issue(&self, subject_id: &str) -> Option<String> {
        self.issue_at(subject_id, Utc::now())
    }

    pub fn issue_at(&self, subject_id: &str, now: DateTime<Utc>) -> Option<String> {
        if !self.is_configured() {
            warn!(subject = %subject_id, "upload token secret not configured; no token issued");
            return None;
        }
        let token = issue_token_at(subject_id, self.secret(), self.ttl, now);
        if token.is_some() {
            metrics::record_token_issued();
        }
        token
    }

    pub fn verify(
        &self,
        subject_id: &str,
        token: Option<&str>,
    ) -> Result<UploadTokenClaims, TokenError> {
        self.verify_at(subject_id, token, Utc::now())
    }

    pub fn verify_at(
        &self,
        subject_id: &str,
        token: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<UploadTokenClaims, TokenError> {
        let result = verify_token_at(subject_id, token.unwrap_or(""), self.secret(), now);
        if let Err(ref e) = result {
            if e.is_server_fault() {
                warn!(subject = %subject_id, reason = e.error_code(), "upload token verification unavailable");
            } else {
                debug!(subject = %subject_id, reason = e.error_code(), "upload token rejected");
            }
            metrics::record_token_rejection(e.error_code());
        }
        result
    }
}

impl fmt::Debug for UploadTokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadTokenService")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("ttl", &self.ttl)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    const SECRET: &str = "k";
    const TTL: Duration = Duration::from_secs(1800);

    fn flip_first_char(s: &str) -> String {
        let mut chars: Vec<char> = s.chars().collect();
        chars[0] = if chars[0] == 'A' { 'B' } else { 'A' };
        chars.into_iter().collect()
    }

    #[test]
    fn issue_then_verify_succeeds() {
        let token = issue_token("R-1", SECRET, TTL).unwrap();
        let claims = verify_token("R-1", &token, SECRET).unwrap();
        assert_eq!(claims.subject_id, "R-1");
    }

    #[test]
    fn expiry_is_issuance_plus_ttl() {
        let now = Utc::now();
        let token = issue_token_at("R-1", SECRET, TTL, now).unwrap();
        let claims = verify_token_at("R-1", &token, SECRET, now).unwrap();
        assert_eq!(claims.expires_at, now.timestamp() + 1800);
    }

    #[test]
    fn other_subject_is_rejected() {
        let token = issue_token("R-1", SECRET, TTL).unwrap();
        assert_eq!(
            verify_token("R-2", &token, SECRET),
            Err(TokenError::SubjectMismatch)
        );
    }

    #[test]
    fn past_expiry_is_rejected_with_valid_signature() {
        let issued = Utc::now() - TimeDelta::hours(2);
        let token = issue_token_at("R-1", SECRET, TTL, issued).unwrap();
        assert_eq!(
            verify_token("R-1", &token, SECRET),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn expiry_boundary_is_exclusive() {
        let now = Utc::now();
        let token = issue_token_at("R-1", SECRET, TTL, now).unwrap();
        let at_expiry = now + TimeDelta::seconds(1800);
        assert_eq!(
            verify_token_at("R-1", &token, SECRET, at_expiry),
            Err(TokenError::Expired)
        );
        let just_before = now + TimeDelta::seconds(1799);
        assert!(verify_token_at("R-1", &token, SECRET, just_before).is_ok());
    }

    #[test]
    fn flipped_signature_char_is_rejected() {
        let token = issue_token("R-1", SECRET, TTL).unwrap();
        let (payload, signature) = token.split_once('.').unwrap();
        let tampered = format!("{}.{}", payload, flip_first_char(signature));
        assert_eq!(
            verify_token("R-1", &tampered, SECRET),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let token = issue_token("R-1", SECRET, TTL).unwrap();
        let (_, signature) = token.split_once('.').unwrap();
        let forged_claims = UploadTokenClaims {
            subject_id: "R-1".to_string(),
            expires_at: i64::MAX,
        };
        let forged = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged_claims).unwrap());
        let tampered = format!("{}.{}", forged, signature);
        assert_eq!(
            verify_token("R-1", &tampered, SECRET),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = issue_token("R-1", SECRET, TTL).unwrap();
        assert_eq!(
            verify_token("R-1", &token, "other"),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn missing_secret_denies_everything() {
        assert!(issue_token("R-1", "", TTL).is_none());
        assert!(issue_token("R-1", "   ", TTL).is_none());

        let token = issue_token("R-1", SECRET, TTL).unwrap();
        assert_eq!(verify_token("R-1", &token, ""), Err(TokenError::NotConfigured));
        assert_eq!(verify_token("", "", ""), Err(TokenError::NotConfigured));
    }

    #[test]
    fn missing_subject_or_token() {
        assert!(issue_token("", SECRET, TTL).is_none());
        assert_eq!(verify_token("R-1", "", SECRET), Err(TokenError::MissingInput));
        assert_eq!(verify_token("", "a.b", SECRET), Err(TokenError::MissingInput));
    }

    #[test]
    fn structure_without_separator_is_malformed() {
        for token in ["nodot", ".sig", "payload.", "."] {
            assert_eq!(
                verify_token("R-1", token, SECRET),
                Err(TokenError::MalformedToken),
                "token {token:?}"
            );
        }
    }

    #[test]
    fn signed_garbage_payload_is_malformed_payload() {
        let wrong_types = URL_SAFE_NO_PAD.encode(br#"{"sub":1,"exp":"soon"}"#);
        let not_base64 = "***".to_string();
        let empty_subject = URL_SAFE_NO_PAD.encode(br#"{"sub":"","exp":9999999999}"#);

        for payload in [wrong_types, not_base64, empty_subject] {
            let token = format!("{}.{}", payload, sign(SECRET, &payload).unwrap());
            assert_eq!(
                verify_token("R-1", &token, SECRET),
                Err(TokenError::MalformedPayload)
            );
        }
    }

    #[test]
    fn payload_is_readable_but_carries_only_subject_and_expiry() {
        let token = issue_token("R-1", SECRET, TTL).unwrap();
        let (payload, _) = token.split_once('.').unwrap();
        let json: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload).unwrap()).unwrap();
        let object = json.as_object().unwrap();
        assert_eq!(object.len(), 2);
        assert_eq!(object["sub"], "R-1");
        assert!(object["exp"].is_i64());
    }

    #[test]
    fn service_without_secret_denies() {
        let service = UploadTokenService::new(None, TTL);
        assert!(!service.is_configured());
        assert!(service.issue("R-1").is_none());
        assert_eq!(
            service.verify("R-1", Some("a.b")),
            Err(TokenError::NotConfigured)
        );

        let blank = UploadTokenService::new(Some("  ".to_string()), TTL);
        assert!(!blank.is_configured());
    }

    #[test]
    fn service_round_trip_and_missing_token() {
        let service = UploadTokenService::new(Some("service-secret".to_string()), TTL);
        let token = service.issue("R-9").unwrap();
        assert!(service.verify("R-9", Some(&token)).is_ok());
        assert_eq!(service.verify("R-9", None), Err(TokenError::MissingInput));
    }

    #[test]
    fn service_debug_redacts_secret() {
        let service = UploadTokenService::new(Some("super-secret-value".to_string()), TTL);
        let debug = format!("{:?}", service);
        assert!(!debug.contains("super-secret-value"));
        assert!(debug.contains("redacted"));
    }
}

/// Token issuance and refresh
///
/// Mints short-lived signed access tokens paired with long-lived opaque
/// refresh tokens, and drives rotation and revocation against the session
/// store.

mod issuer;

pub use issuer::TokenIssuer;

use crate::error::{AuthError, AuthResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Audience claim stamped into every access token
pub const TOKEN_AUDIENCE: &str = "gidipin";

/// Claims carried by an access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (user id)
    pub sub: String,
    /// Session id
    pub sid: String,
    /// Audience
    pub aud: String,
    /// Issued-at (unix seconds)
    pub iat: i64,
    /// Expiry (unix seconds)
    pub exp: i64,
}

/// Access + refresh token pair returned by issue/refresh
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub user_id: String,
}

/// Client metadata captured when a session is established
#[derive(Debug, Clone, Default)]
pub struct ClientMeta {
    pub device_info: Option<String>,
    pub ip_address: Option<String>,
}

/// When to replace the refresh token value on a refresh call.
///
/// Rotation limits the blast radius of a leaked refresh token over time
/// without forcing it on every call, which would break concurrent clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationPolicy {
    /// Never rotate
    Never,
    /// Rotate on every Nth refresh
    EveryNth(u64),
    /// Rotate once the current token value is older than the given age
    MaxAge(Duration),
}

impl RotationPolicy {
    /// Parse a config selector: "never", "every_nth:<n>", "max_age:<secs>"
    pub fn parse(s: &str) -> AuthResult<Self> {
        if s == "never" {
            return Ok(RotationPolicy::Never);
        }
        if let Some(n) = s.strip_prefix("every_nth:") {
            let n: u64 = n
                .parse()
                .map_err(|_| AuthError::Validation(format!("Invalid rotation policy: {}", s)))?;
            if n == 0 {
                return Err(AuthError::Validation(
                    "Rotation interval must be at least 1".to_string(),
                ));
            }
            return Ok(RotationPolicy::EveryNth(n));
        }
        if let Some(secs) = s.strip_prefix("max_age:") {
            let secs: u64 = secs
                .parse()
                .map_err(|_| AuthError::Validation(format!("Invalid rotation policy: {}", s)))?;
            return Ok(RotationPolicy::MaxAge(Duration::from_secs(secs)));
        }
        Err(AuthError::Validation(format!(
            "Unknown rotation policy: {}",
            s
        )))
    }

    /// Decide whether the refresh now being processed should rotate the
    /// token. `refresh_count` is the count including the current call;
    /// `token_minted_at` is when the current token value was created.
    pub fn should_rotate(
        &self,
        refresh_count: u64,
        token_minted_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> bool {
        match self {
            RotationPolicy::Never => false,
            RotationPolicy::EveryNth(n) => refresh_count % n == 0,
            RotationPolicy::MaxAge(age) => {
                let elapsed = (now - token_minted_at).to_std().unwrap_or_default();
                elapsed >= *age
            }
        }
    }
}

/// Decode an access token's claims WITHOUT verifying the signature.
///
/// Client-side only: the client reads `exp`/`sub` for scheduling and never
/// holds the signing secret. Servers must use
/// `TokenIssuer::verify_access_token` instead.
pub fn decode_claims_unverified(token: &str) -> AuthResult<AccessClaims> {
    use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;

    let data = decode::<AccessClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map_err(|e| AuthError::InvalidTokenFormat(e.to_string()))?;

    Ok(data.claims)
}

/// Authentication middleware and request metadata extraction
use crate::{
    context::AppContext,
    error::{AuthError, AuthResult},
    token::{AccessClaims, ClientMeta},
};
use axum::http::HeaderMap;

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer ").map(|t| t.to_string()))
}

/// Require a valid access token; returns the verified claims
pub fn require_auth(ctx: &AppContext, headers: &HeaderMap) -> AuthResult<AccessClaims> {
    let token = extract_bearer_token(headers)
        .ok_or_else(|| AuthError::Authentication("Missing authorization header".to_string()))?;

    ctx.token_issuer.verify_access_token(&token)
}

/// Capture device and network metadata for the session record
pub fn client_meta(headers: &HeaderMap) -> ClientMeta {
    let device_info = headers
        .get("user-agent")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string());

    let ip_address = ["x-forwarded-for", "x-real-ip"]
        .iter()
        .find_map(|name| headers.get(*name).and_then(|h| h.to_str().ok()))
        .map(|s| s.split(',').next().unwrap_or(s).trim().to_string());

    ClientMeta {
        device_info,
        ip_address,
    }
}

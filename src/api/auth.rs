/// Auth endpoints: token refresh, logout, verification codes, PIN
use crate::{
    api::middleware,
    context::AppContext,
    error::AuthResult,
    token::TokenPair,
};
use axum::{
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

/// Build auth routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/auth/refresh", post(refresh_session))
        .route("/auth/logout", post(logout))
        .route("/auth/code/send", post(send_code))
        .route("/auth/code/verify", post(verify_code))
        .route("/auth/pin/set", post(set_pin))
        .route("/auth/pin/verify", post(verify_pin))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest {
    refresh_token: String,
}

/// Exchange a refresh token for a new pair
async fn refresh_session(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(req): Json<RefreshRequest>,
) -> AuthResult<Json<TokenPair>> {
    let meta = middleware::client_meta(&headers);

    let pair = match ctx.token_issuer.refresh(&req.refresh_token).await {
        Ok(pair) => pair,
        Err(e) => {
            ctx.audit
                .record(None, "session_refresh", "failure", meta.ip_address.as_deref(), None)
                .await;
            return Err(e);
        }
    };

    ctx.audit
        .record(
            Some(&pair.user_id),
            "session_refresh",
            "success",
            meta.ip_address.as_deref(),
            None,
        )
        .await;

    Ok(Json(pair))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogoutRequest {
    refresh_token: String,
}

/// Revoke a session (logout)
async fn logout(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(req): Json<LogoutRequest>,
) -> AuthResult<Json<serde_json::Value>> {
    let meta = middleware::client_meta(&headers);

    ctx.token_issuer.revoke(&req.refresh_token).await?;

    ctx.audit
        .record(None, "session_revoke", "success", meta.ip_address.as_deref(), None)
        .await;

    Ok(Json(json!({})))
}

#[derive(Debug, Deserialize)]
struct SendCodeRequest {
    identifier: String,
}

/// Issue a verification code for an email or phone identifier
async fn send_code(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(req): Json<SendCodeRequest>,
) -> AuthResult<Json<serde_json::Value>> {
    let meta = middleware::client_meta(&headers);

    ctx.code_engine.send_code(&req.identifier).await?;

    ctx.audit
        .record(None, "code_send", "success", meta.ip_address.as_deref(), None)
        .await;

    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
struct VerifyCodeRequest {
    identifier: String,
    code: String,
}

/// Consume a verification code
async fn verify_code(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(req): Json<VerifyCodeRequest>,
) -> AuthResult<Json<serde_json::Value>> {
    let meta = middleware::client_meta(&headers);

    match ctx.code_engine.verify_code(&req.identifier, &req.code).await {
        Ok(()) => {
            ctx.audit
                .record(None, "code_verify", "success", meta.ip_address.as_deref(), None)
                .await;
            Ok(Json(json!({ "success": true })))
        }
        Err(e) => {
            ctx.audit
                .record(None, "code_verify", "failure", meta.ip_address.as_deref(), None)
                .await;
            Err(e)
        }
    }
}

#[derive(Debug, Deserialize)]
struct SetPinRequest {
    pin: String,
}

/// Store the authenticated user's PIN
async fn set_pin(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(req): Json<SetPinRequest>,
) -> AuthResult<Json<serde_json::Value>> {
    let claims = middleware::require_auth(&ctx, &headers)?;
    let meta = middleware::client_meta(&headers);

    ctx.pin_guard.set_pin(&claims.sub, &req.pin).await?;

    ctx.audit
        .record(
            Some(&claims.sub),
            "pin_set",
            "success",
            meta.ip_address.as_deref(),
            None,
        )
        .await;

    Ok(Json(json!({})))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyPinRequest {
    user_id: String,
    pin: String,
}

/// Verify a PIN and issue a token pair on success
async fn verify_pin(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(req): Json<VerifyPinRequest>,
) -> AuthResult<Json<TokenPair>> {
    let meta = middleware::client_meta(&headers);

    match ctx.pin_guard.verify_pin(&req.user_id, &req.pin, &meta).await {
        Ok(pair) => {
            ctx.audit
                .record(
                    Some(&req.user_id),
                    "pin_verify",
                    "success",
                    meta.ip_address.as_deref(),
                    None,
                )
                .await;
            Ok(Json(pair))
        }
        Err(e) => {
            ctx.audit
                .record(
                    Some(&req.user_id),
                    "pin_verify",
                    "failure",
                    meta.ip_address.as_deref(),
                    None,
                )
                .await;
            Err(e)
        }
    }
}

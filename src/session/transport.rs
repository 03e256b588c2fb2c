/// Refresh exchange transport
use crate::error::{AuthError, AuthResult};
use crate::token::TokenPair;
use async_trait::async_trait;

/// Server call that exchanges a refresh token for a new pair
#[async_trait]
pub trait RefreshTransport: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenPair>;
}

/// HTTP transport posting to the refresh endpoint
pub struct HttpRefreshTransport {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRefreshTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl RefreshTransport for HttpRefreshTransport {
    async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenPair> {
        let url = format!("{}/auth/refresh", self.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "refreshToken": refresh_token }))
            .send()
            .await
            .map_err(|e| AuthError::Internal(format!("Refresh request failed: {}", e)))?;

        if response.status().is_success() {
            return response
                .json::<TokenPair>()
                .await
                .map_err(|e| AuthError::Internal(format!("Malformed refresh response: {}", e)));
        }

        let status = response.status();
        let body: serde_json::Value = response.json().await.unwrap_or_default();
        let code = body.get("error").and_then(|v| v.as_str()).unwrap_or("");

        match code {
            "REFRESH_TOKEN_EXPIRED" => Err(AuthError::RefreshTokenExpired),
            "INVALID_REFRESH_TOKEN" => Err(AuthError::InvalidRefreshToken),
            _ => Err(AuthError::Internal(format!(
                "Refresh endpoint returned {}",
                status
            ))),
        }
    }
}

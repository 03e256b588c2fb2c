/// Token issuer: access/refresh pair minting, refresh exchange, rotation,
/// revocation
use crate::{
    config::ServiceConfig,
    db::models::SessionRecord,
    error::{AuthError, AuthResult},
    token::{AccessClaims, ClientMeta, RotationPolicy, TokenPair, TOKEN_AUDIENCE},
};
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

/// Token issuer service
pub struct TokenIssuer {
    db: SqlitePool,
    config: Arc<ServiceConfig>,
    rotation: RotationPolicy,
}

impl TokenIssuer {
    /// Create a new token issuer
    pub fn new(db: SqlitePool, config: Arc<ServiceConfig>, rotation: RotationPolicy) -> Self {
        Self {
            db,
            config,
            rotation,
        }
    }

    /// Mint a new access/refresh pair for a user and persist the session
    /// record
    pub async fn issue(&self, user_id: &str, meta: &ClientMeta) -> AuthResult<TokenPair> {
        let session_id = Uuid::new_v4().to_string();
        let (access_token, expires_at) = self.generate_access_token(user_id, &session_id)?;
        let refresh_token = generate_refresh_token();

        let now = Utc::now();
        let refresh_expires =
            now + Duration::seconds(self.config.auth.refresh_token_ttl_secs as i64);

        sqlx::query(
            "INSERT INTO auth_session (id, user_id, refresh_token, refresh_token_expires_at,
                                       device_info, ip_address, is_active, refresh_count,
                                       token_rotated_at, last_refreshed_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, 0, NULL, NULL, ?7, ?7)",
        )
        .bind(&session_id)
        .bind(user_id)
        .bind(&refresh_token)
        .bind(refresh_expires)
        .bind(&meta.device_info)
        .bind(&meta.ip_address)
        .bind(now)
        .execute(&self.db)
        .await
        .map_err(AuthError::Database)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_at,
            user_id: user_id.to_string(),
        })
    }

    /// Exchange a refresh token for a fresh access token, rotating the
    /// refresh token when the policy says so
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenPair> {
        let now = Utc::now();

        // Inactive rows are filtered here so a revoked token reads the same
        // as an unknown one.
        let record: SessionRecord = sqlx::query_as(
            "SELECT id, user_id, refresh_token, refresh_token_expires_at, device_info,
                    ip_address, is_active, refresh_count, token_rotated_at,
                    last_refreshed_at, created_at, updated_at
             FROM auth_session WHERE refresh_token = ?1 AND is_active = 1",
        )
        .bind(refresh_token)
        .fetch_optional(&self.db)
        .await
        .map_err(AuthError::Database)?
        .ok_or(AuthError::InvalidRefreshToken)?;

        if now > record.refresh_token_expires_at {
            // Expiry permanently retires the row; the next attempt with this
            // token is indistinguishable from not-found.
            sqlx::query(
                "UPDATE auth_session SET is_active = 0, updated_at = ?1 WHERE refresh_token = ?2",
            )
            .bind(now)
            .bind(refresh_token)
            .execute(&self.db)
            .await
            .map_err(AuthError::Database)?;

            return Err(AuthError::RefreshTokenExpired);
        }

        let (access_token, expires_at) = self.generate_access_token(&record.user_id, &record.id)?;

        let new_count = record.refresh_count + 1;
        let token_minted_at = record.token_rotated_at.unwrap_or(record.created_at);
        let rotate = self
            .rotation
            .should_rotate(new_count as u64, token_minted_at, now);

        let current_refresh = if rotate {
            let new_refresh = generate_refresh_token();

            // Compare-and-set on the old token value: if a concurrent
            // refresh rotated first, zero rows match and this call loses.
            let result = sqlx::query(
                "UPDATE auth_session
                 SET refresh_token = ?1, refresh_count = ?2, token_rotated_at = ?3,
                     last_refreshed_at = ?3, updated_at = ?3
                 WHERE refresh_token = ?4 AND is_active = 1",
            )
            .bind(&new_refresh)
            .bind(new_count)
            .bind(now)
            .bind(refresh_token)
            .execute(&self.db)
            .await
            .map_err(AuthError::Database)?;

            if result.rows_affected() == 0 {
                return Err(AuthError::InvalidRefreshToken);
            }

            tracing::debug!(session_id = %record.id, "Rotated refresh token");
            new_refresh
        } else {
            let result = sqlx::query(
                "UPDATE auth_session
                 SET refresh_count = ?1, last_refreshed_at = ?2, updated_at = ?2
                 WHERE refresh_token = ?3 AND is_active = 1",
            )
            .bind(new_count)
            .bind(now)
            .bind(refresh_token)
            .execute(&self.db)
            .await
            .map_err(AuthError::Database)?;

            if result.rows_affected() == 0 {
                return Err(AuthError::InvalidRefreshToken);
            }

            refresh_token.to_string()
        };

        Ok(TokenPair {
            access_token,
            refresh_token: current_refresh,
            expires_at,
            user_id: record.user_id,
        })
    }

    /// Revoke a session by refresh token (logout). Idempotent; revoking an
    /// unknown token is a no-op.
    pub async fn revoke(&self, refresh_token: &str) -> AuthResult<()> {
        sqlx::query(
            "UPDATE auth_session SET is_active = 0, updated_at = ?1 WHERE refresh_token = ?2",
        )
        .bind(Utc::now())
        .bind(refresh_token)
        .execute(&self.db)
        .await
        .map_err(AuthError::Database)?;

        Ok(())
    }

    /// Verify an access token's signature and claims (server side)
    pub fn verify_access_token(&self, token: &str) -> AuthResult<AccessClaims> {
        use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

        let decoding_key = DecodingKey::from_secret(self.config.auth.jwt_secret.as_bytes());
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[TOKEN_AUDIENCE]);
        // Allow some clock skew (5 minutes)
        validation.leeway = 300;

        decode::<AccessClaims>(token, &decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::warn!("Access token verification failed: {}", e);
                match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                        AuthError::Authentication("Token has expired".to_string())
                    }
                    jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                        AuthError::Authentication("Invalid token signature".to_string())
                    }
                    _ => AuthError::Authentication(format!("Invalid token: {}", e)),
                }
            })
    }

    /// Flip expired sessions inactive. Rows are retained for audit; only the
    /// flag changes. Returns the number of sessions retired.
    pub async fn deactivate_expired_sessions(&self) -> AuthResult<u64> {
        let now = Utc::now();

        let result = sqlx::query(
            "UPDATE auth_session SET is_active = 0, updated_at = ?1
             WHERE is_active = 1 AND refresh_token_expires_at < ?1",
        )
        .bind(now)
        .execute(&self.db)
        .await
        .map_err(AuthError::Database)?;

        Ok(result.rows_affected())
    }

    /// Generate a signed access token; expiry is derived back from the
    /// claim so client and server views cannot diverge
    fn generate_access_token(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> AuthResult<(String, DateTime<Utc>)> {
        use jsonwebtoken::{encode, EncodingKey, Header};

        let now = Utc::now().timestamp();
        let exp = now + self.config.auth.access_token_ttl_secs as i64;
        let claims = AccessClaims {
            sub: user_id.to_string(),
            sid: session_id.to_string(),
            aud: TOKEN_AUDIENCE.to_string(),
            iat: now,
            exp,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.config.auth.jwt_secret.as_bytes()),
        )
        .map_err(|e| AuthError::Jwt(format!("Failed to generate token: {}", e)))?;

        let expires_at = DateTime::from_timestamp(exp, 0)
            .ok_or_else(|| AuthError::Internal("Token expiry out of range".to_string()))?;

        Ok((token, expires_at))
    }
}

/// Generate an opaque refresh token: 32 random bytes, hex-encoded
fn generate_refresh_token() -> String {
    use rand::RngCore;

    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

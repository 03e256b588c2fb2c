/// PIN verification gated by a failed-attempt counter and lockout window
use crate::{
    config::ServiceConfig,
    db::models::PinCredential,
    error::{AuthError, AuthResult},
    token::{ClientMeta, TokenIssuer, TokenPair},
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;

/// PIN lockout guard service
pub struct PinGuard {
    db: SqlitePool,
    config: Arc<ServiceConfig>,
    issuer: Arc<TokenIssuer>,
}

impl PinGuard {
    /// Create a new PIN guard
    pub fn new(db: SqlitePool, config: Arc<ServiceConfig>, issuer: Arc<TokenIssuer>) -> Self {
        Self { db, config, issuer }
    }

    /// Store (or replace) a user's PIN. Replacing a PIN clears any counter
    /// and lock.
    pub async fn set_pin(&self, user_id: &str, pin: &str) -> AuthResult<()> {
        validate_pin(pin)?;

        let pin_hash = hash_pin(pin)?;
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO pin_credential (user_id, pin_hash, failed_attempts, locked_until, created_at, updated_at)
             VALUES (?1, ?2, 0, NULL, ?3, ?3)
             ON CONFLICT(user_id) DO UPDATE SET
                 pin_hash = excluded.pin_hash,
                 failed_attempts = 0,
                 locked_until = NULL,
                 updated_at = excluded.updated_at",
        )
        .bind(user_id)
        .bind(&pin_hash)
        .bind(now)
        .execute(&self.db)
        .await
        .map_err(AuthError::Database)?;

        Ok(())
    }

    /// Verify a submitted PIN and, on success, issue a token pair.
    ///
    /// The lock check runs before any hash comparison, so a locked account
    /// never reveals whether the submitted PIN was correct.
    pub async fn verify_pin(
        &self,
        user_id: &str,
        submitted: &str,
        meta: &ClientMeta,
    ) -> AuthResult<TokenPair> {
        let now = Utc::now();

        let credential: PinCredential = sqlx::query_as(
            "SELECT user_id, pin_hash, failed_attempts, locked_until, created_at, updated_at
             FROM pin_credential WHERE user_id = ?1",
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await
        .map_err(AuthError::Database)?
        // An unknown user reads the same as a wrong PIN
        .ok_or(AuthError::IncorrectPin)?;

        if let Some(locked_until) = credential.locked_until {
            if now < locked_until {
                let retry_after = (locked_until - now).to_std().unwrap_or_default();
                return Err(AuthError::AccountLocked { retry_after });
            }
        }

        if !verify_pin_hash(submitted, &credential.pin_hash) {
            self.record_failure(user_id, now).await?;
            return Err(AuthError::IncorrectPin);
        }

        // Success resets the counter and clears an expired lock
        sqlx::query(
            "UPDATE pin_credential SET failed_attempts = 0, locked_until = NULL, updated_at = ?1
             WHERE user_id = ?2",
        )
        .bind(now)
        .bind(user_id)
        .execute(&self.db)
        .await
        .map_err(AuthError::Database)?;

        self.issuer.issue(user_id, meta).await
    }

    /// Increment the failure counter and set the lock when the threshold is
    /// reached. One statement so concurrent failures cannot under-count.
    async fn record_failure(&self, user_id: &str, now: DateTime<Utc>) -> AuthResult<()> {
        let locked_until = now + Duration::seconds(self.config.pin.lockout_secs as i64);

        sqlx::query(
            "UPDATE pin_credential
             SET failed_attempts = failed_attempts + 1,
                 locked_until = CASE
                     WHEN failed_attempts + 1 >= ?1 THEN ?2
                     ELSE locked_until
                 END,
                 updated_at = ?3
             WHERE user_id = ?4",
        )
        .bind(self.config.pin.max_failed_attempts as i64)
        .bind(locked_until)
        .bind(now)
        .bind(user_id)
        .execute(&self.db)
        .await
        .map_err(AuthError::Database)?;

        tracing::info!("Failed PIN attempt recorded for {}", user_id);
        Ok(())
    }
}

/// PIN shape: 4 to 8 ASCII digits
fn validate_pin(pin: &str) -> AuthResult<()> {
    if !(4..=8).contains(&pin.len()) || !pin.chars().all(|c| c.is_ascii_digit()) {
        return Err(AuthError::Validation(
            "PIN must be 4 to 8 digits".to_string(),
        ));
    }
    Ok(())
}

/// Hash a PIN with Argon2id
fn hash_pin(pin: &str) -> AuthResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(pin.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AuthError::Internal(format!("PIN hashing failed: {}", e)))
}

/// Verify a PIN against its stored hash. An unparseable stored hash reads
/// as a mismatch.
fn verify_pin_hash(pin: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(pin.as_bytes(), &parsed)
        .is_ok()
}

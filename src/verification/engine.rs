/// Verification code generation, rate limiting, and single-use consumption
use crate::{
    config::ServiceConfig,
    db::models::VerificationCode,
    delivery::CodeDelivery,
    error::{AuthError, AuthResult},
};
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

/// Verification-code engine service
pub struct CodeEngine {
    db: SqlitePool,
    config: Arc<ServiceConfig>,
    delivery: Arc<dyn CodeDelivery>,
}

impl CodeEngine {
    /// Create a new code engine
    pub fn new(
        db: SqlitePool,
        config: Arc<ServiceConfig>,
        delivery: Arc<dyn CodeDelivery>,
    ) -> Self {
        Self {
            db,
            config,
            delivery,
        }
    }

    /// Issue a code for an identifier, enforcing the per-identifier
    /// cooldown. Delivery failure does not fail issuance; the code row
    /// exists either way.
    pub async fn send_code(&self, identifier: &str) -> AuthResult<()> {
        let identifier = normalize_identifier(identifier)?;
        let now = Utc::now();
        let cooldown = Duration::seconds(self.config.verification.cooldown_secs as i64);
        let window_start = now - cooldown;

        let code = generate_code();
        let id = Uuid::new_v4().to_string();
        let expires_at = now + Duration::seconds(self.config.verification.code_ttl_secs as i64);

        // Guarded insert: the row only lands when no issuance for this
        // identifier is younger than the cooldown window. Concurrent calls
        // serialize in the store, so exactly one can win.
        let result = sqlx::query(
            "INSERT INTO verification_code (id, identifier, code, expires_at, used_at, status, sent_at, created_at)
             SELECT ?1, ?2, ?3, ?4, NULL, 'pending', NULL, ?5
             WHERE NOT EXISTS (
                 SELECT 1 FROM verification_code WHERE identifier = ?2 AND created_at > ?6
             )",
        )
        .bind(&id)
        .bind(&identifier)
        .bind(&code)
        .bind(expires_at)
        .bind(now)
        .bind(window_start)
        .execute(&self.db)
        .await
        .map_err(AuthError::Database)?;

        if result.rows_affected() == 0 {
            let retry_after = self.remaining_cooldown(&identifier, now, cooldown).await?;
            return Err(AuthError::CodeCooldown { retry_after });
        }

        match self.delivery.deliver(&identifier, &code).await {
            Ok(()) => {
                sqlx::query("UPDATE verification_code SET sent_at = ?1 WHERE id = ?2")
                    .bind(Utc::now())
                    .bind(&id)
                    .execute(&self.db)
                    .await
                    .map_err(AuthError::Database)?;
            }
            Err(e) => {
                // Non-fatal: the code is issued and can be re-delivered
                tracing::warn!("Code delivery to {} failed: {}", identifier, e);
            }
        }

        tracing::info!("Issued verification code for {}", identifier);
        Ok(())
    }

    /// Verify a submitted code. Wrong, expired, and already-used codes all
    /// fail with the same error.
    pub async fn verify_code(&self, identifier: &str, submitted: &str) -> AuthResult<()> {
        let identifier = normalize_identifier(identifier)?;
        let now = Utc::now();

        // Most recent live code matching the submission exactly
        let record: VerificationCode = sqlx::query_as(
            "SELECT id, identifier, code, expires_at, used_at, status, sent_at, created_at
             FROM verification_code
             WHERE identifier = ?1 AND code = ?2 AND used_at IS NULL AND expires_at > ?3
             ORDER BY created_at DESC
             LIMIT 1",
        )
        .bind(&identifier)
        .bind(submitted)
        .bind(now)
        .fetch_optional(&self.db)
        .await
        .map_err(AuthError::Database)?
        .ok_or(AuthError::InvalidCode)?;

        // Consumption is conditional on the row still being unused, so two
        // concurrent submissions of the same code cannot both succeed.
        let result = sqlx::query(
            "UPDATE verification_code SET used_at = ?1, status = 'verified'
             WHERE id = ?2 AND used_at IS NULL",
        )
        .bind(now)
        .bind(&record.id)
        .execute(&self.db)
        .await
        .map_err(AuthError::Database)?;

        if result.rows_affected() == 0 {
            return Err(AuthError::InvalidCode);
        }

        tracing::info!("Verification code accepted for {}", identifier);
        Ok(())
    }

    /// Delete code rows older than the retention window. Used rows go once
    /// both their expiry and consumption are past the cutoff.
    pub async fn cleanup_expired_codes(&self) -> AuthResult<u64> {
        let cutoff = Utc::now() - Duration::days(self.config.verification.retention_days as i64);

        let result = sqlx::query(
            "DELETE FROM verification_code
             WHERE expires_at < ?1 AND (used_at IS NULL OR used_at < ?1)",
        )
        .bind(cutoff)
        .execute(&self.db)
        .await
        .map_err(AuthError::Database)?;

        Ok(result.rows_affected())
    }

    /// Seconds left until the identifier may be issued a new code
    async fn remaining_cooldown(
        &self,
        identifier: &str,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> AuthResult<std::time::Duration> {
        let latest: Option<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT MAX(created_at) FROM verification_code WHERE identifier = ?1",
        )
        .bind(identifier)
        .fetch_one(&self.db)
        .await
        .map_err(AuthError::Database)?;

        let remaining = latest
            .map(|at| (at + cooldown) - now)
            .unwrap_or_else(Duration::zero);

        Ok(remaining.to_std().unwrap_or_default())
    }
}

/// Generate a fixed-width 6-digit code, uniform in [100000, 999999]
fn generate_code() -> String {
    use rand::Rng;

    rand::thread_rng().gen_range(100_000..=999_999).to_string()
}

/// Lowercase and validate an email or phone identifier
fn normalize_identifier(identifier: &str) -> AuthResult<String> {
    let identifier = identifier.trim().to_lowercase();

    if identifier.is_empty() {
        return Err(AuthError::Validation("Identifier required".to_string()));
    }

    if identifier.contains('@') {
        use validator::ValidateEmail;
        if !identifier.validate_email() {
            return Err(AuthError::Validation("Invalid email address".to_string()));
        }
    } else if !is_phone_number(&identifier) {
        return Err(AuthError::Validation(
            "Invalid phone number format".to_string(),
        ));
    }

    Ok(identifier)
}

/// Phone shape: optional leading +, then 8-15 digits not starting with 0
fn is_phone_number(s: &str) -> bool {
    let digits = s.strip_prefix('+').unwrap_or(s);
    (8..=15).contains(&digits.len())
        && digits.chars().all(|c| c.is_ascii_digit())
        && !digits.starts_with('0')
}

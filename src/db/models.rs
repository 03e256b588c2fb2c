/// Persisted row models
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Server-side session record, keyed by refresh token
///
/// Rows are never deleted: revocation and expiry flip `is_active` so the
/// audit trail survives. `refresh_count` drives the every-Nth rotation
/// policy.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub user_id: String,
    pub refresh_token: String,
    pub refresh_token_expires_at: DateTime<Utc>,
    pub device_info: Option<String>,
    pub ip_address: Option<String>,
    pub is_active: bool,
    pub refresh_count: i64,
    /// When the refresh token value was last replaced; NULL until the first
    /// rotation
    pub token_rotated_at: Option<DateTime<Utc>>,
    pub last_refreshed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Single-use verification code bound to an email or phone identifier
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct VerificationCode {
    pub id: String,
    pub identifier: String,
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub status: String, // "pending" or "verified"
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// PIN credential with failed-attempt counter and lockout window
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PinCredential {
    pub user_id: String,
    pub pin_hash: String,
    pub failed_attempts: i64,
    pub locked_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Auth event audit row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub user_id: Option<String>,
    pub action: String,
    pub outcome: String,
    pub ip_address: Option<String>,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

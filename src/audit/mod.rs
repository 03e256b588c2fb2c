/// Auth event audit trail
///
/// Best-effort: a failed audit write is logged and swallowed, never
/// surfaced to the guarded operation.
use chrono::Utc;
use sqlx::SqlitePool;

/// Audit log service
#[derive(Clone)]
pub struct AuditLog {
    db: SqlitePool,
}

impl AuditLog {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Record an auth event
    pub async fn record(
        &self,
        user_id: Option<&str>,
        action: &str,
        outcome: &str,
        ip_address: Option<&str>,
        detail: Option<&str>,
    ) {
        let result = sqlx::query(
            "INSERT INTO auth_audit (user_id, action, outcome, ip_address, detail, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(user_id)
        .bind(action)
        .bind(outcome)
        .bind(ip_address)
        .bind(detail)
        .bind(Utc::now())
        .execute(&self.db)
        .await;

        if let Err(e) = result {
            tracing::warn!("Failed to record audit event {}: {}", action, e);
        }
    }
}

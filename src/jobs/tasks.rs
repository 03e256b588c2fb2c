/// Background task implementations
use crate::{context::AppContext, error::AuthResult};

/// Flip expired sessions inactive. Rows stay for the audit trail.
pub async fn retire_expired_sessions(ctx: &AppContext) -> AuthResult<u64> {
    ctx.token_issuer.deactivate_expired_sessions().await
}

/// Delete verification codes past the retention window
pub async fn sweep_verification_codes(ctx: &AppContext) -> AuthResult<u64> {
    ctx.code_engine.cleanup_expired_codes().await
}

/// Health check - verify the store is reachable
pub async fn health_check(ctx: &AppContext) -> AuthResult<()> {
    sqlx::query("SELECT 1").fetch_one(&ctx.db).await?;

    Ok(())
}

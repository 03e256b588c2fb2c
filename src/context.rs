/// Application context and dependency injection
use crate::{
    audit::AuditLog,
    config::ServiceConfig,
    db,
    delivery::{DeliveryRouter, Mailer, SmsGateway},
    error::AuthResult,
    pin::PinGuard,
    rate_limit::RateLimiter,
    token::{RotationPolicy, TokenIssuer},
    verification::CodeEngine,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServiceConfig>,
    pub db: SqlitePool,
    pub token_issuer: Arc<TokenIssuer>,
    pub code_engine: Arc<CodeEngine>,
    pub pin_guard: Arc<PinGuard>,
    pub audit: Arc<AuditLog>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServiceConfig) -> AuthResult<Self> {
        // Validate configuration
        config.validate()?;

        // Create data directory if it doesn't exist
        if !config.storage.data_directory.exists() {
            tokio::fs::create_dir_all(&config.storage.data_directory).await?;
        }

        // Initialize database
        let pool = db::create_pool(&config.storage.auth_db, db::DatabaseOptions::default()).await?;
        db::run_migrations(&pool).await?;
        db::test_connection(&pool).await?;

        let config = Arc::new(config);

        // Outbound delivery: email always (inert when unconfigured), SMS
        // when a gateway is set
        let mailer = Mailer::new(config.email.clone())?;
        let sms = config.sms.clone().map(SmsGateway::new);
        let delivery = Arc::new(DeliveryRouter::new(mailer, sms));

        let rotation = RotationPolicy::parse(&config.auth.rotation_policy)?;
        let token_issuer = Arc::new(TokenIssuer::new(pool.clone(), config.clone(), rotation));

        let code_engine = Arc::new(CodeEngine::new(pool.clone(), config.clone(), delivery));
        let pin_guard = Arc::new(PinGuard::new(
            pool.clone(),
            config.clone(),
            token_issuer.clone(),
        ));

        let audit = Arc::new(AuditLog::new(pool.clone()));
        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));

        Ok(Self {
            config,
            db: pool,
            token_issuer,
            code_engine,
            pin_guard,
            audit,
            rate_limiter,
        })
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }
}

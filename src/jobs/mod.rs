use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{error, info};

pub mod tasks;

/// Job scheduler for background tasks
pub struct JobScheduler {
    context: Arc<crate::context::AppContext>,
}

impl JobScheduler {
    pub fn new(context: Arc<crate::context::AppContext>) -> Self {
        Self { context }
    }

    /// Start all background jobs
    pub fn start(self: Arc<Self>) {
        info!("Starting background job scheduler");

        tokio::spawn(Self::session_expiry_job(Arc::clone(&self)));
        tokio::spawn(Self::code_retention_job(Arc::clone(&self)));
        tokio::spawn(Self::health_check_job(Arc::clone(&self)));

        info!("Background jobs started");
    }

    /// Retire sessions whose refresh tokens have expired (runs every hour)
    async fn session_expiry_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(3600)); // Every hour

        loop {
            interval.tick().await;
            info!("Running session expiry sweep");

            match tasks::retire_expired_sessions(&scheduler.context).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Retired {} expired sessions", count);
                    } else {
                        info!("Session sweep: no expired sessions found");
                    }
                }
                Err(e) => error!("Failed to retire expired sessions: {}", e),
            }
        }
    }

    /// Delete verification codes past the retention window (runs every hour)
    async fn code_retention_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(3600)); // Every hour

        loop {
            interval.tick().await;
            info!("Running verification code retention sweep");

            match tasks::sweep_verification_codes(&scheduler.context).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Deleted {} stale verification codes", count);
                    }
                }
                Err(e) => error!("Failed to sweep verification codes: {}", e),
            }
        }
    }

    /// Health check job (runs every 5 minutes)
    async fn health_check_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(300)); // Every 5 minutes

        loop {
            interval.tick().await;

            match tasks::health_check(&scheduler.context).await {
                Ok(_) => {
                    // Silent success - health is good
                }
                Err(e) => error!("Health check failed: {}", e),
            }
        }
    }
}

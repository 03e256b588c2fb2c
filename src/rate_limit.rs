/// Global request rate limiting
///
/// One process-wide limiter over all unauthenticated auth endpoints. The
/// per-identifier issuance cooldown is separate, durable state in the
/// verification engine.
use crate::error::{AuthError, AuthResult};
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::{num::NonZeroU32, sync::Arc};

/// Rate limiter manager
#[derive(Clone)]
pub struct RateLimiter {
    enabled: bool,
    global: Arc<GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl RateLimiter {
    pub fn new(config: &crate::config::RateLimitConfig) -> Self {
        let quota = Quota::per_second(
            NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::new(10).unwrap()),
        )
        .allow_burst(NonZeroU32::new(config.burst_size).unwrap_or(NonZeroU32::new(50).unwrap()));

        Self {
            enabled: config.enabled,
            global: Arc::new(GovernorLimiter::direct(quota)),
        }
    }

    /// Check the global rate limit
    pub fn check(&self) -> AuthResult<()> {
        if !self.enabled {
            return Ok(());
        }

        match self.global.check() {
            Ok(_) => Ok(()),
            Err(_) => Err(AuthError::RateLimitExceeded {
                retry_after: std::time::Duration::from_secs(1),
            }),
        }
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(ctx): State<crate::context::AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    match ctx.rate_limiter.check() {
        Ok(_) => Ok(next.run(request).await),
        Err(_) => Err(StatusCode::TOO_MANY_REQUESTS),
    }
}

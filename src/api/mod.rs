/// HTTP API routes
pub mod auth;
pub mod middleware;

use crate::context::AppContext;
use axum::Router;

/// Build all API routes
pub fn routes() -> Router<AppContext> {
    auth::routes()
}

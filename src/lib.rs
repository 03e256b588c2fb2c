//! GidiPIN auth service
//!
//! Session/token lifecycle for a professional-identity verification
//! platform: access/refresh token issuance and rotation, single-use
//! verification codes with per-identifier cooldowns, and PIN verification
//! behind a lockout guard. The `session` module is the client-side
//! counterpart: it persists the issued pair, schedules renewal ahead of
//! expiry, and signals terminal expiry to its embedder.

pub mod api;
pub mod audit;
pub mod config;
pub mod context;
pub mod db;
pub mod delivery;
pub mod error;
pub mod jobs;
pub mod pin;
pub mod rate_limit;
pub mod server;
pub mod session;
pub mod token;
pub mod verification;

//! HTTP range server and retention sweeper for the Spool media store.
//!
//! This crate provides:
//! - Artifact serving with single byte-range support
//! - Producer ingest behind an access key
//! - Security and CORS headers, per-client rate limiting
//! - The background retention sweeper
//! - Prometheus metrics

pub mod auth;
pub mod error;
pub mod handlers;
pub mod headers;
pub mod metrics;
pub mod ratelimit;
pub mod routes;
pub mod state;
pub mod sweeper;

pub use auth::TraceId;
pub use error::ApiError;
pub use headers::SecurityHeaders;
pub use ratelimit::RateLimitState;
pub use routes::create_router;
pub use state::AppState;
pub use sweeper::{RetentionSweeper, SweepStats, SweeperHandle};

//! Route configuration.

use crate::auth::trace_id_middleware;
use crate::handlers;
use crate::headers::security_headers_middleware;
use crate::metrics::metrics_handler;
use crate::ratelimit::rate_limit_middleware;
use crate::state::AppState;
use axum::Router;
use axum::middleware;
use axum::routing::get;
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    // Reads are throttled per client; ingest is gated by the access key instead
    let serve = get(handlers::get_artifact).layer(middleware::from_fn_with_state(
        state.rate_limit.clone(),
        rate_limit_middleware,
    ));

    let mut router = Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health_check))
        .route("/{artifact_id}", serve.put(handlers::put_artifact));

    // SECURITY: when enabled, restrict /metrics to the scraper at the network level
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    // Order of execution: TraceLayer -> trace id -> security headers -> handler.
    // Security headers also cover the fallback, 405 and 429 responses.
    router
        .fallback(handlers::not_found)
        .layer(middleware::from_fn_with_state(
            state.security.clone(),
            security_headers_middleware,
        ))
        .layer(middleware::from_fn(trace_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

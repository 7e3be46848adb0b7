//! Service endpoints: banner, health, fallback.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use serde::Serialize;

/// Banner response.
#[derive(Debug, Serialize)]
pub struct IndexResponse {
    pub msg: &'static str,
}

/// GET / - Describe the service.
pub async fn index() -> Json<IndexResponse> {
    Json(IndexResponse {
        msg: "spool media store: GET /<id>.mp3 to stream an artifact (Range supported), \
              PUT /<id>.mp3 with x-key to ingest, GET /health for status",
    })
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub backend: &'static str,
    pub version: &'static str,
}

/// GET /health - Report whether the store is usable.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    state.store.health_check().await.map_err(|e| {
        tracing::warn!(error = %e, "Health check failed");
        ApiError::Unavailable("artifact store is not accessible".to_string())
    })?;

    Ok(Json(HealthResponse {
        status: "ok",
        backend: state.store.backend_name(),
        version: env!("CARGO_PKG_VERSION"),
    }))
}

/// Any route not matched above.
pub async fn not_found() -> ApiError {
    ApiError::NotFound
}

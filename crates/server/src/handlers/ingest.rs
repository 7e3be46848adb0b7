//! Producer ingest: `PUT /{artifact_id}`.

use crate::auth::require_access_key;
use crate::error::{ApiError, ApiResult};
use crate::metrics::{ARTIFACTS_INGESTED, BYTES_INGESTED};
use crate::state::AppState;
use axum::Json;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header::CONTENT_LENGTH;
use axum::http::{HeaderMap, StatusCode};
use futures::TryStreamExt;
use serde::Serialize;
use spool_core::ArtifactId;
use spool_storage::{ArtifactMeta, ByteStream, PutOutcome, StorageError, limit_stream};

/// Response for a successful ingest.
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub id: ArtifactId,
    /// Public URL serving the artifact.
    pub direct_link: String,
    pub size_bytes: u64,
    /// Unix seconds after which the sweeper may delete the artifact.
    pub expiration_timestamp: i64,
}

impl IngestResponse {
    fn new(state: &AppState, id: ArtifactId, meta: &ArtifactMeta) -> Self {
        let expiration_timestamp = meta
            .created_at
            .checked_add(state.retention_period())
            .map(|t| t.unix_timestamp())
            .unwrap_or(i64::MAX);

        Self {
            direct_link: state.config.server.direct_link(&id),
            id,
            size_bytes: meta.size,
            expiration_timestamp,
        }
    }
}

/// PUT /{artifact_id} - Store an artifact delivered by the Producer.
///
/// Returns 201 when the artifact was created and 200 when it already existed.
/// A duplicate body is discarded; the stored bytes and timestamp stay as they were.
pub async fn put_artifact(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> ApiResult<(StatusCode, Json<IngestResponse>)> {
    require_access_key(&state, &headers)?;

    let id = ArtifactId::parse(&raw_id).map_err(|_| ApiError::NotFound)?;
    let limit = state.config.server.max_artifact_bytes;

    if let Some(declared) = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        && declared > limit
    {
        return Err(ApiError::PayloadTooLarge { limit });
    }

    let stream: ByteStream = Box::pin(
        body.into_data_stream()
            .map_err(|e| StorageError::Io(std::io::Error::other(e))),
    );

    let outcome = state.store.put(&id, limit_stream(stream, limit)).await?;

    let status = match &outcome {
        PutOutcome::Created(meta) => {
            ARTIFACTS_INGESTED.with_label_values(&["created"]).inc();
            BYTES_INGESTED.inc_by(meta.size);
            tracing::info!(id = %id, size = meta.size, "Artifact ingested");
            StatusCode::CREATED
        }
        PutOutcome::AlreadyExists(_) => {
            ARTIFACTS_INGESTED.with_label_values(&["duplicate"]).inc();
            tracing::info!(id = %id, "Artifact already present, ignoring duplicate write");
            StatusCode::OK
        }
    };

    Ok((status, Json(IngestResponse::new(&state, id, outcome.meta()))))
}

//! Artifact read path: `GET`/`HEAD /{artifact_id}` with byte ranges.

use crate::error::{ApiError, ApiResult};
use crate::metrics::{BYTES_SERVED, UNSATISFIABLE_RANGES, record_artifact_response};
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use spool_core::{ARTIFACT_CONTENT_TYPE, ArtifactId, ResolvedRange, resolve_range};

/// GET /{artifact_id} - Serve an artifact, honoring a single `Range`.
///
/// `HEAD` goes through the same path and gets the same headers without a body.
pub async fn get_artifact(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    let response = match serve_artifact(&state, &raw_id, &method, &headers).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    };
    record_artifact_response(response.status().as_u16());
    response
}

async fn serve_artifact(
    state: &AppState,
    raw_id: &str,
    method: &Method,
    headers: &HeaderMap,
) -> ApiResult<Response> {
    let id = ArtifactId::parse(raw_id).map_err(|_| ApiError::NotFound)?;
    let handle = state.store.open(&id).await?;

    // A Range header that is not valid UTF-8 is malformed, not absent
    let range_header = headers.get(RANGE).map(|v| v.to_str().unwrap_or_default());
    let resolved = resolve_range(range_header, handle.size());

    if let ResolvedRange::Unsatisfiable { .. } = resolved {
        UNSATISFIABLE_RANGES.inc();
        tracing::debug!(id = %id, range = ?range_header, size = handle.size(), "Unsatisfiable range");
        return Ok(range_response(&resolved, Body::empty()));
    }

    let body = match resolved.byte_bounds() {
        Some((start, end)) if *method != Method::HEAD => {
            let stream = handle.into_range_stream(start, end).await?.inspect(|chunk| {
                if let Ok(bytes) = chunk {
                    BYTES_SERVED.inc_by(bytes.len() as u64);
                }
            });
            Body::from_stream(stream)
        }
        _ => Body::empty(),
    };

    Ok(range_response(&resolved, body))
}

/// Build the response for a resolved range around `body`.
fn range_response(resolved: &ResolvedRange, body: Body) -> Response {
    let status = StatusCode::from_u16(resolved.status_code())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut response = (status, body).into_response();
    let headers = response.headers_mut();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static(ARTIFACT_CONTENT_TYPE),
    );
    headers.insert(CONTENT_LENGTH, HeaderValue::from(resolved.content_length()));

    if let Some(content_range) = resolved.content_range()
        && let Ok(value) = HeaderValue::from_str(&content_range)
    {
        headers.insert(CONTENT_RANGE, value);
    }
    if !matches!(resolved, ResolvedRange::Unsatisfiable { .. }) {
        headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    }

    response
}

//! Producer access key checks and request tracing.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::Request;
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::Instrument;
use uuid::Uuid;

/// Header carrying the Producer's access key.
pub const ACCESS_KEY_HEADER: &str = "x-key";

/// Header carrying the request correlation id, in both directions.
pub const TRACE_ID_HEADER: &str = "x-trace-id";

/// Longest client-supplied trace id kept.
const MAX_TRACE_ID_LEN: usize = 128;

/// Request correlation id, taken from `x-trace-id` or generated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceId(String);

impl TraceId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Keep at most [`MAX_TRACE_ID_LEN`] printable ASCII characters of a
    /// caller-supplied id, so it cannot forge log lines.
    pub fn from_header(raw: &str) -> Self {
        let cleaned: String = raw
            .chars()
            .filter(char::is_ascii_graphic)
            .take(MAX_TRACE_ID_LEN)
            .collect();

        if cleaned.is_empty() {
            Self::generate()
        } else {
            Self(cleaned)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The configured access token, kept only as a digest.
///
/// Presented keys are hashed and compared digest to digest, so comparison
/// time does not depend on how much of the raw token matched.
#[derive(Clone)]
pub struct AccessKey {
    digest: [u8; 32],
}

impl AccessKey {
    /// `None` when no token is configured, which disables ingest.
    pub fn from_config(token: Option<&str>) -> Option<Self> {
        token.filter(|t| !t.is_empty()).map(|t| Self {
            digest: hash_key(t),
        })
    }

    pub fn matches(&self, presented: &str) -> bool {
        hash_key(presented) == self.digest
    }
}

impl fmt::Debug for AccessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AccessKey").field(&"<redacted>").finish()
    }
}

fn hash_key(key: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher.finalize().into()
}

/// Require a valid `x-key` header for Producer operations.
pub fn require_access_key(state: &AppState, headers: &HeaderMap) -> ApiResult<()> {
    let Some(expected) = state.access_key.as_ref() else {
        return Err(ApiError::Forbidden("ingest is disabled".to_string()));
    };

    let presented = headers
        .get(ACCESS_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Forbidden("missing access key".to_string()))?;

    if !expected.matches(presented) {
        return Err(ApiError::Forbidden("invalid access key".to_string()));
    }

    Ok(())
}

/// Run the request inside a span carrying its trace id, and echo the id back.
pub async fn trace_id_middleware(mut req: Request, next: Next) -> Response {
    let trace_id = req
        .headers()
        .get(TRACE_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map_or_else(TraceId::generate, TraceId::from_header);

    let span = tracing::info_span!(
        "request",
        trace_id = %trace_id,
        method = %req.method(),
        path = %req.uri().path(),
    );
    req.extensions_mut().insert(trace_id.clone());

    let mut response = next.run(req).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(trace_id.as_str()) {
        response.headers_mut().insert(TRACE_ID_HEADER, value);
    }
    response
}

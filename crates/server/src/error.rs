//! API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use spool_storage::StorageError;

/// Message for every 404. Invalid ids and missing artifacts are indistinguishable.
pub const NOT_FOUND_MESSAGE: &str = "artifact not found";

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("artifact not found")]
    NotFound,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("artifact exceeds {limit} bytes")]
    PayloadTooLarge { limit: u64 },

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            e if e.is_not_found() => Self::NotFound,
            StorageError::TooLarge { limit } => Self::PayloadTooLarge { limit },
            e => Self::Storage(e),
        }
    }
}

impl From<spool_core::Error> for ApiError {
    fn from(err: spool_core::Error) -> Self {
        match err {
            spool_core::Error::InvalidArtifactId(_) => Self::NotFound,
            spool_core::Error::Config(msg) => Self::Internal(msg),
        }
    }
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Forbidden(_) => "forbidden",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::Unavailable(_) => "unavailable",
            Self::Internal(_) => "internal_error",
            Self::Storage(_) => "storage_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Internal details go to the log, not to the client
        let message = match &self {
            Self::Internal(_) | Self::Storage(_) => {
                tracing::error!(error = %self, "Request failed");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorResponse {
            code: self.code().to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_errors_map_to_status() {
        let cases = [
            (
                ApiError::from(StorageError::NotFound("a.mp3".into())),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::from(StorageError::InvalidId("bad".into())),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::from(StorageError::TooLarge { limit: 10 }),
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (
                ApiError::from(StorageError::Io(std::io::Error::other("disk"))),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.status_code(), status, "{err:?}");
        }
    }

    #[test]
    fn test_not_found_message_hides_reason() {
        let err = ApiError::from(spool_core::Error::InvalidArtifactId(
            "invalid character in id: '/'".into(),
        ));
        assert_eq!(err.to_string(), NOT_FOUND_MESSAGE);
    }
}

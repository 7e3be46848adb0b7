//! Security and CORS headers for the artifact route.
//!
//! Applied to every response the route produces, errors and rate-limit
//! rejections included.

use axum::extract::{Request, State};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_SECURITY_POLICY, ORIGIN,
    VARY, X_CONTENT_TYPE_OPTIONS,
};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use spool_core::config::CorsConfig;
use std::sync::Arc;

const CSP: &str = "default-src 'self'";
const ALLOWED_METHODS: &str = "GET, HEAD";

/// Origin policy built once from the CORS allow-list.
#[derive(Clone, Debug)]
pub struct SecurityHeaders {
    allowed_origins: Arc<[String]>,
    allow_any: bool,
}

impl SecurityHeaders {
    pub fn from_config(config: &CorsConfig) -> Self {
        Self {
            allowed_origins: config.allowed_origins.iter().cloned().collect(),
            allow_any: config.allows_any(),
        }
    }

    /// Value for `Access-Control-Allow-Origin` given the request's `Origin`.
    ///
    /// A listed origin is echoed back. Anything else gets the configured list,
    /// which no browser accepts as a match. `None` when nothing is configured.
    pub fn allow_origin(&self, request_origin: Option<&str>) -> Option<String> {
        if self.allow_any {
            return Some("*".to_string());
        }
        if self.allowed_origins.is_empty() {
            return None;
        }
        if let Some(origin) = request_origin
            && self.allowed_origins.iter().any(|o| o == origin)
        {
            return Some(origin.to_string());
        }
        Some(self.allowed_origins.join(", "))
    }

    /// Insert the security headers into `headers`.
    pub fn apply(&self, request_origin: Option<&str>, headers: &mut HeaderMap) {
        headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
        headers.insert(CONTENT_SECURITY_POLICY, HeaderValue::from_static(CSP));
        headers.insert(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOWED_METHODS),
        );
        headers.append(VARY, HeaderValue::from_static("Origin"));

        if let Some(origin) = self.allow_origin(request_origin) {
            match HeaderValue::from_str(&origin) {
                Ok(value) => {
                    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, value);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "CORS allow-list produced an invalid header value");
                }
            }
        }
    }
}

/// Middleware applying [`SecurityHeaders`] to every response.
pub async fn security_headers_middleware(
    State(policy): State<SecurityHeaders>,
    req: Request,
    next: Next,
) -> Response {
    let origin = req
        .headers()
        .get(ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let mut response = next.run(req).await;
    policy.apply(origin.as_deref(), response.headers_mut());
    response
}

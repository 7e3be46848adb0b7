//! Application state shared across handlers.

use crate::auth::AccessKey;
use crate::headers::SecurityHeaders;
use crate::ratelimit::RateLimitState;
use spool_core::config::AppConfig;
use spool_storage::ContentStore;
use std::sync::Arc;
use std::time::Duration;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Artifact store.
    pub store: Arc<dyn ContentStore>,
    /// Rate limiting state.
    pub rate_limit: RateLimitState,
    /// Security and CORS header policy for the artifact route.
    pub security: SecurityHeaders,
    /// Producer access key, `None` when ingest is disabled.
    pub access_key: Option<AccessKey>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// Validates the configuration, failing on errors and logging warnings
    /// for settings that are allowed but risky.
    pub fn new(config: AppConfig, store: Arc<dyn ContentStore>) -> spool_core::Result<Self> {
        for warning in config.validate()? {
            tracing::warn!("Configuration warning: {}", warning);
        }

        let rate_limit = RateLimitState::new(&config.rate_limit);
        let security = SecurityHeaders::from_config(&config.cors);
        let access_key = AccessKey::from_config(config.server.access_token.as_deref());
        if access_key.is_none() {
            tracing::info!("No server.access_token configured, ingest is disabled");
        }

        Ok(Self {
            config: Arc::new(config),
            store,
            rate_limit,
            security,
            access_key,
        })
    }

    /// Retention period applied to every artifact.
    pub fn retention_period(&self) -> time::Duration {
        self.config.retention.retention_period()
    }

    /// Get the cleanup interval for rate limiter, if enabled.
    /// Returns None if rate limiting is disabled.
    pub fn rate_limit_cleanup_interval(&self) -> Option<Duration> {
        if !self.rate_limit.is_enabled() {
            return None;
        }
        // validate() rejects zero, but guard anyway since interval() panics on it
        let interval_secs = self.config.rate_limit.cleanup_interval_secs.max(1);
        Some(Duration::from_secs(interval_secs))
    }
}

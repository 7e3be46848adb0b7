//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:5000").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Public base URL used to build direct links returned by ingest.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Access token a Producer must present in `x-key` to publish artifacts.
    /// Ingest is disabled when unset.
    #[serde(default)]
    pub access_token: Option<String>,
    /// Largest artifact accepted by ingest, in bytes.
    #[serde(default = "default_max_artifact_bytes")]
    pub max_artifact_bytes: u64,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "127.0.0.1:5000".to_string()
}

fn default_base_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_max_artifact_bytes() -> u64 {
    256 * 1024 * 1024
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            base_url: default_base_url(),
            access_token: None,
            max_artifact_bytes: default_max_artifact_bytes(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl ServerConfig {
    /// Build the public link for an artifact.
    pub fn direct_link(&self, id: &crate::ArtifactId) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), id)
    }

    /// Validate server configuration.
    /// Returns warnings for settings that are allowed but probably wrong.
    pub fn validate(&self) -> Result<Vec<String>, String> {
        let mut warnings = Vec::new();

        if self.max_artifact_bytes == 0 {
            return Err("server.max_artifact_bytes cannot be 0".to_string());
        }

        if let Some(token) = &self.access_token {
            if token.is_empty() {
                return Err(
                    "server.access_token is set but empty; remove it to disable ingest"
                        .to_string(),
                );
            }
            if token.len() < 16 {
                warnings.push(format!(
                    "server.access_token is only {} characters. \
                     Use at least 16 random characters.",
                    token.len()
                ));
            }
        }

        Ok(warnings)
    }
}

/// Artifact storage configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Flat directory holding one file per artifact.
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("./mp3")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.path.as_os_str().is_empty() {
            return Err("storage.path cannot be empty".to_string());
        }
        Ok(())
    }
}

/// Retention and sweep configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// How long an artifact lives after it is published, in seconds (default: 2 hours).
    #[serde(default = "default_retention_period_secs")]
    pub retention_period_secs: u64,
    /// Interval between sweeps, in seconds (default: 1 hour).
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Upper bound for a single delete during a sweep, in seconds.
    #[serde(default = "default_delete_timeout_secs")]
    pub delete_timeout_secs: u64,
    /// Dry-run mode: report what would be deleted without deleting (default: false).
    #[serde(default)]
    pub dry_run: bool,
}

fn default_retention_period_secs() -> u64 {
    2 * 60 * 60
}

fn default_sweep_interval_secs() -> u64 {
    3600
}

fn default_delete_timeout_secs() -> u64 {
    30
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            retention_period_secs: default_retention_period_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            delete_timeout_secs: default_delete_timeout_secs(),
            dry_run: false,
        }
    }
}

impl RetentionConfig {
    /// Get the retention period as a Duration.
    pub fn retention_period(&self) -> Duration {
        // Saturate at i64::MAX to prevent overflow wrapping to negative
        let secs = i64::try_from(self.retention_period_secs).unwrap_or(i64::MAX);
        Duration::seconds(secs)
    }

    /// Get the sweep interval as a std::time::Duration.
    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs)
    }

    /// Get the per-delete timeout as a std::time::Duration.
    pub fn delete_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.delete_timeout_secs)
    }

    /// Validate retention configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.retention_period_secs > i64::MAX as u64 {
            return Err(format!(
                "retention.retention_period_secs {} exceeds maximum value {}",
                self.retention_period_secs,
                i64::MAX
            ));
        }

        // A zero interval would turn the sweeper into a busy loop
        if self.sweep_interval_secs == 0 {
            return Err("retention.sweep_interval_secs cannot be 0".to_string());
        }

        if self.delete_timeout_secs == 0 {
            return Err("retention.delete_timeout_secs cannot be 0".to_string());
        }

        Ok(())
    }
}

/// CORS configuration for the artifact route.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Origins allowed to read artifacts cross-origin. `["*"]` allows any.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl CorsConfig {
    /// Whether every origin is allowed.
    pub fn allows_any(&self) -> bool {
        self.allowed_origins.iter().any(|o| o == "*")
    }

    /// Validate CORS configuration.
    pub fn validate(&self) -> Result<Vec<String>, String> {
        let mut warnings = Vec::new();

        if self.allowed_origins.iter().any(|o| o.trim().is_empty()) {
            return Err("cors.allowed_origins contains an empty entry".to_string());
        }

        if self.allowed_origins.is_empty() {
            warnings.push(
                "cors.allowed_origins is empty; browsers on other origins cannot read artifacts"
                    .to_string(),
            );
        } else if self.allows_any() {
            warnings.push("cors.allowed_origins contains '*'; any origin can read artifacts".to_string());
        }

        Ok(warnings)
    }
}

/// Per-client throttling of artifact reads.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Sustained rate per client IP (default: 24, i.e. 2 every 5 seconds).
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    /// Requests a fresh client may make back to back (default: 2).
    #[serde(default = "default_burst_size")]
    pub burst_size: u32,
    /// Peers (IPs or CIDRs) whose `X-Forwarded-For`/`X-Real-IP` is believed.
    /// Empty means never; `["*"]` means always, which lets clients choose their bucket.
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
    /// Cap on tracked client IPs; new clients past it get 429 (default: 100 000).
    #[serde(default = "default_max_entries")]
    pub max_entries: u32,
    /// Seconds between idle-client evictions (default: 60).
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    /// Seconds without requests before a client is forgotten (default: 300).
    #[serde(default = "default_entry_ttl_secs")]
    pub entry_ttl_secs: u64,
}

fn default_requests_per_minute() -> u32 {
    24
}

fn default_burst_size() -> u32 {
    2
}

fn default_max_entries() -> u32 {
    100_000
}

fn default_cleanup_interval_secs() -> u64 {
    60
}

fn default_entry_ttl_secs() -> u64 {
    300
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            requests_per_minute: default_requests_per_minute(),
            burst_size: default_burst_size(),
            trusted_proxies: Vec::new(),
            max_entries: default_max_entries(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            entry_ttl_secs: default_entry_ttl_secs(),
        }
    }
}

impl RateLimitConfig {
    /// Validate rate limiting. Settings are only checked when enabled.
    pub fn validate(&self) -> Result<Vec<String>, String> {
        if !self.enabled {
            return Ok(Vec::new());
        }

        for (name, value) in [
            ("requests_per_minute", u64::from(self.requests_per_minute)),
            ("burst_size", u64::from(self.burst_size)),
            ("max_entries", u64::from(self.max_entries)),
            // tokio::time::interval panics on zero
            ("cleanup_interval_secs", self.cleanup_interval_secs),
        ] {
            if value == 0 {
                return Err(format!("rate_limit.{name} must be at least 1"));
            }
        }

        let mut warnings = Vec::new();
        if self.trusted_proxies.iter().any(|p| p == "*") {
            warnings.push(
                "rate_limit.trusted_proxies includes '*'; any client can spoof its address"
                    .to_string(),
            );
        }
        if self.entry_ttl_secs < 120 {
            warnings.push(format!(
                "rate_limit.entry_ttl_secs={} may forget clients before their bucket refills",
                self.entry_ttl_secs
            ));
        }

        Ok(warnings)
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Artifact storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Retention and sweep configuration.
    #[serde(default)]
    pub retention: RetentionConfig,
    /// CORS configuration.
    #[serde(default)]
    pub cors: CorsConfig,
    /// Rate limiting configuration.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Stores artifacts under `path`, allows one CORS
    /// origin and sets a fixed access token.
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            server: ServerConfig {
                access_token: Some("test-access-token-0123456789".to_string()),
                base_url: "https://media.example.com".to_string(),
                ..Default::default()
            },
            storage: StorageConfig { path: path.into() },
            retention: RetentionConfig::default(),
            cors: CorsConfig {
                allowed_origins: vec!["https://app.example.com".to_string()],
            },
            rate_limit: RateLimitConfig::default(),
        }
    }

    /// Validate every section, collecting warnings.
    pub fn validate(&self) -> crate::Result<Vec<String>> {
        let mut warnings = Vec::new();
        warnings.extend(self.server.validate().map_err(crate::Error::Config)?);
        self.storage.validate().map_err(crate::Error::Config)?;
        self.retention.validate().map_err(crate::Error::Config)?;
        warnings.extend(self.cors.validate().map_err(crate::Error::Config)?);
        warnings.extend(self.rate_limit.validate().map_err(crate::Error::Config)?);
        Ok(warnings)
    }
}

//! Per-client rate limiting for artifact reads.
//!
//! Every client IP gets a token bucket refilling at `requests_per_minute` with
//! room for `burst_size` requests. Rejections are `429 Too Many Requests`
//! carrying `Retry-After`.
//!
//! # Client identity
//!
//! The TCP peer address is the client unless the peer is a trusted proxy, in
//! which case the first hop of `X-Forwarded-For` (or `X-Real-IP`) is used:
//!
//! - `trusted_proxies = []` (default): forwarded headers are ignored
//! - a list of IPs/CIDRs: headers are read only from those peers
//! - `["*"]`: headers are read from anyone, so clients can pick their own bucket
//!
//! # Memory
//!
//! At most `max_entries` clients are tracked; unknown clients beyond that are
//! rejected until the cleanup task evicts clients idle for `entry_ttl_secs`.

use axum::Json;
use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use dashmap::DashMap;
use governor::clock::Clock;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use ipnet::IpNet;
use serde::Serialize;
use spool_core::config::RateLimitConfig;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Bucket shared by every request whose client address is unknown.
pub const UNKNOWN_CLIENT: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

/// Seconds a client is told to wait when the limiter is full.
const AT_CAPACITY_RETRY_SECS: u64 = 60;

/// Rate limiter state shared across requests. Cheap to clone.
#[derive(Clone, Default)]
pub struct RateLimitState {
    inner: Option<Arc<Limiter>>,
}

/// Allocated only when rate limiting is enabled.
struct Limiter {
    buckets: DefaultKeyedRateLimiter<IpAddr>,
    /// Last request per client, for capacity and idle eviction.
    seen: DashMap<IpAddr, Instant>,
    proxies: ProxyTrust,
    max_clients: usize,
    idle_ttl: Duration,
    warned_no_peer: AtomicBool,
    warned_full: AtomicBool,
}

/// Which peers may speak for the client through forwarded headers.
#[derive(Clone, Debug, Default)]
enum ProxyTrust {
    #[default]
    Nobody,
    Everybody,
    Networks(Vec<IpNet>),
}

impl ProxyTrust {
    fn from_config(entries: &[String]) -> Self {
        match entries {
            [] => Self::Nobody,
            [only] if only == "*" => Self::Everybody,
            _ => Self::Networks(entries.iter().filter_map(|e| parse_network(e)).collect()),
        }
    }

    fn trusts(&self, peer: Option<IpAddr>) -> bool {
        match (self, peer) {
            (Self::Everybody, _) => true,
            (Self::Networks(networks), Some(ip)) => networks.iter().any(|n| n.contains(&ip)),
            // A listed proxy cannot be verified without the peer address
            _ => false,
        }
    }
}

/// Parse a CIDR, or a bare address as a single-host network.
fn parse_network(raw: &str) -> Option<IpNet> {
    let raw = raw.trim();
    if let Ok(network) = raw.parse::<IpNet>() {
        return Some(network);
    }
    if let Ok(ip) = raw.parse::<IpAddr>() {
        return Some(IpNet::from(ip));
    }
    tracing::warn!(entry = raw, "Ignoring invalid rate_limit.trusted_proxies entry");
    None
}

impl RateLimitState {
    /// Build the limiter; a disabled config yields a pass-through state.
    pub fn new(config: &RateLimitConfig) -> Self {
        if !config.enabled {
            return Self::default();
        }

        let per_minute = NonZeroU32::new(config.requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(config.burst_size).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_minute(per_minute).allow_burst(burst);

        Self {
            inner: Some(Arc::new(Limiter {
                buckets: RateLimiter::keyed(quota),
                seen: DashMap::new(),
                proxies: ProxyTrust::from_config(&config.trusted_proxies),
                max_clients: config.max_entries as usize,
                idle_ttl: Duration::from_secs(config.entry_ttl_secs),
                warned_no_peer: AtomicBool::new(false),
                warned_full: AtomicBool::new(false),
            })),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Take one request from `client`'s bucket.
    pub fn check(&self, client: IpAddr) -> Result<(), RateLimitError> {
        let Some(limiter) = &self.inner else {
            return Ok(());
        };

        limiter.track(client)?;

        limiter.buckets.check_key(&client).map_err(|not_until| {
            let wait = not_until.wait_time_from(limiter.buckets.clock().now());
            RateLimitError {
                retry_after_secs: wait.as_secs() + 1,
                reason: RateLimitReason::RateLimited,
            }
        })
    }

    /// Forget clients idle longer than the TTL. Returns how many were evicted.
    pub fn cleanup(&self) -> usize {
        let Some(limiter) = &self.inner else {
            return 0;
        };

        let now = Instant::now();
        let before = limiter.seen.len();
        limiter
            .seen
            .retain(|_, last| now.duration_since(*last) <= limiter.idle_ttl);
        let evicted = before.saturating_sub(limiter.seen.len());

        // Full buckets hold no state worth keeping
        limiter.buckets.retain_recent();

        if evicted > 0 {
            limiter.warned_full.store(false, Ordering::Relaxed);
            tracing::debug!(
                evicted,
                remaining = limiter.seen.len(),
                "Evicted idle rate limit clients"
            );
        }
        evicted
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.inner.as_ref().map_or(0, |limiter| limiter.seen.len())
    }
}

impl Limiter {
    /// Record a request from `client`, refusing new clients when full.
    fn track(&self, client: IpAddr) -> Result<(), RateLimitError> {
        let now = Instant::now();
        if let Some(mut last) = self.seen.get_mut(&client) {
            *last = now;
            return Ok(());
        }

        // Checked without holding a shard lock, so the cap is approximate under races
        let tracked = self.seen.len();
        if tracked >= self.max_clients {
            if !self.warned_full.swap(true, Ordering::Relaxed) {
                tracing::warn!(
                    tracked,
                    max_entries = self.max_clients,
                    "Rate limiter full, rejecting new clients until cleanup"
                );
            }
            return Err(RateLimitError {
                retry_after_secs: AT_CAPACITY_RETRY_SECS,
                reason: RateLimitReason::AtCapacity,
            });
        }

        self.seen.insert(client, now);
        Ok(())
    }

    /// Resolve the client address for `req`.
    fn client_ip(&self, req: &Request<Body>) -> IpAddr {
        let peer = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        if self.proxies.trusts(peer)
            && let Some(forwarded) = forwarded_client(req.headers())
        {
            return forwarded;
        }

        peer.unwrap_or_else(|| {
            if !self.warned_no_peer.swap(true, Ordering::Relaxed) {
                tracing::warn!(
                    "Peer address unavailable, all clients share one rate limit bucket. \
                     Serve with into_make_service_with_connect_info::<SocketAddr>()"
                );
            }
            UNKNOWN_CLIENT
        })
    }
}

/// First hop of `X-Forwarded-For`, else `X-Real-IP`.
fn forwarded_client(headers: &HeaderMap) -> Option<IpAddr> {
    first_hop(headers, "x-forwarded-for").or_else(|| first_hop(headers, "x-real-ip"))
}

fn first_hop(headers: &HeaderMap, name: &str) -> Option<IpAddr> {
    headers
        .get(name)?
        .to_str()
        .ok()?
        .split(',')
        .next()?
        .trim()
        .parse()
        .ok()
}

/// Why a request was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitReason {
    /// The client's bucket is empty.
    RateLimited,
    /// Too many clients are tracked to admit a new one.
    AtCapacity,
}

/// Rejection carrying the `Retry-After` hint.
#[derive(Debug)]
pub struct RateLimitError {
    pub retry_after_secs: u64,
    pub reason: RateLimitReason,
}

#[derive(Serialize)]
struct RateLimitBody {
    code: &'static str,
    message: String,
    retry_after: u64,
}

impl IntoResponse for RateLimitError {
    fn into_response(self) -> Response {
        crate::metrics::RATE_LIMITED.inc();

        let body = match self.reason {
            RateLimitReason::RateLimited => RateLimitBody {
                code: "rate_limit_exceeded",
                message: format!("too many requests, retry in {}s", self.retry_after_secs),
                retry_after: self.retry_after_secs,
            },
            RateLimitReason::AtCapacity => RateLimitBody {
                code: "rate_limiter_at_capacity",
                message: "server is busy, retry later".to_string(),
                retry_after: self.retry_after_secs,
            },
        };

        (
            StatusCode::TOO_MANY_REQUESTS,
            [(RETRY_AFTER, self.retry_after_secs.to_string())],
            Json(body),
        )
            .into_response()
    }
}

/// Middleware throttling requests per client IP.
pub async fn rate_limit_middleware(
    State(rate_limit): State<RateLimitState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(limiter) = rate_limit.inner.as_deref() else {
        return next.run(req).await;
    };

    let client = limiter.client_ip(&req);
    if let Err(rejection) = rate_limit.check(client) {
        tracing::debug!(
            client = %client,
            retry_after = rejection.retry_after_secs,
            "Request rate limited"
        );
        return rejection.into_response();
    }

    next.run(req).await
}

/// Periodically evict idle clients.
pub fn spawn_cleanup_task(state: RateLimitState, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let evicted = state.cleanup();
            if evicted > 0 {
                tracing::info!(
                    evicted,
                    tracked = state.tracked_clients(),
                    "Rate limiter cleanup"
                );
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(raw: &str) -> IpAddr {
        raw.parse().unwrap()
    }

    fn enabled(modify: impl FnOnce(&mut RateLimitConfig)) -> RateLimitState {
        let mut config = RateLimitConfig {
            enabled: true,
            ..Default::default()
        };
        modify(&mut config);
        RateLimitState::new(&config)
    }

    fn request(forwarded: Option<&str>, peer: Option<[u8; 4]>) -> Request<Body> {
        let mut builder = Request::builder().uri("/a.mp3");
        if let Some(value) = forwarded {
            builder = builder.header("x-forwarded-for", value);
        }
        let mut req = builder.body(Body::empty()).unwrap();
        if let Some(octets) = peer {
            req.extensions_mut()
                .insert(ConnectInfo(SocketAddr::from((octets, 4000))));
        }
        req
    }

    #[test]
    fn test_disabled_state_admits_everything() {
        let state = RateLimitState::new(&RateLimitConfig::default());
        assert!(!state.is_enabled());
        for _ in 0..100 {
            assert!(state.check(ip("127.0.0.1")).is_ok());
        }
        assert_eq!(state.cleanup(), 0);
    }

    #[test]
    fn test_default_quota_allows_burst_of_two() {
        let state = enabled(|_| {});

        assert!(state.check(ip("127.0.0.1")).is_ok());
        assert!(state.check(ip("127.0.0.1")).is_ok());

        let err = state
            .check(ip("127.0.0.1"))
            .expect_err("third request inside the window should be limited");
        assert_eq!(err.reason, RateLimitReason::RateLimited);
        assert!(err.retry_after_secs >= 1);

        // Buckets are per client
        assert!(state.check(ip("192.168.1.1")).is_ok());
    }

    #[test]
    fn test_new_clients_rejected_when_full() {
        let state = enabled(|c| {
            c.burst_size = 5;
            c.max_entries = 2;
        });

        assert!(state.check(ip("10.0.0.1")).is_ok());
        assert!(state.check(ip("10.0.0.2")).is_ok());

        let err = state.check(ip("10.0.0.3")).unwrap_err();
        assert_eq!(err.reason, RateLimitReason::AtCapacity);
        assert_eq!(err.retry_after_secs, AT_CAPACITY_RETRY_SECS);

        assert!(state.check(ip("10.0.0.1")).is_ok());
    }

    #[test]
    fn test_cleanup_evicts_idle_clients() {
        let state = enabled(|c| {
            c.max_entries = 2;
            c.entry_ttl_secs = 0;
        });

        assert!(state.check(ip("10.0.0.1")).is_ok());
        assert!(state.check(ip("10.0.0.2")).is_ok());
        assert_eq!(state.tracked_clients(), 2);

        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(state.cleanup(), 2);
        assert_eq!(state.tracked_clients(), 0);

        // Room for a new client again
        assert!(state.check(ip("10.0.0.3")).is_ok());
    }

    #[test]
    fn test_proxy_trust() {
        assert!(!ProxyTrust::from_config(&[]).trusts(Some(ip("127.0.0.1"))));

        let everybody = ProxyTrust::from_config(&["*".to_string()]);
        assert!(everybody.trusts(None));

        let listed = ProxyTrust::from_config(&[
            "127.0.0.1".to_string(),
            "10.0.0.0/8".to_string(),
            "not-an-ip".to_string(),
        ]);
        assert!(listed.trusts(Some(ip("127.0.0.1"))));
        assert!(listed.trusts(Some(ip("10.255.255.255"))));
        assert!(!listed.trusts(Some(ip("127.0.0.2"))));
        assert!(!listed.trusts(None));
    }

    #[test]
    fn test_untrusted_peer_cannot_forward() {
        let state = enabled(|_| {});
        let limiter = state.inner.as_deref().unwrap();

        let req = request(Some("203.0.113.9"), Some([198, 51, 100, 1]));
        assert_eq!(limiter.client_ip(&req), ip("198.51.100.1"));
    }

    #[test]
    fn test_trusted_proxy_forwards_first_hop() {
        let state = enabled(|c| c.trusted_proxies = vec!["198.51.100.0/24".to_string()]);
        let limiter = state.inner.as_deref().unwrap();

        let req = request(Some("203.0.113.9, 198.51.100.1"), Some([198, 51, 100, 1]));
        assert_eq!(limiter.client_ip(&req), ip("203.0.113.9"));

        // Garbage in the header falls back to the peer
        let req = request(Some("bogus"), Some([198, 51, 100, 1]));
        assert_eq!(limiter.client_ip(&req), ip("198.51.100.1"));
    }

    #[test]
    fn test_missing_peer_uses_shared_bucket() {
        let state = enabled(|_| {});
        let limiter = state.inner.as_deref().unwrap();

        assert_eq!(limiter.client_ip(&request(None, None)), UNKNOWN_CLIENT);
    }
}

use std::{
    collections::HashMap,
    future::Future,
    net::IpAddr,
    pin::Pin,
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};
use tracing::{debug, warn};

use super::client_ip::extract_client_ip;
use super::correlation::correlation_id;
use super::error::error_response;
use crate::infrastructure::store::SlidingWindowStore;

/// Rate limiting configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per window (distributed strategy)
    pub max_requests: u32,
    /// Sliding window duration (distributed strategy)
    pub window: Duration,
    /// Token refill rate per second (local strategy)
    pub per_second: u32,
    /// Burst capacity (local strategy)
    pub burst: u32,
    /// Idle time after which a visitor's bucket is evicted
    pub idle_timeout: Duration,
    /// How often the sweeper looks for idle visitors
    pub sweep_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(60),
            per_second: 100,
            burst: 200,
            idle_timeout: Duration::from_secs(15 * 60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

/// One admission capability, two strategies. The distributed variant is
/// preferred and selected at startup when the shared store is reachable;
/// the local token bucket is the in-process fallback.
pub enum RateLimiter {
    Distributed(DistributedWindowLimiter),
    Local(LocalTokenBucketLimiter),
}

impl RateLimiter {
    pub fn distributed(store: Arc<dyn SlidingWindowStore>, config: &RateLimitConfig) -> Self {
        Self::Distributed(DistributedWindowLimiter::new(store, config))
    }

    pub fn local(config: &RateLimitConfig) -> Self {
        Self::Local(LocalTokenBucketLimiter::new(config))
    }

    pub async fn check(&self, ip: IpAddr) -> RateLimitDecision {
        match self {
            Self::Distributed(limiter) => limiter.check(ip).await,
            Self::Local(limiter) => limiter.check(ip),
        }
    }
}

/// Sliding-window limiter over the shared store: one atomic pipelined
/// operation per request prunes, counts and records, so concurrent requests
/// from the same client cannot race a split read-modify-write.
pub struct DistributedWindowLimiter {
    store: Arc<dyn SlidingWindowStore>,
    max_requests: u64,
    window: Duration,
}

impl DistributedWindowLimiter {
    pub fn new(store: Arc<dyn SlidingWindowStore>, config: &RateLimitConfig) -> Self {
        Self { store, max_requests: u64::from(config.max_requests), window: config.window }
    }

    pub async fn check(&self, ip: IpAddr) -> RateLimitDecision {
        let key = format!("rate_limit:{ip}");
        let now_ms = unix_millis();
        let window_ms = self.window.as_millis() as u64;

        match self.store.record_and_count(&key, now_ms, window_ms).await {
            Ok(count) if count < self.max_requests => RateLimitDecision::Allowed,
            Ok(_) => RateLimitDecision::Limited,
            Err(err) => {
                // Fail open: availability over strict enforcement.
                warn!(
                    target: "http_requests",
                    error = %err,
                    ip = %ip,
                    "window store failed, allowing request"
                );
                RateLimitDecision::Allowed
            }
        }
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
    last_seen: Instant,
}

impl TokenBucket {
    fn new(burst: f64, now: Instant) -> Self {
        Self { tokens: burst, last_refill: now, last_seen: now }
    }

    fn try_take_at(&mut self, now: Instant, per_second: f64, burst: f64) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * per_second).min(burst);
        self.last_refill = now;
        self.last_seen = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

type VisitorMap = HashMap<IpAddr, Arc<Mutex<TokenBucket>>>;

/// In-process token-bucket limiter, one bucket per client IP. The map lock
/// is held only for the lookup; the bucket's own lock covers the take.
pub struct LocalTokenBucketLimiter {
    visitors: Arc<Mutex<VisitorMap>>,
    per_second: f64,
    burst: f64,
    idle_timeout: Duration,
    sweep_interval: Duration,
}

impl LocalTokenBucketLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            visitors: Arc::new(Mutex::new(HashMap::new())),
            per_second: f64::from(config.per_second),
            burst: f64::from(config.burst),
            idle_timeout: config.idle_timeout,
            sweep_interval: config.sweep_interval,
        }
    }

    pub fn check(&self, ip: IpAddr) -> RateLimitDecision {
        self.check_at(ip, Instant::now())
    }

    fn check_at(&self, ip: IpAddr, now: Instant) -> RateLimitDecision {
        let bucket = {
            let mut visitors = self.visitors.lock().unwrap_or_else(PoisonError::into_inner);
            visitors
                .entry(ip)
                .or_insert_with(|| Arc::new(Mutex::new(TokenBucket::new(self.burst, now))))
                .clone()
        };

        let mut bucket = bucket.lock().unwrap_or_else(PoisonError::into_inner);
        if bucket.try_take_at(now, self.per_second, self.burst) {
            RateLimitDecision::Allowed
        } else {
            RateLimitDecision::Limited
        }
    }

    /// Start the background sweep that bounds memory under IP churn. The
    /// task holds only a weak handle and exits once the limiter is dropped.
    pub fn spawn_sweeper(&self) {
        let visitors = Arc::downgrade(&self.visitors);
        let idle_timeout = self.idle_timeout;
        let interval = self.sweep_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately
            loop {
                ticker.tick().await;
                let Some(visitors) = visitors.upgrade() else { break };
                sweep_idle(&visitors, Instant::now(), idle_timeout);
            }
        });
    }
}

fn sweep_idle(visitors: &Mutex<VisitorMap>, now: Instant, idle_timeout: Duration) {
    let mut visitors = visitors.lock().unwrap_or_else(PoisonError::into_inner);
    let before = visitors.len();

    visitors.retain(|_, bucket| {
        bucket
            .lock()
            .map(|b| now.saturating_duration_since(b.last_seen) <= idle_timeout)
            .unwrap_or(false)
    });

    let evicted = before - visitors.len();
    if evicted > 0 {
        debug!(target: "http_requests", evicted, "swept idle rate-limit visitors");
    }
}

/// Rate limiting middleware: admission check keyed by client IP, uniform
/// 429 envelope on rejection. Counters never leak into responses.
pub fn rate_limit_middleware(
    limiter: Arc<RateLimiter>,
) -> impl Fn(Request, Next) -> Pin<Box<dyn Future<Output = Response> + Send>> + Clone {
    move |request: Request, next: Next| {
        let limiter = limiter.clone();
        Box::pin(async move {
            let client_ip = extract_client_ip(&request);
            let request_id = correlation_id(request.extensions()).to_string();

            match limiter.check(client_ip).await {
                RateLimitDecision::Allowed => next.run(request).await,
                RateLimitDecision::Limited => {
                    warn!(
                        target: "http_requests",
                        request_id = %request_id,
                        ip = %client_ip,
                        "rate limit exceeded"
                    );
                    error_response(
                        StatusCode::TOO_MANY_REQUESTS,
                        "Rate limit exceeded",
                        &request_id,
                    )
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::store::StoreError;
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        routing::get,
        Router,
    };
    use std::net::Ipv4Addr;
    use tower::ServiceExt;

    fn test_ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(192, 168, 1, last))
    }

    fn local_config(per_second: u32, burst: u32) -> RateLimitConfig {
        RateLimitConfig { per_second, burst, ..RateLimitConfig::default() }
    }

    /// In-memory stand-in for the shared sorted-set store, same pruning and
    /// counting semantics, driven by caller-supplied clocks.
    #[derive(Default)]
    struct FakeWindowStore {
        entries: Mutex<HashMap<String, Vec<u64>>>,
    }

    #[async_trait]
    impl SlidingWindowStore for FakeWindowStore {
        async fn record_and_count(
            &self,
            key: &str,
            now_ms: u64,
            window_ms: u64,
        ) -> Result<u64, StoreError> {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            let window = entries.entry(key.to_string()).or_default();
            let cutoff = now_ms.saturating_sub(window_ms);
            window.retain(|&score| score > cutoff);
            let count = window.len() as u64;
            window.push(now_ms);
            Ok(count)
        }
    }

    /// Store whose every operation fails, for the fail-open path.
    struct FailingWindowStore;

    #[async_trait]
    impl SlidingWindowStore for FailingWindowStore {
        async fn record_and_count(
            &self,
            _key: &str,
            _now_ms: u64,
            _window_ms: u64,
        ) -> Result<u64, StoreError> {
            Err(StoreError::Unreachable("connection refused".to_string()))
        }
    }

    #[test]
    fn test_token_bucket_burst_then_reject() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(10.0, start);

        for i in 0..10 {
            assert!(bucket.try_take_at(start, 5.0, 10.0), "request {} should pass", i + 1);
        }
        assert!(!bucket.try_take_at(start, 5.0, 10.0), "11th request should be rejected");
    }

    #[test]
    fn test_token_bucket_refills_over_time() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(10.0, start);

        for _ in 0..10 {
            assert!(bucket.try_take_at(start, 5.0, 10.0));
        }
        assert!(!bucket.try_take_at(start, 5.0, 10.0));

        // After a full second at R=5/sec at least 5 more requests pass.
        let later = start + Duration::from_secs(1);
        for i in 0..5 {
            assert!(bucket.try_take_at(later, 5.0, 10.0), "refilled request {} should pass", i + 1);
        }
    }

    #[test]
    fn test_token_bucket_caps_at_burst() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(10.0, start);

        for _ in 0..10 {
            assert!(bucket.try_take_at(start, 5.0, 10.0));
        }

        // A long idle period refills to the cap, not beyond.
        let much_later = start + Duration::from_secs(3600);
        for _ in 0..10 {
            assert!(bucket.try_take_at(much_later, 5.0, 10.0));
        }
        assert!(!bucket.try_take_at(much_later, 5.0, 10.0));
    }

    #[test]
    fn test_local_limiter_isolates_clients() {
        let limiter = LocalTokenBucketLimiter::new(&local_config(5, 2));
        let now = Instant::now();

        assert_eq!(limiter.check_at(test_ip(1), now), RateLimitDecision::Allowed);
        assert_eq!(limiter.check_at(test_ip(1), now), RateLimitDecision::Allowed);
        assert_eq!(limiter.check_at(test_ip(1), now), RateLimitDecision::Limited);

        // A different client has its own bucket.
        assert_eq!(limiter.check_at(test_ip(2), now), RateLimitDecision::Allowed);
    }

    #[test]
    fn test_sweep_evicts_idle_visitors_only() {
        let limiter = LocalTokenBucketLimiter::new(&local_config(5, 10));
        let start = Instant::now();

        limiter.check_at(test_ip(1), start);
        let fresh = start + Duration::from_secs(16 * 60);
        limiter.check_at(test_ip(2), fresh);

        sweep_idle(&limiter.visitors, fresh, Duration::from_secs(15 * 60));

        let visitors = limiter.visitors.lock().unwrap();
        assert!(!visitors.contains_key(&test_ip(1)), "idle visitor should be evicted");
        assert!(visitors.contains_key(&test_ip(2)), "fresh visitor should survive");
    }

    #[tokio::test]
    async fn test_distributed_admits_limit_then_rejects() {
        let store = Arc::new(FakeWindowStore::default());
        let config =
            RateLimitConfig { max_requests: 100, ..RateLimitConfig::default() };
        let limiter = DistributedWindowLimiter::new(store, &config);
        let ip = test_ip(3);

        for i in 0..100 {
            assert_eq!(
                limiter.check(ip).await,
                RateLimitDecision::Allowed,
                "request {} should be admitted",
                i + 1
            );
        }
        assert_eq!(limiter.check(ip).await, RateLimitDecision::Limited);
    }

    #[tokio::test]
    async fn test_distributed_window_expiry_readmits() {
        let store = Arc::new(FakeWindowStore::default());
        let ip = test_ip(4);
        let key = format!("rate_limit:{ip}");
        let window_ms = 60_000;

        for _ in 0..100 {
            store.record_and_count(&key, 1_000, window_ms).await.unwrap();
        }
        let count = store.record_and_count(&key, 1_000, window_ms).await.unwrap();
        assert!(count >= 100, "window should be full");

        // Once the window has fully elapsed the old entries are pruned.
        let count = store.record_and_count(&key, 1_000 + window_ms + 1, window_ms).await.unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_store_failure_fails_open() {
        let config = RateLimitConfig { max_requests: 1, ..RateLimitConfig::default() };
        let limiter = DistributedWindowLimiter::new(Arc::new(FailingWindowStore), &config);
        let ip = test_ip(5);

        // Never a rejection while the store is down, regardless of volume.
        for _ in 0..10 {
            assert_eq!(limiter.check(ip).await, RateLimitDecision::Allowed);
        }
    }

    #[tokio::test]
    async fn test_middleware_rejects_with_envelope() {
        let limiter = Arc::new(RateLimiter::local(&local_config(1, 1)));
        let app = Router::new()
            .route("/test", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn(rate_limit_middleware(limiter)));

        let first = Request::builder().uri("/test").body(Body::empty()).unwrap();
        let response = app.clone().oneshot(first).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let second = Request::builder().uri("/test").body(Body::empty()).unwrap();
        let response = app.oneshot(second).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "Rate limit exceeded");
        assert!(json.get("request_id").is_some());
    }

    #[tokio::test]
    async fn test_fail_open_via_full_limiter() {
        let config = RateLimitConfig { max_requests: 1, ..RateLimitConfig::default() };
        let limiter = RateLimiter::distributed(Arc::new(FailingWindowStore), &config);

        for _ in 0..5 {
            assert_eq!(limiter.check(test_ip(6)).await, RateLimitDecision::Allowed);
        }
    }
}

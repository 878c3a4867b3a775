//! Rate limiting (C8 stage 2)
//!
//! Token bucket per client identity (source address, or `"unknown"`).
//! Disabled outright when either `per_sec` or `burst` is ≤ 0.

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::http::error::rate_limited_response;
use crate::http::state::AppState;
use crate::storage::now_ms;

struct Bucket {
    tokens: f64,
    last_refill_ms: i64,
}

/// Concurrent map keyed by client identity; per-key synchronization via a
/// `parking_lot::Mutex` guarding that single bucket's refill arithmetic.
#[derive(Default)]
pub struct RateLimiter {
    buckets: DashMap<String, Mutex<Bucket>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the request may proceed.
    fn try_acquire(&self, identity: &str, per_sec: f64, burst: f64) -> bool {
        let entry = self
            .buckets
            .entry(identity.to_string())
            .or_insert_with(|| {
                Mutex::new(Bucket {
                    tokens: burst,
                    last_refill_ms: now_ms(),
                })
            });
        let mut bucket = entry.lock();

        let now = now_ms();
        let elapsed_ms = (now - bucket.last_refill_ms).max(0) as f64;
        bucket.tokens = (bucket.tokens + per_sec * elapsed_ms / 1000.0).min(burst);
        bucket.last_refill_ms = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let per_sec = state.config_cache.rate_limit_per_sec();
    let burst = state.config_cache.rate_limit_burst();

    if per_sec <= 0.0 || burst <= 0.0 {
        return next.run(request).await;
    }

    let identity = addr.ip().to_string();
    if state.rate_limiter.try_acquire(&identity, per_sec, burst) {
        next.run(request).await
    } else {
        rate_limited_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_allows_immediate_bucket_of_requests_then_rejects() {
        let limiter = RateLimiter::new();
        for _ in 0..3 {
            assert!(limiter.try_acquire("client", 1.0, 3.0));
        }
        assert!(!limiter.try_acquire("client", 1.0, 3.0));
    }

    #[test]
    fn distinct_identities_have_independent_buckets() {
        let limiter = RateLimiter::new();
        assert!(limiter.try_acquire("a", 1.0, 1.0));
        assert!(limiter.try_acquire("b", 1.0, 1.0));
        assert!(!limiter.try_acquire("a", 1.0, 1.0));
    }
}

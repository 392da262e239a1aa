//! Fixed-window rate limiter with explicit blocks.
//!
//! Counters are keyed by `identifier:endpoint`. A window lasts five minutes;
//! `login` allows 5 requests per window and every other endpoint 100. A
//! block rejects all requests for the key until it expires.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use forgewatch_core::types::Timestamp;
use tokio_util::sync::CancellationToken;

pub const LOGIN_ENDPOINT: &str = "login";
const LOGIN_LIMIT: u32 = 5;
const DEFAULT_LIMIT: u32 = 100;

/// How often expired windows are swept.
pub const CLEANUP_INTERVAL: StdDuration = StdDuration::from_secs(300);

pub fn window() -> Duration {
    Duration::minutes(5)
}

pub fn limit_for(endpoint: &str) -> u32 {
    if endpoint == LOGIN_ENDPOINT {
        LOGIN_LIMIT
    } else {
        DEFAULT_LIMIT
    }
}

#[derive(Debug, Clone)]
struct Bucket {
    count: u32,
    window_start: Timestamp,
    blocked_until: Option<Timestamp>,
}

#[derive(Default)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, Bucket>>,
}

fn key(identifier: &str, endpoint: &str) -> String {
    format!("{identifier}:{endpoint}")
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    fn buckets(&self) -> MutexGuard<'_, HashMap<String, Bucket>> {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count a request. Returns `false` if it must be rejected.
    pub fn check(&self, identifier: &str, endpoint: &str, now: Timestamp) -> bool {
        let mut buckets = self.buckets();
        let bucket = buckets.entry(key(identifier, endpoint)).or_insert(Bucket {
            count: 0,
            window_start: now,
            blocked_until: None,
        });

        if bucket.blocked_until.is_some_and(|until| until > now) {
            return false;
        }
        if now - bucket.window_start >= window() {
            bucket.count = 0;
            bucket.window_start = now;
        }
        bucket.count += 1;

        let allowed = bucket.count <= limit_for(endpoint);
        if !allowed {
            tracing::warn!(identifier, endpoint, count = bucket.count, "Rate limit exceeded");
        }
        allowed
    }

    /// Reject every request for `identifier` at `endpoint` for `duration`.
    pub fn block(&self, identifier: &str, endpoint: &str, duration: Duration, now: Timestamp) {
        let until = now + duration;
        let mut buckets = self.buckets();
        let bucket = buckets.entry(key(identifier, endpoint)).or_insert(Bucket {
            count: 0,
            window_start: now,
            blocked_until: None,
        });
        bucket.blocked_until = Some(bucket.blocked_until.map_or(until, |b| b.max(until)));
        tracing::warn!(identifier, endpoint, until = %until, "Identifier blocked");
    }

    pub fn is_blocked(&self, identifier: &str, endpoint: &str, now: Timestamp) -> bool {
        self.buckets()
            .get(&key(identifier, endpoint))
            .and_then(|b| b.blocked_until)
            .is_some_and(|until| until > now)
    }

    /// Drop buckets whose window has elapsed and that are not blocked.
    pub fn cleanup(&self, now: Timestamp) -> usize {
        let mut buckets = self.buckets();
        let before = buckets.len();
        buckets.retain(|_, b| {
            now - b.window_start < window() || b.blocked_until.is_some_and(|until| until > now)
        });
        before - buckets.len()
    }

    pub async fn run_cleanup(&self, cancel: CancellationToken) {
        tracing::info!(
            interval_secs = CLEANUP_INTERVAL.as_secs(),
            "Rate limit cleanup job started"
        );

        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Rate limit cleanup job stopping");
                    break;
                }
                _ = interval.tick() => {
                    let removed = self.cleanup(Utc::now());
                    if removed > 0 {
                        tracing::debug!(removed, "Rate limit cleanup: dropped expired windows");
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> Timestamp {
        Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn login_allows_five_per_window() {
        let limiter = RateLimiter::new();
        for _ in 0..5 {
            assert!(limiter.check("1.2.3.4", LOGIN_ENDPOINT, t0()));
        }
        assert!(!limiter.check("1.2.3.4", LOGIN_ENDPOINT, t0()));
        // Other identifiers and endpoints are independent.
        assert!(limiter.check("5.6.7.8", LOGIN_ENDPOINT, t0()));
        assert!(limiter.check("1.2.3.4", "api", t0()));
    }

    #[test]
    fn window_resets_after_five_minutes() {
        let limiter = RateLimiter::new();
        for _ in 0..6 {
            limiter.check("u", LOGIN_ENDPOINT, t0());
        }
        assert!(limiter.check("u", LOGIN_ENDPOINT, t0() + Duration::minutes(5)));
    }

    #[test]
    fn block_overrides_the_window() {
        let limiter = RateLimiter::new();
        limiter.block("u", LOGIN_ENDPOINT, Duration::minutes(60), t0());

        assert!(limiter.is_blocked("u", LOGIN_ENDPOINT, t0() + Duration::minutes(59)));
        assert!(!limiter.check("u", LOGIN_ENDPOINT, t0() + Duration::minutes(10)));
        assert!(!limiter.is_blocked("u", LOGIN_ENDPOINT, t0() + Duration::minutes(60)));
        assert!(limiter.check("u", LOGIN_ENDPOINT, t0() + Duration::minutes(61)));
    }

    #[test]
    fn cleanup_keeps_live_windows_and_blocks() {
        let limiter = RateLimiter::new();
        limiter.check("stale", "api", t0());
        limiter.check("fresh", "api", t0() + Duration::minutes(4));
        limiter.block("blocked", LOGIN_ENDPOINT, Duration::hours(1), t0());

        assert_eq!(limiter.cleanup(t0() + Duration::minutes(6)), 1);
        assert!(limiter.is_blocked("blocked", LOGIN_ENDPOINT, t0() + Duration::minutes(6)));
    }
}

//! Fixed-window rate limiter (ambient, §9 Open Question (d)).
//!
//! An `INCR`+`EXPIRE` counter over [`crate::kv::KvStore`], narrowed from the
//! teacher's adaptive per-domain limiter (`scrapers/rate_limiter/`) to the
//! fixed-window contract the design explicitly calls for: this is not a
//! sliding window, and callers depending on strict sliding-window semantics
//! will observe allowed bursts at window boundaries.

use std::time::Duration;

use crate::kv::KvStore;

const NAMESPACE: &str = "ratelimit:";

/// Fixed-window rate limiter keyed by an arbitrary caller-chosen bucket
/// (typically a domain).
pub struct RateLimiter<'a> {
    store: &'a dyn KvStore,
    max_requests: u32,
    period: Duration,
}

impl<'a> RateLimiter<'a> {
    pub fn new(store: &'a dyn KvStore, max_requests: u32, period: Duration) -> Self {
        Self {
            store,
            max_requests,
            period,
        }
    }

    fn key(bucket: &str) -> String {
        format!("{NAMESPACE}{bucket}")
    }

    /// Increment the counter for `bucket` and report whether the request
    /// is within the configured window limit.
    pub async fn check(&self, bucket: &str) -> bool {
        match self.store.incr(&Self::key(bucket), self.period).await {
            Ok(count) => count <= self.max_requests as i64,
            Err(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::fake::FakeKvStore;

    #[tokio::test]
    async fn allows_up_to_the_configured_limit() {
        let kv = FakeKvStore::new();
        let limiter = RateLimiter::new(&kv, 3, Duration::from_secs(60));
        assert!(limiter.check("example.com").await);
        assert!(limiter.check("example.com").await);
        assert!(limiter.check("example.com").await);
        assert!(!limiter.check("example.com").await);
    }

    #[tokio::test]
    async fn buckets_are_independent() {
        let kv = FakeKvStore::new();
        let limiter = RateLimiter::new(&kv, 1, Duration::from_secs(60));
        assert!(limiter.check("a.com").await);
        assert!(limiter.check("b.com").await);
    }
}

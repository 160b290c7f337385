//! Runtime configuration loaded from the environment.
//!
//! Settings are read directly from `std::env` (after `dotenvy::dotenv()` has
//! been called by the binary's `main()`), following the `CRAWLER_*` env
//! surface named in the external-interfaces section of the design: there is
//! no nested/dynamic config here, so the heavier `prefer`-style loader the
//! original FOIA config used is unnecessary.

use std::time::Duration;

use crate::error::{Error, Result};

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Settings shared by the scheduler and worker binaries.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Postgres connection string.
    pub database_url: String,
    /// Max size of the Postgres connection pool.
    pub database_pool_size: usize,

    /// Redis connection string backing the dedup cache, cancellation
    /// signal and rate limiter.
    pub redis_url: String,

    /// AMQP broker connection string backing the durable job queue.
    pub amqp_url: String,
    /// Exchange/stream name for crawl jobs (`CRAWLER_NATS_STREAM_NAME`,
    /// reused verbatim as the AMQP equivalent).
    pub stream_name: String,
    /// Consumer/queue name workers bind to (`CRAWLER_NATS_CONSUMER_NAME`).
    pub consumer_name: String,

    /// TTL applied to dedup cache entries (C3).
    pub url_dedup_ttl: Duration,
    /// Fixed-window rate limit: max requests per `rate_limit_period`.
    pub rate_limit_requests: u32,
    pub rate_limit_period: Duration,

    /// C8 poll interval.
    pub scheduler_poll_interval: Duration,
    /// C8 batch size per poll.
    pub scheduler_batch_size: i64,

    /// Per-request HTTP timeout used by C9's default `ReqwestFetcher`.
    pub http_request_timeout: Duration,
}

impl Settings {
    /// Load settings from environment variables, applying the defaults
    /// named in the design's external-interfaces section.
    pub fn from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| Error::Validation("DATABASE_URL is required".into()))?;

        Ok(Self {
            database_url,
            database_pool_size: env_parsed("CRAWLER_DB_POOL_SIZE", 10usize),
            redis_url: env_string("CRAWLER_REDIS_URL", "redis://127.0.0.1:6379"),
            amqp_url: env_string("CRAWLER_AMQP_URL", "amqp://127.0.0.1:5672/%2f"),
            stream_name: env_string("CRAWLER_NATS_STREAM_NAME", "crawlplane"),
            consumer_name: env_string("CRAWLER_NATS_CONSUMER_NAME", "crawlplane-worker"),
            url_dedup_ttl: Duration::from_secs(env_parsed("CRAWLER_URL_DEDUP_TTL", 86_400u64)),
            rate_limit_requests: env_parsed("CRAWLER_RATE_LIMIT_REQUESTS", 10u32),
            rate_limit_period: Duration::from_secs(env_parsed("CRAWLER_RATE_LIMIT_PERIOD", 1u64)),
            scheduler_poll_interval: Duration::from_secs(env_parsed(
                "CRAWLER_SCHEDULER_POLL_INTERVAL_SECS",
                60u64,
            )),
            scheduler_batch_size: env_parsed("CRAWLER_SCHEDULER_BATCH_SIZE", 100i64),
            http_request_timeout: Duration::from_secs(env_parsed(
                "CRAWLER_HTTP_TIMEOUT_SECS",
                30u64,
            )),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_parsed_falls_back_to_default_on_bad_value() {
        std::env::set_var("CRAWLPLANE_TEST_PARSE", "not-a-number");
        let v: u32 = env_parsed("CRAWLPLANE_TEST_PARSE", 7);
        assert_eq!(v, 7);
        std::env::remove_var("CRAWLPLANE_TEST_PARSE");
    }
}

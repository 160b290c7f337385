//! crawlplane - control-plane core for a distributed web crawler.
//!
//! Owns scheduling (C5/C8), retry accounting (C6/C7), URL canonicalization
//! and deduplication (C1/C3), content fingerprinting and duplicate
//! grouping (C2/C4), the seed-URL crawl step (C9), the worker dispatch
//! loop (C10) and cooperative cancellation (C11). The two binaries in
//! `src/bin/` are thin: they load `Settings`, wire up the concrete
//! `KvStore`/`DurableQueue`/`HttpFetcher` implementations, and run one of
//! these loops to completion.

pub mod cancellation;
pub mod canonical;
pub mod config;
pub mod cron_engine;
pub mod dedup_cache;
pub mod error;
pub mod fingerprint;
pub mod html_extractor;
pub mod http_fetcher;
pub mod kv;
pub mod models;
pub mod queue;
pub mod rate_limiter;
pub mod repository;
pub mod retry_handler;
pub mod retry_policy_engine;
pub mod schema;
pub mod scheduled_job_processor;
pub mod seed_crawler;
pub mod worker_loop;

pub use error::{Error, Result};

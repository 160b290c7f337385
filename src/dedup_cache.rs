//! Deduplication Cache (C3, §4.3).
//!
//! A TTL-keyed set of URL digests with optional small-JSON metadata,
//! backed by [`crate::kv::KvStore`]. Per §4.3's contract, failures are
//! non-fatal: callers must tolerate false negatives, so every method logs
//! and degrades to "absent"/"not present" rather than propagating the
//! underlying store error.

use std::time::Duration;

use serde_json::Value;
use tracing::warn;

use crate::canonical::{self, CanonicalizeOptions};
use crate::kv::KvStore;

const NAMESPACE: &str = "url:dedup:";

/// URL-digest dedup cache.
pub struct DedupCache<'a> {
    store: &'a dyn KvStore,
    default_ttl: Duration,
}

impl<'a> DedupCache<'a> {
    pub fn new(store: &'a dyn KvStore, default_ttl: Duration) -> Self {
        Self { store, default_ttl }
    }

    fn key(digest: &str) -> String {
        format!("{NAMESPACE}{digest}")
    }

    /// Write `digest` with `metadata`, overwriting and resetting TTL.
    pub async fn set(&self, digest: &str, metadata: &Value, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let payload = metadata.to_string();
        if let Err(e) = self.store.set_ex(&Self::key(digest), &payload, ttl).await {
            warn!(digest, error = %e, "dedup cache set failed, treating as non-fatal");
        }
    }

    /// Look up metadata for `digest`, if present.
    pub async fn get(&self, digest: &str) -> Option<Value> {
        match self.store.get(&Self::key(digest)).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).ok(),
            Ok(None) => None,
            Err(e) => {
                warn!(digest, error = %e, "dedup cache get failed, treating as absent");
                None
            }
        }
    }

    /// Whether `digest` is present.
    pub async fn exists(&self, digest: &str) -> bool {
        match self.store.exists(&Self::key(digest)).await {
            Ok(present) => present,
            Err(e) => {
                warn!(digest, error = %e, "dedup cache exists failed, treating as absent");
                false
            }
        }
    }

    /// Remove `digest`.
    pub async fn delete(&self, digest: &str) {
        if let Err(e) = self.store.delete(&Self::key(digest)).await {
            warn!(digest, error = %e, "dedup cache delete failed, ignoring");
        }
    }

    /// Return the subset of `digests` present, in one round trip.
    pub async fn exists_batch(&self, digests: &[String]) -> Vec<String> {
        let keys: Vec<String> = digests.iter().map(|d| Self::key(d)).collect();
        match self.store.mget(&keys).await {
            Ok(values) => digests
                .iter()
                .zip(values)
                .filter_map(|(d, v)| v.map(|_| d.clone()))
                .collect(),
            Err(e) => {
                warn!(error = %e, "dedup cache exists_batch failed, treating all as absent");
                Vec::new()
            }
        }
    }

    /// Canonicalize `url` via C1 and write its digest with `metadata`.
    pub async fn set_url(&self, url: &str, metadata: &Value, ttl: Option<Duration>) {
        if let Ok(canonical) = canonical::canonicalize(url, &CanonicalizeOptions::default()) {
            self.set(&canonical.digest, metadata, ttl).await;
        }
    }

    /// Canonicalize `url` via C1 and check whether its digest is present.
    pub async fn exists_url(&self, url: &str) -> bool {
        match canonical::canonicalize(url, &CanonicalizeOptions::default()) {
            Ok(c) => self.exists(&c.digest).await,
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::fake::FakeKvStore;
    use serde_json::json;

    #[tokio::test]
    async fn set_then_exists_round_trips() {
        let kv = FakeKvStore::new();
        let cache = DedupCache::new(&kv, Duration::from_secs(60));
        assert!(!cache.exists("abc123").await);
        cache.set("abc123", &json!({"job_id": "j1"}), None).await;
        assert!(cache.exists("abc123").await);
        assert_eq!(
            cache.get("abc123").await,
            Some(json!({"job_id": "j1"}))
        );
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let kv = FakeKvStore::new();
        let cache = DedupCache::new(&kv, Duration::from_secs(60));
        cache.set("k", &json!({}), None).await;
        cache.delete("k").await;
        assert!(!cache.exists("k").await);
    }

    #[tokio::test]
    async fn exists_batch_returns_only_present_subset() {
        let kv = FakeKvStore::new();
        let cache = DedupCache::new(&kv, Duration::from_secs(60));
        cache.set("a", &json!({}), None).await;
        cache.set("c", &json!({}), None).await;
        let present = cache
            .exists_batch(&["a".into(), "b".into(), "c".into()])
            .await;
        assert_eq!(present, vec!["a".to_string(), "c".to_string()]);
    }

    #[tokio::test]
    async fn exists_batch_matches_individual_exists_for_every_key() {
        let kv = FakeKvStore::new();
        let cache = DedupCache::new(&kv, Duration::from_secs(60));
        cache.set("a", &json!({}), None).await;
        let all = vec!["a".to_string(), "b".to_string()];
        let batch = cache.exists_batch(&all).await;
        for d in &all {
            assert_eq!(batch.contains(d), cache.exists(d).await);
        }
    }

    #[tokio::test]
    async fn set_url_and_exists_url_use_canonical_digest() {
        let kv = FakeKvStore::new();
        let cache = DedupCache::new(&kv, Duration::from_secs(60));
        cache
            .set_url("https://Example.com/a?utm_source=x", &json!({}), None)
            .await;
        assert!(cache.exists_url("https://example.com/a").await);
    }
}

//! Cancellation Signal (C11, §4.11).
//!
//! A process-external flag with an optional reason, single-writer,
//! many-reader, backed by [`crate::kv::KvStore`]. `set` is best-effort: a
//! write failure is logged, never propagated, because cancellation itself
//! must never be the reason a job fails.

use std::time::Duration;

use tracing::warn;
use uuid::Uuid;

use crate::kv::KvStore;

const NAMESPACE: &str = "job:cancel:";
const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Cooperative cancellation signal for one job.
pub struct CancellationSignal<'a> {
    store: &'a dyn KvStore,
    ttl: Duration,
}

impl<'a> CancellationSignal<'a> {
    pub fn new(store: &'a dyn KvStore) -> Self {
        Self {
            store,
            ttl: DEFAULT_TTL,
        }
    }

    pub fn with_ttl(store: &'a dyn KvStore, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    fn key(job_id: Uuid) -> String {
        format!("{NAMESPACE}{job_id}")
    }

    /// Raise the cancellation flag for `job_id`, with an optional reason.
    pub async fn set(&self, job_id: Uuid, reason: Option<&str>) {
        let payload = reason.unwrap_or_default();
        if let Err(e) = self
            .store
            .set_ex(&Self::key(job_id), payload, self.ttl)
            .await
        {
            warn!(%job_id, error = %e, "failed to write cancellation flag, ignoring");
        }
    }

    /// Cheap existence check; readers call this at every checkpoint named
    /// in §5 ("Cancellation & timeout").
    pub async fn is_cancelled(&self, job_id: Uuid) -> bool {
        self.store.exists(&Self::key(job_id)).await.unwrap_or(false)
    }

    /// The reason passed to `set`, if any was recorded and the flag is
    /// still live.
    pub async fn reason(&self, job_id: Uuid) -> Option<String> {
        self.store
            .get(&Self::key(job_id))
            .await
            .ok()
            .flatten()
            .filter(|s| !s.is_empty())
    }

    /// Remove the flag.
    pub async fn clear(&self, job_id: Uuid) {
        if let Err(e) = self.store.delete(&Self::key(job_id)).await {
            warn!(%job_id, error = %e, "failed to clear cancellation flag, ignoring");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::fake::FakeKvStore;

    #[tokio::test]
    async fn set_then_is_cancelled() {
        let kv = FakeKvStore::new();
        let signal = CancellationSignal::new(&kv);
        let job_id = Uuid::now_v7();
        assert!(!signal.is_cancelled(job_id).await);
        signal.set(job_id, Some("operator request")).await;
        assert!(signal.is_cancelled(job_id).await);
        assert_eq!(
            signal.reason(job_id).await,
            Some("operator request".to_string())
        );
    }

    #[tokio::test]
    async fn clear_removes_flag() {
        let kv = FakeKvStore::new();
        let signal = CancellationSignal::new(&kv);
        let job_id = Uuid::now_v7();
        signal.set(job_id, None).await;
        signal.clear(job_id).await;
        assert!(!signal.is_cancelled(job_id).await);
    }

    #[tokio::test]
    async fn reason_is_none_when_not_supplied() {
        let kv = FakeKvStore::new();
        let signal = CancellationSignal::new(&kv);
        let job_id = Uuid::now_v7();
        signal.set(job_id, None).await;
        assert_eq!(signal.reason(job_id).await, None);
    }
}

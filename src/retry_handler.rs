//! Retry Handler (C7, §4.7).
//!
//! Drives attempt accounting, re-enqueue and DLQ routing on terminal
//! failure for one `CrawlJob`. Grounded on
//! `original_source/crawler/services/job_retry_handler.py`
//! (`handle_job_failure`, `_add_to_dlq`) and the teacher's
//! `crates/foia/src/work_queue/handle.rs` discipline of never leaving a
//! claimed job in a dangling state.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{JobStatus, NewDeadLetterQueueEntry, NewRetryHistoryEntry};
use crate::queue::DurableQueue;
use crate::repository::{
    CrawlJobRepository, DeadLetterQueueRepository, RetryHistoryRepository, RetryPolicyRepository,
};
use crate::retry_policy_engine::{self, ErrorKind, RetryAfter};

/// Inputs describing one observed failure, as C9/C10 would report it.
#[derive(Debug, Clone)]
pub struct FailureReport {
    pub http_status: Option<u16>,
    pub error_kind: Option<ErrorKind>,
    pub error_message: String,
    pub stack_trace: Option<String>,
    pub retry_after: Option<RetryAfter>,
}

/// Whether the job was handed back to the queue for another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Retried,
    DeadLettered,
    /// Re-enqueue itself failed; job was marked `failed` without a DLQ row
    /// (§4.7 step 4, "If publish fails").
    RequeueFailed,
    /// The job no longer existed (idempotent no-op, §4.7 step 1).
    JobNotFound,
}

pub struct RetryHandler {
    jobs: CrawlJobRepository,
    policies: RetryPolicyRepository,
    history: RetryHistoryRepository,
    dlq: DeadLetterQueueRepository,
    queue: Arc<dyn DurableQueue>,
}

impl RetryHandler {
    pub fn new(
        jobs: CrawlJobRepository,
        policies: RetryPolicyRepository,
        history: RetryHistoryRepository,
        dlq: DeadLetterQueueRepository,
        queue: Arc<dyn DurableQueue>,
    ) -> Self {
        Self {
            jobs,
            policies,
            history,
            dlq,
            queue,
        }
    }

    /// §4.7 `handle_failure`. `shutdown` lets the backoff sleep be cut
    /// short on process shutdown (§5); the job is left `pending` in that
    /// case, which is always a safe state for another worker to resume
    /// from.
    pub async fn handle_failure(
        &self,
        job_id: Uuid,
        failure: FailureReport,
        shutdown: Option<&mut tokio::sync::watch::Receiver<bool>>,
    ) -> Result<Disposition> {
        let Some(job) = self.jobs.get(job_id).await? else {
            info!(%job_id, "retry handler: job no longer exists, dropping");
            return Ok(Disposition::JobNotFound);
        };

        let category = retry_policy_engine::classify(failure.http_status, failure.error_kind);
        let policy = self.policies.get(category).await?;

        let (is_retryable, max_attempts, strategy, initial, max_delay, multiplier) = match &policy
        {
            Some(p) => (
                p.is_retryable,
                p.max_attempts,
                p.backoff_strategy,
                p.initial_delay_seconds,
                p.max_delay_seconds,
                p.backoff_multiplier,
            ),
            None => (false, 0, crate::models::BackoffStrategy::Fixed, 0, 0, 1.0),
        };

        let next_attempt = job.retry_count + 1;
        if !is_retryable || next_attempt > max_attempts {
            self.jobs
                .set_status(job_id, JobStatus::Failed, Some(&failure.error_message))
                .await?;
            self.add_to_dlq(job_id, category, &failure).await?;
            return Ok(Disposition::DeadLettered);
        }

        let delay_secs = retry_policy_engine::calculate_backoff(
            strategy,
            next_attempt as u32,
            initial as u32,
            max_delay as u32,
            multiplier,
            true,
            failure.retry_after,
            Utc::now(),
        );

        self.history
            .append(&NewRetryHistoryEntry::new(
                job_id,
                next_attempt,
                category,
                &failure.error_message,
                failure.stack_trace.clone(),
                delay_secs as i32,
            ))
            .await?;

        self.jobs
            .requeue_for_retry(job_id, &failure.error_message)
            .await?;

        self.sleep_interruptible(Duration::from_secs(delay_secs), shutdown)
            .await;

        let payload = serde_json::json!({ "job_id": job_id.to_string() }).to_string();
        match self.queue.publish(payload.as_bytes()).await {
            Ok(true) => Ok(Disposition::Retried),
            Ok(false) | Err(_) => {
                warn!(%job_id, "retry handler: re-enqueue failed, marking job failed");
                self.jobs
                    .set_status(
                        job_id,
                        JobStatus::Failed,
                        Some("failed to re-enqueue after retry backoff"),
                    )
                    .await?;
                Ok(Disposition::RequeueFailed)
            }
        }
    }

    async fn sleep_interruptible(
        &self,
        delay: Duration,
        shutdown: Option<&mut tokio::sync::watch::Receiver<bool>>,
    ) {
        match shutdown {
            Some(rx) => {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = rx.changed() => {
                        info!("retry handler: backoff sleep cut short by shutdown signal");
                    }
                }
            }
            None => tokio::time::sleep(delay).await,
        }
    }

    /// §4.7 `add_to_dlq`. Failure to insert is logged, never propagated.
    async fn add_to_dlq(
        &self,
        job_id: Uuid,
        category: crate::models::ErrorCategory,
        failure: &FailureReport,
    ) -> Result<()> {
        let Some(job) = self.jobs.get(job_id).await? else {
            return Ok(());
        };
        let last_attempt_at = self
            .history
            .last_attempt_at(job_id)
            .await?
            .unwrap_or(job.updated_at);
        let entry = NewDeadLetterQueueEntry::new(
            job_id,
            job.seed_url.clone(),
            job.website_id,
            job.job_type.as_str().to_string(),
            job.priority,
            category,
            &failure.error_message,
            failure.http_status.map(|s| s as i32),
            job.retry_count + 1,
            job.created_at,
            last_attempt_at,
        );
        if let Err(e) = self.dlq.insert_if_absent(&entry).await {
            warn!(%job_id, error = %e, "failed to write DLQ entry, ignoring");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The pure decision logic (classify -> policy lookup -> retry vs DLQ,
    // backoff math) is covered by `crate::retry_policy_engine`'s unit
    // tests; `RetryHandler` itself composes repository calls that require
    // a live Postgres instance plus a `DurableQueue` to exercise end to
    // end, so its coverage lives in integration tests outside this core.

    #[test]
    fn disposition_variants_are_distinguishable() {
        assert_ne!(Disposition::Retried, Disposition::DeadLettered);
        assert_ne!(Disposition::RequeueFailed, Disposition::JobNotFound);
    }
}

//! Worker Loop (C10, §4.10).
//!
//! Pull-subscribes to the durable job queue in batches of 1, dispatches
//! exactly one seed-URL crawl (C9) per message, and maps its outcome to a
//! `CrawlJob` status transition. Grounded on
//! `original_source/crawler/worker.py` (`CrawlJobWorker.process_job`,
//! `_load_workflow_config`) and the teacher's explicit-ack queue claim
//! lifecycle.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use crate::cancellation::CancellationSignal;
use crate::dedup_cache::DedupCache;
use crate::html_extractor::CssExtractor;
use crate::http_fetcher::HttpFetcher;
use crate::kv::KvStore;
use crate::models::{CrawlOutcome, JobStatus};
use crate::queue::{DurableQueue, QueueMessage};
use crate::repository::{CrawlJobRepository, DeadLetterQueueRepository, RetryHistoryRepository, RetryPolicyRepository, WebsiteRepository};
use crate::retry_handler::{FailureReport, RetryHandler};
use crate::retry_policy_engine::ErrorKind;
use crate::seed_crawler::{self, CrawlConfig, StepConfig};

/// §5 "on message fetch (blocking up to 5s)".
const FETCH_TIMEOUT: Duration = Duration::from_secs(5);
/// §4.10 step 8.
const ERROR_MESSAGE_MAX_LEN: usize = 1000;

/// Dependencies the loop needs to process one message (§4.10).
pub struct WorkerLoop {
    queue: Arc<dyn DurableQueue>,
    crawl_jobs: CrawlJobRepository,
    websites: WebsiteRepository,
    kv: Arc<dyn KvStore>,
    fetcher: Arc<dyn HttpFetcher>,
    retry_handler: RetryHandler,
    dedup_ttl: Duration,
    request_timeout: Duration,
}

impl WorkerLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<dyn DurableQueue>,
        crawl_jobs: CrawlJobRepository,
        websites: WebsiteRepository,
        retry_policies: RetryPolicyRepository,
        retry_history: RetryHistoryRepository,
        dlq: DeadLetterQueueRepository,
        kv: Arc<dyn KvStore>,
        fetcher: Arc<dyn HttpFetcher>,
        dedup_ttl: Duration,
        request_timeout: Duration,
    ) -> Self {
        let retry_handler = RetryHandler::new(
            crawl_jobs.clone(),
            retry_policies,
            retry_history,
            dlq,
            Arc::clone(&queue),
        );
        Self {
            queue,
            crawl_jobs,
            websites,
            kv,
            fetcher,
            retry_handler,
            dedup_ttl,
            request_timeout,
        }
    }

    /// Run until `shutdown` fires (§4.10, §5).
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                info!("worker loop: shutdown signal received, exiting");
                return;
            }

            let message = tokio::select! {
                _ = shutdown.changed() => {
                    info!("worker loop: shutdown signal received, exiting");
                    return;
                }
                result = self.queue.fetch_one(FETCH_TIMEOUT) => result,
            };

            match message {
                Ok(Some(message)) => self.handle_message(message, &mut shutdown).await,
                Ok(None) => {}
                Err(e) => warn!(error = %e, "worker loop: fetch_one failed"),
            }
        }
    }

    /// §4.10 steps 1-9.
    async fn handle_message(
        &self,
        message: QueueMessage,
        shutdown: &mut tokio::sync::watch::Receiver<bool>,
    ) {
        let job_id = match parse_job_id(message.payload()) {
            Some(id) => id,
            None => {
                warn!("worker loop: message missing/malformed job_id, dropping");
                let _ = self.queue.ack(message).await;
                return;
            }
        };

        match self.process_job(job_id, shutdown).await {
            Ok(()) => {
                let _ = self.queue.ack(message).await;
            }
            Err(e) => {
                warn!(%job_id, error = %e, "worker loop: unexpected error, nak-ing for requeue");
                let _ = self.queue.nak(message).await;
            }
        }
    }

    async fn process_job(
        &self,
        job_id: Uuid,
        shutdown: &mut tokio::sync::watch::Receiver<bool>,
    ) -> crate::error::Result<()> {
        let cancellation = CancellationSignal::new(&*self.kv);
        if cancellation.is_cancelled(job_id).await {
            cancellation.clear(job_id).await;
            info!(%job_id, "worker loop: job cancelled before dispatch, dropping");
            return Ok(());
        }

        let Some(job) = self.crawl_jobs.get(job_id).await? else {
            info!(%job_id, "worker loop: job no longer exists, dropping");
            return Ok(());
        };
        if job.status.is_terminal() {
            info!(%job_id, status = %job.status, "worker loop: job already terminal, dropping");
            return Ok(());
        }

        self.crawl_jobs.mark_running(job_id).await?;

        let step = match self.load_workflow_config(&job).await {
            Ok(step) => step,
            Err(reason) => {
                self.crawl_jobs
                    .set_status(job_id, JobStatus::Failed, Some(&truncate(&reason)))
                    .await?;
                return Ok(());
            }
        };

        let dedup_cache = DedupCache::new(&*self.kv, self.dedup_ttl);
        let config = CrawlConfig {
            step,
            job_id: Some(job_id),
            request_timeout: self.request_timeout,
            dedup_cache: Some(&dedup_cache),
            cancellation: Some(&cancellation),
        };
        let extractor = CssExtractor;
        let result = seed_crawler::crawl(&job.seed_url, config, &*self.fetcher, &extractor).await;

        if !result.warnings.is_empty() {
            warn!(%job_id, warnings = ?result.warnings, "worker loop: crawl completed with warnings");
        }

        match result.outcome {
            CrawlOutcome::Success
            | CrawlOutcome::SuccessNoUrls
            | CrawlOutcome::PartialSuccess
            | CrawlOutcome::PaginationStopped
            | CrawlOutcome::EmptyPages => {
                self.crawl_jobs.mark_completed(job_id).await?;
            }
            CrawlOutcome::Cancelled => {
                self.crawl_jobs
                    .mark_cancelled(job_id, Some("cancelled during crawl"))
                    .await?;
            }
            CrawlOutcome::SeedUrl404 => {
                self.report_failure(
                    job_id,
                    FailureReport {
                        http_status: Some(404),
                        error_kind: None,
                        error_message: "seed URL returned 404".to_string(),
                        stack_trace: None,
                        retry_after: None,
                    },
                )
                .await?;
            }
            CrawlOutcome::SeedUrlError => {
                self.report_failure(
                    job_id,
                    FailureReport {
                        http_status: None,
                        error_kind: Some(ErrorKind::Network),
                        error_message: "seed URL fetch failed".to_string(),
                        stack_trace: None,
                        retry_after: None,
                    },
                )
                .await?;
            }
            CrawlOutcome::InvalidConfig => {
                self.report_failure(
                    job_id,
                    FailureReport {
                        http_status: None,
                        error_kind: Some(ErrorKind::Validation),
                        error_message: "invalid crawl step configuration".to_string(),
                        stack_trace: None,
                        retry_after: None,
                    },
                )
                .await?;
            }
            CrawlOutcome::CircularPagination => {
                self.report_failure(
                    job_id,
                    FailureReport {
                        http_status: None,
                        error_kind: Some(ErrorKind::Other),
                        error_message: "circular pagination detected".to_string(),
                        stack_trace: None,
                        retry_after: None,
                    },
                )
                .await?;
            }
        }
        Ok(())
    }

    /// §4.10 step 8 wired through C7: the worker never decides
    /// retry-vs-DLQ itself, it reports the failure and `RetryHandler`
    /// either re-enqueues the job or marks it permanently `failed`.
    async fn report_failure(&self, job_id: Uuid, failure: FailureReport) -> crate::error::Result<()> {
        self.retry_handler.handle_failure(job_id, failure, None).await?;
        Ok(())
    }

    /// §4.10 step 5.
    async fn load_workflow_config(&self, job: &crate::models::CrawlJob) -> Result<StepConfig, String> {
        let raw = if let Some(inline) = &job.inline_config {
            inline.clone()
        } else if let Some(website_id) = job.website_id {
            let website = self
                .websites
                .get(website_id)
                .await
                .map_err(|e| e.to_string())?;
            match website {
                Some(w) => w.config,
                None => return Err("website referenced by job no longer exists".to_string()),
            }
        } else {
            return Err("job has neither inline_config nor website_id".to_string());
        };
        serde_json::from_value(raw).map_err(|e| format!("malformed workflow config: {e}"))
    }
}

fn parse_job_id(payload: &[u8]) -> Option<Uuid> {
    let value: serde_json::Value = serde_json::from_slice(payload).ok()?;
    let raw = value.get("job_id")?.as_str()?;
    Uuid::parse_str(raw).ok()
}

fn truncate(reason: &str) -> String {
    if reason.len() <= ERROR_MESSAGE_MAX_LEN {
        reason.to_string()
    } else {
        reason.chars().take(ERROR_MESSAGE_MAX_LEN).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_job_id_extracts_uuid() {
        let id = Uuid::now_v7();
        let payload = serde_json::json!({ "job_id": id.to_string() }).to_string();
        assert_eq!(parse_job_id(payload.as_bytes()), Some(id));
    }

    #[test]
    fn parse_job_id_rejects_missing_field() {
        assert_eq!(parse_job_id(b"{}"), None);
    }

    #[test]
    fn parse_job_id_rejects_malformed_json() {
        assert_eq!(parse_job_id(b"not json"), None);
    }

    #[test]
    fn truncate_bounds_error_message_length() {
        let long = "x".repeat(2000);
        assert_eq!(truncate(&long).len(), ERROR_MESSAGE_MAX_LEN);
        assert_eq!(truncate("short"), "short");
    }
}

//! Scheduled-Job Processor (C8, §4.8).
//!
//! A single cooperative loop that polls due `ScheduledJob` rows, creates
//! `CrawlJob`s for those within the catch-up window, and skips (but still
//! advances) the rest. Grounded on
//! `original_source/crawler/services/scheduled_job_processor.py`
//! (`_prepare_scheduled_job`, `_create_and_publish_crawl_job`,
//! `MAX_CATCHUP_DELAY = 1h`, `SCHEDULED_JOB_PRIORITY = 5`).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cron_engine;
use crate::error::Result;
use crate::models::{JobType, NewCrawlJob};
use crate::queue::DurableQueue;
use crate::repository::{CrawlJobRepository, ScheduledJobRepository, WebsiteRepository};

/// §4.8: missed fires older than this are skipped rather than caught up.
pub const MAX_CATCHUP_DELAY: chrono::Duration = chrono::Duration::hours(1);
/// §4.8 `create_template_based_job` defaults.
const SCHEDULED_JOB_PRIORITY: i16 = 5;
const SCHEDULED_JOB_MAX_RETRIES: i32 = 3;

pub struct ScheduledJobProcessor {
    scheduled_jobs: ScheduledJobRepository,
    websites: WebsiteRepository,
    crawl_jobs: CrawlJobRepository,
    queue: Arc<dyn DurableQueue>,
    poll_interval: Duration,
    batch_size: i64,
}

/// What happened to one due `ScheduledJob` during a single pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    CaughtUp,
    Skipped,
    RecomputedOrphan,
    WebsiteMissing,
    CronInvalid,
}

impl ScheduledJobProcessor {
    pub fn new(
        scheduled_jobs: ScheduledJobRepository,
        websites: WebsiteRepository,
        crawl_jobs: CrawlJobRepository,
        queue: Arc<dyn DurableQueue>,
        poll_interval: Duration,
        batch_size: i64,
    ) -> Self {
        Self {
            scheduled_jobs,
            websites,
            crawl_jobs,
            queue,
            poll_interval,
            batch_size,
        }
    }

    /// Run the processor until `shutdown` fires: the missed-schedule sweep
    /// once, then normal per-tick processing at `poll_interval` (§4.8, §5).
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!("scheduled-job processor: running missed-schedule sweep");
        if let Err(e) = self.run_missed_schedule_sweep().await {
            warn!(error = %e, "missed-schedule sweep failed");
        }

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("scheduled-job processor: shutdown signal received, exiting");
                    break;
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
            if *shutdown.borrow() {
                break;
            }
            if let Err(e) = self.process_tick(None).await {
                warn!(error = %e, "scheduled-job processor tick failed");
            }
        }
    }

    /// §4.8 "missed-schedule sweep": drain every due batch, applying the
    /// 1-hour catch-up threshold, looping while the batch came back full.
    pub async fn run_missed_schedule_sweep(&self) -> Result<()> {
        loop {
            let now = Utc::now();
            let batch = self
                .scheduled_jobs
                .fetch_due_batch(now, self.batch_size)
                .await?;
            if batch.is_empty() {
                return Ok(());
            }
            let batch_len = batch.len();
            for job in batch {
                self.process_job(job.id, now, Some(MAX_CATCHUP_DELAY)).await?;
            }
            if (batch_len as i64) < self.batch_size {
                return Ok(());
            }
        }
    }

    /// §4.8 "normal processing": a single batch, always treated as
    /// catch-up (`threshold = None`).
    pub async fn process_tick(&self, threshold_override: Option<chrono::Duration>) -> Result<()> {
        let now = Utc::now();
        let batch = self
            .scheduled_jobs
            .fetch_due_batch(now, self.batch_size)
            .await?;
        for job in batch {
            self.process_job(job.id, now, threshold_override).await?;
        }
        Ok(())
    }

    /// Per-job flow shared by the sweep and normal processing (§4.8).
    /// `threshold = None` means "always catch up" (normal-tick semantics);
    /// `Some(d)` applies the catch-up-vs-skip rule against `d`.
    async fn process_job(
        &self,
        scheduled_job_id: Uuid,
        now: chrono::DateTime<Utc>,
        threshold: Option<chrono::Duration>,
    ) -> Result<JobOutcome> {
        let Some(job) = self.scheduled_jobs.get(scheduled_job_id).await? else {
            return Ok(JobOutcome::WebsiteMissing);
        };

        let website = self.websites.get(job.website_id).await?;
        let website = match website {
            Some(w) if w.is_live() => w,
            _ => {
                self.scheduled_jobs.deactivate(job.id).await?;
                return Ok(JobOutcome::WebsiteMissing);
            }
        };

        let timezone = if job.timezone.trim().is_empty() {
            self.scheduled_jobs.set_timezone(job.id, "UTC").await?;
            "UTC".to_string()
        } else {
            job.timezone.clone()
        };

        let Some(next_run_time) = job.next_run_time else {
            // Orphaned: recompute and update without executing.
            match cron_engine::next_run(&job.cron_expression, now, &timezone) {
                Ok((next, _)) => {
                    self.scheduled_jobs.advance_next_run(job.id, next).await?;
                    return Ok(JobOutcome::RecomputedOrphan);
                }
                Err(_) => {
                    self.scheduled_jobs.deactivate(job.id).await?;
                    return Ok(JobOutcome::CronInvalid);
                }
            }
        };

        let new_next_run = match cron_engine::next_run(&job.cron_expression, now, &timezone) {
            Ok((next, _)) => next,
            Err(_) => {
                self.scheduled_jobs.deactivate(job.id).await?;
                return Ok(JobOutcome::CronInvalid);
            }
        };

        let delay = now - next_run_time;
        let should_catch_up = match threshold {
            None => true,
            Some(max_delay) => delay < max_delay,
        };

        if should_catch_up {
            self.create_and_publish_crawl_job(&job, &website, next_run_time)
                .await?;
            self.scheduled_jobs
                .record_catchup(job.id, new_next_run, now)
                .await?;
            Ok(JobOutcome::CaughtUp)
        } else {
            self.scheduled_jobs.advance_next_run(job.id, new_next_run).await?;
            Ok(JobOutcome::Skipped)
        }
    }

    /// §4.8 `_create_and_publish_crawl_job` / `create_template_based_job`.
    async fn create_and_publish_crawl_job(
        &self,
        scheduled_job: &crate::models::ScheduledJob,
        website: &crate::models::Website,
        missed_time: chrono::DateTime<Utc>,
    ) -> Result<()> {
        let metadata = serde_json::json!({
            "scheduled_job_id": scheduled_job.id.to_string(),
            "cron_schedule": scheduled_job.cron_expression,
            "catchup": true,
            "missed_time": missed_time.to_rfc3339(),
        });

        let new_job = NewCrawlJob::template_based(
            website.id,
            website.base_url.clone(),
            scheduled_job.job_config.clone(),
            JobType::Scheduled,
            SCHEDULED_JOB_PRIORITY,
            metadata,
            SCHEDULED_JOB_MAX_RETRIES,
        );

        let created = self.crawl_jobs.create(&new_job).await?;
        let payload = serde_json::json!({ "job_id": created.id.to_string() }).to_string();

        match self.queue.publish(payload.as_bytes()).await {
            Ok(true) => Ok(()),
            Ok(false) | Err(_) => {
                // Never ran: cancelled, not failed (§4.8).
                self.crawl_jobs
                    .mark_cancelled(created.id, Some("failed to publish scheduled crawl job"))
                    .await?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_catchup_delay_is_one_hour() {
        assert_eq!(MAX_CATCHUP_DELAY, chrono::Duration::hours(1));
    }

    #[test]
    fn job_outcome_variants_are_distinguishable() {
        assert_ne!(JobOutcome::CaughtUp, JobOutcome::Skipped);
        assert_ne!(JobOutcome::WebsiteMissing, JobOutcome::CronInvalid);
    }
}

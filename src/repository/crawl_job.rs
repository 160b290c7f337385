//! Repository for `CrawlJob` (§3); owned by C7 once claimed, with the
//! pending→running transition owned by C10.

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use super::pool::DbPool;
use crate::error::Result;
use crate::models::{CrawlJob, JobStatus, NewCrawlJob};
use crate::schema::crawl_jobs;

#[derive(Clone)]
pub struct CrawlJobRepository {
    pool: DbPool,
}

impl CrawlJobRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, new_job: &NewCrawlJob) -> Result<CrawlJob> {
        let mut conn = self.pool.get().await?;
        let row = diesel::insert_into(crawl_jobs::table)
            .values(new_job)
            .get_result(&mut conn)
            .await?;
        Ok(row)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<CrawlJob>> {
        let mut conn = self.pool.get().await?;
        let row = crawl_jobs::table
            .find(id)
            .first(&mut conn)
            .await
            .optional()?;
        Ok(row)
    }

    pub async fn set_status(
        &self,
        id: Uuid,
        status: JobStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        let mut conn = self.pool.get().await?;
        diesel::update(crawl_jobs::table.find(id))
            .set((
                crawl_jobs::status.eq(status),
                crawl_jobs::error_message.eq(error_message),
                crawl_jobs::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    /// C10 step 4: transition to `running`, stamping `started_at`.
    pub async fn mark_running(&self, id: Uuid) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let now = Utc::now();
        diesel::update(crawl_jobs::table.find(id))
            .set((
                crawl_jobs::status.eq(JobStatus::Running),
                crawl_jobs::started_at.eq(Some(now)),
                crawl_jobs::updated_at.eq(now),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    pub async fn mark_completed(&self, id: Uuid) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let now = Utc::now();
        diesel::update(crawl_jobs::table.find(id))
            .set((
                crawl_jobs::status.eq(JobStatus::Completed),
                crawl_jobs::completed_at.eq(Some(now)),
                crawl_jobs::updated_at.eq(now),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    pub async fn mark_cancelled(&self, id: Uuid, reason: Option<&str>) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let now = Utc::now();
        diesel::update(crawl_jobs::table.find(id))
            .set((
                crawl_jobs::status.eq(JobStatus::Cancelled),
                crawl_jobs::cancelled_at.eq(Some(now)),
                crawl_jobs::cancellation_reason.eq(reason),
                crawl_jobs::updated_at.eq(now),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    /// C7 retry path: increment `retry_count`, reopen the job to `pending`,
    /// clear the in-flight timestamps (§4.7 step 4).
    pub async fn requeue_for_retry(&self, id: Uuid, error_message: &str) -> Result<()> {
        let mut conn = self.pool.get().await?;
        diesel::update(crawl_jobs::table.find(id))
            .set((
                crawl_jobs::retry_count.eq(crawl_jobs::retry_count + 1),
                crawl_jobs::status.eq(JobStatus::Pending),
                crawl_jobs::started_at.eq(None::<chrono::DateTime<Utc>>),
                crawl_jobs::completed_at.eq(None::<chrono::DateTime<Utc>>),
                crawl_jobs::error_message.eq(Some(error_message)),
                crawl_jobs::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }
}

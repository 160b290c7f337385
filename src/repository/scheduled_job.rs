//! Repository for `ScheduledJob` (§3); owned by C8.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use super::pool::DbPool;
use crate::error::Result;
use crate::models::ScheduledJob;
use crate::schema::scheduled_jobs;

#[derive(Clone)]
pub struct ScheduledJobRepository {
    pool: DbPool,
}

impl ScheduledJobRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Fetch up to `batch_size` active jobs due at or before `now` (§4.8
    /// missed-schedule sweep / normal processing).
    pub async fn fetch_due_batch(
        &self,
        now: DateTime<Utc>,
        batch_size: i64,
    ) -> Result<Vec<ScheduledJob>> {
        let mut conn = self.pool.get().await?;
        let rows = scheduled_jobs::table
            .filter(scheduled_jobs::is_active.eq(true))
            .filter(scheduled_jobs::next_run_time.le(now))
            .order(scheduled_jobs::next_run_time.asc())
            .limit(batch_size)
            .load(&mut conn)
            .await?;
        Ok(rows)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<ScheduledJob>> {
        let mut conn = self.pool.get().await?;
        let row = scheduled_jobs::table
            .find(id)
            .first(&mut conn)
            .await
            .optional()?;
        Ok(row)
    }

    pub async fn set_timezone(&self, id: Uuid, timezone: &str) -> Result<()> {
        let mut conn = self.pool.get().await?;
        diesel::update(scheduled_jobs::table.find(id))
            .set((
                scheduled_jobs::timezone.eq(timezone),
                scheduled_jobs::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    /// Recompute-only path: bump `next_run_time` without touching
    /// `last_run_time` (orphaned job, or skip-beyond-threshold, §4.8).
    pub async fn advance_next_run(&self, id: Uuid, next_run_time: DateTime<Utc>) -> Result<()> {
        let mut conn = self.pool.get().await?;
        diesel::update(scheduled_jobs::table.find(id))
            .set((
                scheduled_jobs::next_run_time.eq(Some(next_run_time)),
                scheduled_jobs::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    /// Catch-up path: bump `next_run_time` and set `last_run_time := now`
    /// (§4.8 catch-up branch).
    pub async fn record_catchup(
        &self,
        id: Uuid,
        next_run_time: DateTime<Utc>,
        last_run_time: DateTime<Utc>,
    ) -> Result<()> {
        let mut conn = self.pool.get().await?;
        diesel::update(scheduled_jobs::table.find(id))
            .set((
                scheduled_jobs::next_run_time.eq(Some(next_run_time)),
                scheduled_jobs::last_run_time.eq(Some(last_run_time)),
                scheduled_jobs::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    pub async fn deactivate(&self, id: Uuid) -> Result<()> {
        let mut conn = self.pool.get().await?;
        diesel::update(scheduled_jobs::table.find(id))
            .set((
                scheduled_jobs::is_active.eq(false),
                scheduled_jobs::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }
}

//! Repository for `RetryHistory` (§3); append-only attempt log written by
//! C7 on every retry.

use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use super::pool::DbPool;
use crate::error::Result;
use crate::models::{NewRetryHistoryEntry, RetryHistoryEntry};
use crate::schema::retry_history;

#[derive(Clone)]
pub struct RetryHistoryRepository {
    pool: DbPool,
}

impl RetryHistoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn append(&self, entry: &NewRetryHistoryEntry) -> Result<RetryHistoryEntry> {
        let mut conn = self.pool.get().await?;
        let row = diesel::insert_into(retry_history::table)
            .values(entry)
            .get_result(&mut conn)
            .await?;
        Ok(row)
    }

    pub async fn for_job(&self, job_id: Uuid) -> Result<Vec<RetryHistoryEntry>> {
        let mut conn = self.pool.get().await?;
        let rows = retry_history::table
            .filter(retry_history::job_id.eq(job_id))
            .order(retry_history::attempt_number.asc())
            .load(&mut conn)
            .await?;
        Ok(rows)
    }

    /// §4.7 `add_to_dlq`: `last_attempt_at` is the last `RetryHistory.attempted_at`
    /// for the job, or `None` if the job never retried.
    pub async fn last_attempt_at(&self, job_id: Uuid) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
        let mut conn = self.pool.get().await?;
        let row: Option<RetryHistoryEntry> = retry_history::table
            .filter(retry_history::job_id.eq(job_id))
            .order(retry_history::attempt_number.desc())
            .first(&mut conn)
            .await
            .optional()?;
        Ok(row.map(|r| r.attempted_at))
    }
}

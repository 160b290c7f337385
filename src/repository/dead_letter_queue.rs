//! Repository for `DeadLetterQueue` (§3); terminal-failure archive written
//! by C7's `add_to_dlq`.

use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use super::pool::DbPool;
use crate::error::Result;
use crate::models::{DeadLetterQueueEntry, NewDeadLetterQueueEntry};
use crate::schema::dead_letter_queue;

#[derive(Clone)]
pub struct DeadLetterQueueRepository {
    pool: DbPool,
}

impl DeadLetterQueueRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// §3: `job_id` unique per DLQ row, and the idempotence law requires
    /// that calling this twice for the same job leaves exactly one row —
    /// `ON CONFLICT DO NOTHING` on `job_id` gives that for free without an
    /// extra round trip to check existence first.
    pub async fn insert_if_absent(
        &self,
        entry: &NewDeadLetterQueueEntry,
    ) -> Result<Option<DeadLetterQueueEntry>> {
        let mut conn = self.pool.get().await?;
        let row = diesel::insert_into(dead_letter_queue::table)
            .values(entry)
            .on_conflict(dead_letter_queue::job_id)
            .do_nothing()
            .get_result(&mut conn)
            .await
            .optional()?;
        Ok(row)
    }

    pub async fn get_by_job_id(&self, job_id: Uuid) -> Result<Option<DeadLetterQueueEntry>> {
        let mut conn = self.pool.get().await?;
        let row = dead_letter_queue::table
            .filter(dead_letter_queue::job_id.eq(job_id))
            .first(&mut conn)
            .await
            .optional()?;
        Ok(row)
    }

    pub async fn resolve(&self, id: Uuid, notes: Option<&str>) -> Result<()> {
        let mut conn = self.pool.get().await?;
        diesel::update(dead_letter_queue::table.find(id))
            .set((
                dead_letter_queue::resolved.eq(true),
                dead_letter_queue::resolved_at.eq(Some(chrono::Utc::now())),
                dead_letter_queue::resolution_notes.eq(notes),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }
}

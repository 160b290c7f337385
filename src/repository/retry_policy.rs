//! Repository for `RetryPolicy` (§3); seeded at install, mutable via an
//! admin path outside this core's scope.

use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::pool::DbPool;
use crate::error::Result;
use crate::models::{ErrorCategory, RetryPolicy};
use crate::schema::retry_policies;

#[derive(Clone)]
pub struct RetryPolicyRepository {
    pool: DbPool,
}

impl RetryPolicyRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, category: ErrorCategory) -> Result<Option<RetryPolicy>> {
        let mut conn = self.pool.get().await?;
        let row = retry_policies::table
            .find(category)
            .first(&mut conn)
            .await
            .optional()?;
        Ok(row)
    }

    /// Install the fixed seed policies (§3 `RetryPolicy` lifecycle), one
    /// row per [`ErrorCategory`], skipping categories already present.
    pub async fn seed_defaults(&self) -> Result<()> {
        let mut conn = self.pool.get().await?;
        for policy in RetryPolicy::seed_defaults() {
            diesel::insert_into(retry_policies::table)
                .values(&policy)
                .on_conflict(retry_policies::error_category)
                .do_nothing()
                .execute(&mut conn)
                .await?;
        }
        Ok(())
    }
}

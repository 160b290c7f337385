//! Repository for `WebsiteConfigHistory` (§3): append-only versioned
//! snapshots of `Website.config`. Out of this core's direct call path
//! (config mutation happens at the HTTP API boundary, out of scope per
//! §1), but the invariant ("version N exists ⇒ all 1…N−1 exist") lives
//! here so any caller that does write a new version gets it for free.

use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use super::pool::DbPool;
use crate::error::{Error, Result};
use crate::models::WebsiteConfigHistory;
use crate::schema::website_config_history;

#[derive(Clone)]
pub struct WebsiteConfigHistoryRepository {
    pool: DbPool,
}

impl WebsiteConfigHistoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Append the next version for `website_id`. Reads the current max
    /// version and inserts `max + 1`, inside a transaction, so the
    /// `(website_id, version)` sequence never gaps even under concurrent
    /// callers targeting the same website (single-writer assumption per
    /// §1, enforced here defensively rather than assumed).
    pub async fn append_version(
        &self,
        website_id: Uuid,
        config: serde_json::Value,
        changed_by: Option<&str>,
        change_reason: Option<&str>,
    ) -> Result<WebsiteConfigHistory> {
        use diesel_async::scoped_futures::ScopedFutureExt;
        use diesel_async::AsyncConnection;

        let mut conn = self.pool.get().await?;
        let row = conn
            .transaction::<_, diesel::result::Error, _>(|conn| {
                async move {
                    let current_max: Option<i32> = website_config_history::table
                        .filter(website_config_history::website_id.eq(website_id))
                        .select(diesel::dsl::max(website_config_history::version))
                        .first(conn)
                        .await?;
                    let next_version = current_max.unwrap_or(0) + 1;

                    diesel::insert_into(website_config_history::table)
                        .values((
                            website_config_history::id.eq(Uuid::now_v7()),
                            website_config_history::website_id.eq(website_id),
                            website_config_history::version.eq(next_version),
                            website_config_history::config.eq(config),
                            website_config_history::changed_by.eq(changed_by),
                            website_config_history::change_reason.eq(change_reason),
                            website_config_history::created_at.eq(chrono::Utc::now()),
                        ))
                        .get_result(conn)
                        .await
                }
                .scope_boxed()
            })
            .await?;
        Ok(row)
    }

    pub async fn get_version(
        &self,
        website_id: Uuid,
        version: i32,
    ) -> Result<Option<WebsiteConfigHistory>> {
        let mut conn = self.pool.get().await?;
        let row = website_config_history::table
            .filter(website_config_history::website_id.eq(website_id))
            .filter(website_config_history::version.eq(version))
            .first(&mut conn)
            .await
            .optional()?;
        Ok(row)
    }

    pub async fn latest(&self, website_id: Uuid) -> Result<Option<WebsiteConfigHistory>> {
        let mut conn = self.pool.get().await?;
        let row = website_config_history::table
            .filter(website_config_history::website_id.eq(website_id))
            .order(website_config_history::version.desc())
            .first(&mut conn)
            .await
            .optional()?;
        Ok(row)
    }

    /// Validates the §3 invariant on read: every version from 1..=latest
    /// must be present, with no gaps.
    pub async fn assert_no_gaps(&self, website_id: Uuid) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let mut versions: Vec<i32> = website_config_history::table
            .filter(website_config_history::website_id.eq(website_id))
            .select(website_config_history::version)
            .load(&mut conn)
            .await?;
        versions.sort_unstable();
        for (expected, actual) in (1..=versions.len() as i32).zip(versions.iter()) {
            if expected != *actual {
                return Err(Error::Validation(format!(
                    "config history gap for website {website_id}: expected version {expected}, found {actual}"
                )));
            }
        }
        Ok(())
    }
}

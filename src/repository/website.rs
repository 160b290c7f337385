//! Repository for `Website` (§3).

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use super::pool::DbPool;
use crate::error::Result;
use crate::models::{NewWebsite, Website};
use crate::schema::websites;

#[derive(Clone)]
pub struct WebsiteRepository {
    pool: DbPool,
}

impl WebsiteRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, new_website: &NewWebsite<'_>) -> Result<Website> {
        let mut conn = self.pool.get().await?;
        let row = diesel::insert_into(websites::table)
            .values(new_website)
            .get_result(&mut conn)
            .await?;
        Ok(row)
    }

    /// Fetch a website by id, including soft-deleted rows — C8 needs to
    /// distinguish "missing" from "soft-deleted" (§4.8).
    pub async fn get(&self, id: Uuid) -> Result<Option<Website>> {
        let mut conn = self.pool.get().await?;
        let row = websites::table
            .find(id)
            .first(&mut conn)
            .await
            .optional()?;
        Ok(row)
    }

    pub async fn get_live_by_name(&self, name: &str) -> Result<Option<Website>> {
        let mut conn = self.pool.get().await?;
        let row = websites::table
            .filter(websites::name.eq(name))
            .filter(websites::deleted_at.is_null())
            .first(&mut conn)
            .await
            .optional()?;
        Ok(row)
    }

    pub async fn soft_delete(&self, id: Uuid) -> Result<()> {
        let mut conn = self.pool.get().await?;
        diesel::update(websites::table.find(id))
            .set((
                websites::deleted_at.eq(Some(Utc::now())),
                websites::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }
}

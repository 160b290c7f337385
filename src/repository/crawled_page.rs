//! Repository for `CrawledPage` (§3); persisted crawl output written by
//! C9/C10 during extraction.

use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use super::pool::DbPool;
use crate::error::Result;
use crate::models::{CrawledPage, NewCrawledPage};
use crate::schema::crawled_pages;

#[derive(Clone)]
pub struct CrawledPageRepository {
    pool: DbPool,
}

impl CrawledPageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, new_page: &NewCrawledPage) -> Result<CrawledPage> {
        let mut conn = self.pool.get().await?;
        let row = diesel::insert_into(crawled_pages::table)
            .values(new_page)
            .get_result(&mut conn)
            .await?;
        Ok(row)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<CrawledPage>> {
        let mut conn = self.pool.get().await?;
        let row = crawled_pages::table
            .find(id)
            .first(&mut conn)
            .await
            .optional()?;
        Ok(row)
    }

    /// §3 invariant: `(website_id, url_hash)` unique among non-duplicates.
    pub async fn get_by_url_hash(
        &self,
        website_id: Uuid,
        url_hash: &str,
    ) -> Result<Option<CrawledPage>> {
        let mut conn = self.pool.get().await?;
        let row = crawled_pages::table
            .filter(crawled_pages::website_id.eq(website_id))
            .filter(crawled_pages::url_hash.eq(url_hash))
            .filter(crawled_pages::is_duplicate.eq(false))
            .first(&mut conn)
            .await
            .optional()?;
        Ok(row)
    }

    /// Mark a page as a near/exact duplicate of `duplicate_of` (§3
    /// `CrawledPage` invariant: `is_duplicate` implies `duplicate_of` set).
    pub async fn mark_duplicate(
        &self,
        id: Uuid,
        duplicate_of: Uuid,
        similarity_score: Option<i16>,
    ) -> Result<()> {
        let mut conn = self.pool.get().await?;
        diesel::update(crawled_pages::table.find(id))
            .set((
                crawled_pages::is_duplicate.eq(true),
                crawled_pages::duplicate_of.eq(Some(duplicate_of)),
                crawled_pages::similarity_score.eq(similarity_score),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }
}

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::crawled_pages;

/// Persisted crawl output (§3 `CrawledPage`).
#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = crawled_pages)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CrawledPage {
    pub id: Uuid,
    pub website_id: Uuid,
    pub job_id: Uuid,
    pub url: String,
    pub url_hash: String,
    pub content_hash: Option<String>,
    pub title: Option<String>,
    pub extracted_content: Option<String>,
    pub metadata: serde_json::Value,
    pub blob_path: Option<String>,
    pub is_duplicate: bool,
    pub duplicate_of: Option<Uuid>,
    pub similarity_score: Option<i16>,
    pub crawled_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crawled_pages)]
pub struct NewCrawledPage {
    pub id: Uuid,
    pub website_id: Uuid,
    pub job_id: Uuid,
    pub url: String,
    pub url_hash: String,
    pub content_hash: Option<String>,
    pub title: Option<String>,
    pub extracted_content: Option<String>,
    pub metadata: serde_json::Value,
    pub blob_path: Option<String>,
    pub is_duplicate: bool,
    pub duplicate_of: Option<Uuid>,
    pub similarity_score: Option<i16>,
}

impl NewCrawledPage {
    pub fn new(website_id: Uuid, job_id: Uuid, url: String, url_hash: String) -> Self {
        Self {
            id: Uuid::now_v7(),
            website_id,
            job_id,
            url,
            url_hash,
            content_hash: None,
            title: None,
            extracted_content: None,
            metadata: serde_json::Value::Object(Default::default()),
            blob_path: None,
            is_duplicate: false,
            duplicate_of: None,
            similarity_score: None,
        }
    }
}

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::scheduled_jobs;

/// A cron-bound producer of [`crate::models::CrawlJob`]s for one website
/// (§3 `ScheduledJob`).
#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = scheduled_jobs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ScheduledJob {
    pub id: Uuid,
    pub website_id: Uuid,
    pub cron_expression: String,
    pub timezone: String,
    pub next_run_time: Option<DateTime<Utc>>,
    pub last_run_time: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub job_config: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = scheduled_jobs)]
pub struct NewScheduledJob<'a> {
    pub id: Uuid,
    pub website_id: Uuid,
    pub cron_expression: &'a str,
    pub timezone: &'a str,
    pub next_run_time: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub job_config: serde_json::Value,
}

impl<'a> NewScheduledJob<'a> {
    pub fn new(website_id: Uuid, cron_expression: &'a str, timezone: &'a str) -> Self {
        Self {
            id: Uuid::now_v7(),
            website_id,
            cron_expression,
            timezone,
            next_run_time: None,
            is_active: true,
            job_config: serde_json::Value::Object(Default::default()),
        }
    }
}

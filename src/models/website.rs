use chrono::{DateTime, Utc};
use diesel::backend::Backend;
use diesel::deserialize::{self, FromSql};
use diesel::pg::Pg;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use diesel::prelude::*;
use diesel::{AsExpression, FromSqlRow};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::{website_config_history, websites};

/// Lifecycle status of a [`Website`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsExpression, FromSqlRow, Serialize, Deserialize)]
#[diesel(sql_type = Text)]
pub enum WebsiteStatus {
    Active,
    Inactive,
}

impl WebsiteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebsiteStatus::Active => "active",
            WebsiteStatus::Inactive => "inactive",
        }
    }
}

impl std::str::FromStr for WebsiteStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(WebsiteStatus::Active),
            "inactive" => Ok(WebsiteStatus::Inactive),
            other => Err(format!("unknown website status: {other}")),
        }
    }
}

impl ToSql<Text, Pg> for WebsiteStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        <str as ToSql<Text, Pg>>::to_sql(self.as_str(), out)
    }
}

impl FromSql<Text, Pg> for WebsiteStatus {
    fn from_sql(bytes: <Pg as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
        let s = <String as FromSql<Text, Pg>>::from_sql(bytes)?;
        s.parse().map_err(|e: String| e.into())
    }
}

/// Template for repeated crawls (§3 `Website`).
#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = websites)]
#[diesel(check_for_backend(Pg))]
pub struct Website {
    pub id: Uuid,
    pub name: String,
    pub base_url: String,
    pub config: serde_json::Value,
    pub cron_schedule: Option<String>,
    pub status: WebsiteStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Website {
    /// A website is "live" (not soft-deleted) when `deleted_at` is unset.
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = websites)]
pub struct NewWebsite<'a> {
    pub id: Uuid,
    pub name: &'a str,
    pub base_url: &'a str,
    pub config: serde_json::Value,
    pub cron_schedule: Option<&'a str>,
    pub status: WebsiteStatus,
}

impl<'a> NewWebsite<'a> {
    pub fn new(name: &'a str, base_url: &'a str, config: serde_json::Value) -> Self {
        Self {
            id: Uuid::now_v7(),
            name,
            base_url,
            config,
            cron_schedule: None,
            status: WebsiteStatus::Active,
        }
    }
}

/// Append-only versioned snapshot of `Website.config` (§3
/// `WebsiteConfigHistory`).
#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = website_config_history)]
#[diesel(check_for_backend(Pg))]
pub struct WebsiteConfigHistory {
    pub id: Uuid,
    pub website_id: Uuid,
    pub version: i32,
    pub config: serde_json::Value,
    pub changed_by: Option<String>,
    pub change_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = website_config_history)]
pub struct NewWebsiteConfigHistory<'a> {
    pub id: Uuid,
    pub website_id: Uuid,
    pub version: i32,
    pub config: serde_json::Value,
    pub changed_by: Option<&'a str>,
    pub change_reason: Option<&'a str>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn website_status_round_trips_through_str() {
        for status in [WebsiteStatus::Active, WebsiteStatus::Inactive] {
            let parsed: WebsiteStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn unknown_status_string_is_rejected() {
        assert!("deleted".parse::<WebsiteStatus>().is_err());
    }
}

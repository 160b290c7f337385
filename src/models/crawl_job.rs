use chrono::{DateTime, Utc};
use diesel::backend::Backend;
use diesel::deserialize::{self, FromSql};
use diesel::pg::Pg;
use diesel::serialize::{self, Output, ToSql};
use diesel::sql_types::Text;
use diesel::prelude::*;
use diesel::{AsExpression, FromSqlRow};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::crawl_jobs;

macro_rules! text_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s,)+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant),)+
                    other => Err(format!(concat!(stringify!($name), ": unknown value {}"), other)),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ToSql<Text, Pg> for $name {
            fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
                <str as ToSql<Text, Pg>>::to_sql(self.as_str(), out)
            }
        }

        impl FromSql<Text, Pg> for $name {
            fn from_sql(bytes: <Pg as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
                let s = <String as FromSql<Text, Pg>>::from_sql(bytes)?;
                s.parse().map_err(|e: String| e.into())
            }
        }
    };
}

/// §3 `CrawlJob.job_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsExpression, FromSqlRow, Serialize, Deserialize)]
#[diesel(sql_type = Text)]
pub enum JobType {
    OneTime,
    Scheduled,
}

text_enum!(JobType {
    OneTime => "one_time",
    Scheduled => "scheduled",
});

/// §3 `CrawlJob.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsExpression, FromSqlRow, Serialize, Deserialize)]
#[diesel(sql_type = Text)]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

text_enum!(JobStatus {
    Pending => "pending",
    Running => "running",
    Completed => "completed",
    Failed => "failed",
    Cancelled => "cancelled",
});

impl JobStatus {
    /// Terminal statuses must never transition again (worker idempotency
    /// guard, §5 "Idempotency").
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Cancelled | JobStatus::Failed)
    }
}

/// Outcome returned by the seed-URL crawler (C9, §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrawlOutcome {
    Success,
    SuccessNoUrls,
    SeedUrl404,
    SeedUrlError,
    InvalidConfig,
    PaginationStopped,
    CircularPagination,
    EmptyPages,
    PartialSuccess,
    Cancelled,
}

/// One attempt/unit of work (§3 `CrawlJob`).
#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = crawl_jobs)]
#[diesel(check_for_backend(Pg))]
pub struct CrawlJob {
    pub id: Uuid,
    pub website_id: Option<Uuid>,
    pub inline_config: Option<serde_json::Value>,
    pub seed_url: String,
    pub job_type: JobType,
    pub status: JobStatus,
    pub priority: i16,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<String>,
    pub cancellation_reason: Option<String>,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub metadata: serde_json::Value,
    pub variables: serde_json::Value,
    pub progress: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crawl_jobs)]
pub struct NewCrawlJob {
    pub id: Uuid,
    pub website_id: Option<Uuid>,
    pub inline_config: Option<serde_json::Value>,
    pub seed_url: String,
    pub job_type: JobType,
    pub status: JobStatus,
    pub priority: i16,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub max_retries: i32,
    pub metadata: serde_json::Value,
    pub variables: serde_json::Value,
    pub progress: serde_json::Value,
}

impl NewCrawlJob {
    /// Build a template-based job (C8's `create_template_based_job`).
    ///
    /// Exactly one of `website_id`/`inline_config` is non-null (§3 invariant);
    /// this constructor is the template-based path, so `inline_config` is
    /// always `None`.
    pub fn template_based(
        website_id: Uuid,
        seed_url: String,
        variables: serde_json::Value,
        job_type: JobType,
        priority: i16,
        metadata: serde_json::Value,
        max_retries: i32,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            website_id: Some(website_id),
            inline_config: None,
            seed_url,
            job_type,
            status: JobStatus::Pending,
            priority,
            scheduled_at: Some(Utc::now()),
            max_retries,
            metadata,
            variables,
            progress: serde_json::Value::Object(Default::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_round_trips() {
        for s in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ] {
            assert_eq!(s.as_str().parse::<JobStatus>().unwrap(), s);
        }
    }

    #[test]
    fn terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }
}

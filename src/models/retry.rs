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

use crate::schema::{dead_letter_queue, retry_history, retry_policies};

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

/// Closed error taxonomy driving retry policy selection (§3 `ErrorCategory`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, AsExpression, FromSqlRow, Serialize, Deserialize,
)]
#[diesel(sql_type = Text)]
pub enum ErrorCategory {
    NotFound,
    AuthError,
    RateLimit,
    Timeout,
    ClientError,
    ServerError,
    NetworkError,
    ParseError,
    ValidationError,
    Unknown,
}

text_enum!(ErrorCategory {
    NotFound => "NOT_FOUND",
    AuthError => "AUTH_ERROR",
    RateLimit => "RATE_LIMIT",
    Timeout => "TIMEOUT",
    ClientError => "CLIENT_ERROR",
    ServerError => "SERVER_ERROR",
    NetworkError => "NETWORK_ERROR",
    ParseError => "PARSE_ERROR",
    ValidationError => "VALIDATION_ERROR",
    Unknown => "UNKNOWN",
});

/// §4.6 backoff strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsExpression, FromSqlRow, Serialize, Deserialize)]
#[diesel(sql_type = Text)]
pub enum BackoffStrategy {
    Exponential,
    Linear,
    Fixed,
}

text_enum!(BackoffStrategy {
    Exponential => "exponential",
    Linear => "linear",
    Fixed => "fixed",
});

/// Per-category policy row (§3 `RetryPolicy`).
#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = retry_policies)]
#[diesel(primary_key(error_category))]
#[diesel(check_for_backend(Pg))]
pub struct RetryPolicy {
    pub error_category: ErrorCategory,
    pub is_retryable: bool,
    pub max_attempts: i32,
    pub backoff_strategy: BackoffStrategy,
    pub initial_delay_seconds: i32,
    pub max_delay_seconds: i32,
    pub backoff_multiplier: f64,
    pub description: Option<String>,
}

impl RetryPolicy {
    /// The fixed seed policies installed for every category (teacher's
    /// convention of seeding lookup tables at install, generalized from
    /// `monokrome-foiacquire`'s config defaults).
    pub fn seed_defaults() -> Vec<RetryPolicy> {
        use BackoffStrategy::*;
        use ErrorCategory::*;
        let row = |cat: ErrorCategory,
                   retryable: bool,
                   max_attempts: i32,
                   strategy: BackoffStrategy,
                   initial: i32,
                   max_delay: i32,
                   mult: f64| RetryPolicy {
            error_category: cat,
            is_retryable: retryable,
            max_attempts,
            backoff_strategy: strategy,
            initial_delay_seconds: initial,
            max_delay_seconds: max_delay,
            backoff_multiplier: mult,
            description: None,
        };
        vec![
            row(NotFound, false, 0, Fixed, 0, 0, 1.0),
            row(AuthError, false, 0, Fixed, 0, 0, 1.0),
            row(RateLimit, true, 5, Exponential, 2, 300, 2.0),
            row(Timeout, true, 3, Exponential, 2, 60, 2.0),
            row(ClientError, false, 0, Fixed, 0, 0, 1.0),
            row(ServerError, true, 3, Exponential, 2, 60, 2.0),
            row(NetworkError, true, 3, Exponential, 2, 60, 2.0),
            row(ParseError, false, 0, Fixed, 0, 0, 1.0),
            row(ValidationError, false, 0, Fixed, 0, 0, 1.0),
            row(Unknown, true, 1, Fixed, 5, 5, 1.0),
        ]
    }
}

/// Append-only attempt log (§3 `RetryHistory`).
#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = retry_history)]
#[diesel(check_for_backend(Pg))]
pub struct RetryHistoryEntry {
    pub id: Uuid,
    pub job_id: Uuid,
    pub attempt_number: i32,
    pub error_category: ErrorCategory,
    pub error_message: String,
    pub stack_trace: Option<String>,
    pub retry_delay_seconds: i32,
    pub attempted_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = retry_history)]
pub struct NewRetryHistoryEntry {
    pub id: Uuid,
    pub job_id: Uuid,
    pub attempt_number: i32,
    pub error_category: ErrorCategory,
    pub error_message: String,
    pub stack_trace: Option<String>,
    pub retry_delay_seconds: i32,
}

impl NewRetryHistoryEntry {
    /// Truncates `error_message` to the §3 1000-char bound.
    pub fn new(
        job_id: Uuid,
        attempt_number: i32,
        error_category: ErrorCategory,
        error_message: &str,
        stack_trace: Option<String>,
        retry_delay_seconds: i32,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            job_id,
            attempt_number,
            error_category,
            error_message: truncate(error_message, 1000),
            stack_trace,
            retry_delay_seconds,
        }
    }
}

/// Terminal-failure archive (§3 `DeadLetterQueue`).
#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = dead_letter_queue)]
#[diesel(check_for_backend(Pg))]
pub struct DeadLetterQueueEntry {
    pub id: Uuid,
    pub job_id: Uuid,
    pub seed_url: String,
    pub website_id: Option<Uuid>,
    pub job_type: String,
    pub priority: i16,
    pub error_category: ErrorCategory,
    pub error_message: String,
    pub stack_trace: Option<String>,
    pub http_status: Option<i32>,
    pub total_attempts: i32,
    pub first_attempt_at: DateTime<Utc>,
    pub last_attempt_at: DateTime<Utc>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_notes: Option<String>,
    pub retry_attempted: bool,
    pub retry_success: Option<bool>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = dead_letter_queue)]
pub struct NewDeadLetterQueueEntry {
    pub id: Uuid,
    pub job_id: Uuid,
    pub seed_url: String,
    pub website_id: Option<Uuid>,
    pub job_type: String,
    pub priority: i16,
    pub error_category: ErrorCategory,
    pub error_message: String,
    pub stack_trace: Option<String>,
    pub http_status: Option<i32>,
    pub total_attempts: i32,
    pub first_attempt_at: DateTime<Utc>,
    pub last_attempt_at: DateTime<Utc>,
}

impl NewDeadLetterQueueEntry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        job_id: Uuid,
        seed_url: String,
        website_id: Option<Uuid>,
        job_type: String,
        priority: i16,
        error_category: ErrorCategory,
        error_message: &str,
        http_status: Option<i32>,
        total_attempts: i32,
        first_attempt_at: DateTime<Utc>,
        last_attempt_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            job_id,
            seed_url,
            website_id,
            job_type,
            priority,
            error_category,
            error_message: truncate(error_message, 1000),
            stack_trace: None,
            http_status,
            total_attempts,
            first_attempt_at,
            last_attempt_at,
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_category_round_trips() {
        for cat in [
            ErrorCategory::NotFound,
            ErrorCategory::AuthError,
            ErrorCategory::RateLimit,
            ErrorCategory::Timeout,
            ErrorCategory::ClientError,
            ErrorCategory::ServerError,
            ErrorCategory::NetworkError,
            ErrorCategory::ParseError,
            ErrorCategory::ValidationError,
            ErrorCategory::Unknown,
        ] {
            assert_eq!(cat.as_str().parse::<ErrorCategory>().unwrap(), cat);
        }
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = "x".repeat(1500);
        assert_eq!(truncate(&s, 1000).chars().count(), 1000);
    }

    #[test]
    fn seed_defaults_cover_every_category() {
        let policies = RetryPolicy::seed_defaults();
        assert_eq!(policies.len(), 10);
    }
}

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

use crate::schema::{content_hashes, duplicate_groups, duplicate_relationships};

/// How a [`DuplicateRelationship`] was detected (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsExpression, FromSqlRow, Serialize, Deserialize)]
#[diesel(sql_type = Text)]
pub enum DetectionMethod {
    ExactHash,
    FuzzyMatch,
    UrlMatch,
    Manual,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::ExactHash => "exact_hash",
            DetectionMethod::FuzzyMatch => "fuzzy_match",
            DetectionMethod::UrlMatch => "url_match",
            DetectionMethod::Manual => "manual",
        }
    }
}

impl std::str::FromStr for DetectionMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact_hash" => Ok(DetectionMethod::ExactHash),
            "fuzzy_match" => Ok(DetectionMethod::FuzzyMatch),
            "url_match" => Ok(DetectionMethod::UrlMatch),
            "manual" => Ok(DetectionMethod::Manual),
            other => Err(format!("unknown detection method: {other}")),
        }
    }
}

impl ToSql<Text, Pg> for DetectionMethod {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        <str as ToSql<Text, Pg>>::to_sql(self.as_str(), out)
    }
}

impl FromSql<Text, Pg> for DetectionMethod {
    fn from_sql(bytes: <Pg as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
        let s = <String as FromSql<Text, Pg>>::from_sql(bytes)?;
        s.parse().map_err(|e: String| e.into())
    }
}

/// Registry of content hashes seen (§3 `ContentHash`).
///
/// `simhash_fingerprint` is the unsigned 64-bit Simhash value re-encoded as
/// a signed 64-bit integer for storage; see `crate::fingerprint` for the
/// transform.
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = content_hashes)]
#[diesel(check_for_backend(Pg))]
pub struct ContentHash {
    pub content_hash: String,
    pub first_seen_page_id: Option<Uuid>,
    pub occurrence_count: i32,
    pub simhash_fingerprint: i64,
    pub last_seen_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = content_hashes)]
pub struct NewContentHash {
    pub content_hash: String,
    pub first_seen_page_id: Option<Uuid>,
    pub occurrence_count: i32,
    pub simhash_fingerprint: i64,
}

/// Cluster of pages sharing near-identical content (§3 `DuplicateGroup`).
#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = duplicate_groups)]
#[diesel(check_for_backend(Pg))]
pub struct DuplicateGroup {
    pub id: Uuid,
    pub canonical_page_id: Uuid,
    pub group_size: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Non-canonical member of a [`DuplicateGroup`] (§3
/// `DuplicateRelationship`).
#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = duplicate_relationships)]
#[diesel(check_for_backend(Pg))]
pub struct DuplicateRelationship {
    pub id: Uuid,
    pub group_id: Uuid,
    pub duplicate_page_id: Uuid,
    pub detection_method: DetectionMethod,
    pub similarity_score: Option<i16>,
    pub confidence_threshold: Option<i16>,
    pub detected_by: Option<String>,
    pub detected_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = duplicate_relationships)]
pub struct NewDuplicateRelationship {
    pub id: Uuid,
    pub group_id: Uuid,
    pub duplicate_page_id: Uuid,
    pub detection_method: DetectionMethod,
    pub similarity_score: Option<i16>,
    pub confidence_threshold: Option<i16>,
    pub detected_by: Option<String>,
}

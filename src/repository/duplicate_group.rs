//! Repository for `DuplicateGroup`/`DuplicateRelationship` (C4, §4.4).
//!
//! Atomicity for `group_size` (§3 invariant: `group_size = 1 + count of
//! relationships`) is achieved with an explicit transactional
//! increment/decrement alongside the relationship insert/delete, rather
//! than relying on a DB trigger existing on whatever Postgres instance
//! this runs against (Open Question in SPEC_FULL.md §4.4, recorded in
//! DESIGN.md).

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use uuid::Uuid;

use super::pool::DbPool;
use crate::error::{Error, Result};
use crate::models::{DetectionMethod, DuplicateGroup, DuplicateRelationship, NewDuplicateRelationship};
use crate::schema::{duplicate_groups, duplicate_relationships};

#[derive(Clone)]
pub struct DuplicateGroupRepository {
    pool: DbPool,
}

/// Aggregate stats for a group (§4.4 "Lookups").
#[derive(Debug, Clone, PartialEq)]
pub struct GroupStats {
    pub group_size: i32,
    pub relationship_count: i64,
    pub average_similarity: Option<f64>,
    pub first_detected_at: Option<chrono::DateTime<Utc>>,
    pub last_detected_at: Option<chrono::DateTime<Utc>>,
}

impl DuplicateGroupRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create_group(&self, canonical_page_id: Uuid) -> Result<DuplicateGroup> {
        let mut conn = self.pool.get().await?;
        let now = Utc::now();
        let row = diesel::insert_into(duplicate_groups::table)
            .values((
                duplicate_groups::id.eq(Uuid::now_v7()),
                duplicate_groups::canonical_page_id.eq(canonical_page_id),
                duplicate_groups::group_size.eq(1),
                duplicate_groups::created_at.eq(now),
                duplicate_groups::updated_at.eq(now),
            ))
            .get_result(&mut conn)
            .await?;
        Ok(row)
    }

    pub async fn get(&self, group_id: Uuid) -> Result<Option<DuplicateGroup>> {
        let mut conn = self.pool.get().await?;
        let row = duplicate_groups::table
            .find(group_id)
            .first(&mut conn)
            .await
            .optional()?;
        Ok(row)
    }

    pub async fn get_by_canonical_page(
        &self,
        canonical_page_id: Uuid,
    ) -> Result<Option<DuplicateGroup>> {
        let mut conn = self.pool.get().await?;
        let row = duplicate_groups::table
            .filter(duplicate_groups::canonical_page_id.eq(canonical_page_id))
            .first(&mut conn)
            .await
            .optional()?;
        Ok(row)
    }

    pub async fn get_by_member_page(
        &self,
        duplicate_page_id: Uuid,
    ) -> Result<Option<DuplicateGroup>> {
        let mut conn = self.pool.get().await?;
        let row = duplicate_groups::table
            .inner_join(duplicate_relationships::table)
            .filter(duplicate_relationships::duplicate_page_id.eq(duplicate_page_id))
            .select(DuplicateGroup::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        Ok(row)
    }

    /// Insert a relationship and bump `group_size` atomically, in one
    /// transaction, so a failed insert never leaves the count drifted
    /// (§4.4 "Write ordering").
    pub async fn add_duplicate(
        &self,
        group_id: Uuid,
        duplicate_page_id: Uuid,
        method: DetectionMethod,
        similarity_score: Option<i16>,
        confidence_threshold: Option<i16>,
        detected_by: Option<String>,
    ) -> Result<DuplicateRelationship> {
        if let Some(score) = similarity_score {
            if !(0..=100).contains(&score) {
                return Err(Error::Validation(format!(
                    "similarity_score must be in 0..=100, got {score}"
                )));
            }
        }
        if similarity_score.is_none() && method != DetectionMethod::ExactHash {
            return Err(Error::Validation(
                "similarity_score is required unless detection_method is exact_hash".into(),
            ));
        }

        let mut conn = self.pool.get().await?;
        let group = duplicate_groups::table
            .find(group_id)
            .first::<DuplicateGroup>(&mut conn)
            .await?;
        if group.canonical_page_id == duplicate_page_id {
            return Err(Error::Validation(
                "duplicate_page_id must not equal the group's canonical_page_id".into(),
            ));
        }

        let new_rel = NewDuplicateRelationship {
            id: Uuid::now_v7(),
            group_id,
            duplicate_page_id,
            detection_method: method,
            similarity_score,
            confidence_threshold,
            detected_by,
        };

        let rel = conn
            .transaction::<_, diesel::result::Error, _>(|conn| {
                async move {
                    let rel: DuplicateRelationship = diesel::insert_into(duplicate_relationships::table)
                        .values(&new_rel)
                        .get_result(conn)
                        .await?;
                    diesel::update(duplicate_groups::table.find(group_id))
                        .set((
                            duplicate_groups::group_size.eq(duplicate_groups::group_size + 1),
                            duplicate_groups::updated_at.eq(Utc::now()),
                        ))
                        .execute(conn)
                        .await?;
                    Ok(rel)
                }
                .scope_boxed()
            })
            .await?;
        Ok(rel)
    }

    pub async fn remove_relationship(&self, relationship_id: Uuid) -> Result<()> {
        let mut conn = self.pool.get().await?;
        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            async move {
                let rel: DuplicateRelationship = duplicate_relationships::table
                    .find(relationship_id)
                    .first(conn)
                    .await?;
                diesel::delete(duplicate_relationships::table.find(relationship_id))
                    .execute(conn)
                    .await?;
                diesel::update(duplicate_groups::table.find(rel.group_id))
                    .set((
                        duplicate_groups::group_size.eq(duplicate_groups::group_size - 1),
                        duplicate_groups::updated_at.eq(Utc::now()),
                    ))
                    .execute(conn)
                    .await?;
                Ok(())
            }
            .scope_boxed()
        })
        .await?;
        Ok(())
    }

    /// Cascade-delete a group and all of its relationships.
    pub async fn remove_group(&self, group_id: Uuid) -> Result<()> {
        let mut conn = self.pool.get().await?;
        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            async move {
                diesel::delete(
                    duplicate_relationships::table.filter(duplicate_relationships::group_id.eq(group_id)),
                )
                .execute(conn)
                .await?;
                diesel::delete(duplicate_groups::table.find(group_id))
                    .execute(conn)
                    .await?;
                Ok(())
            }
            .scope_boxed()
        })
        .await?;
        Ok(())
    }

    pub async fn update_similarity_score(&self, relationship_id: Uuid, score: i16) -> Result<()> {
        if !(0..=100).contains(&score) {
            return Err(Error::Validation(format!(
                "similarity_score must be in 0..=100, got {score}"
            )));
        }
        let mut conn = self.pool.get().await?;
        diesel::update(duplicate_relationships::table.find(relationship_id))
            .set(duplicate_relationships::similarity_score.eq(Some(score)))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    pub async fn stats(&self, group_id: Uuid) -> Result<GroupStats> {
        let mut conn = self.pool.get().await?;
        let group: DuplicateGroup = duplicate_groups::table.find(group_id).first(&mut conn).await?;
        let rels: Vec<DuplicateRelationship> = duplicate_relationships::table
            .filter(duplicate_relationships::group_id.eq(group_id))
            .load(&mut conn)
            .await?;

        let scores: Vec<f64> = rels
            .iter()
            .filter_map(|r| r.similarity_score.map(|s| s as f64))
            .collect();
        let average_similarity = if scores.is_empty() {
            None
        } else {
            Some(scores.iter().sum::<f64>() / scores.len() as f64)
        };

        Ok(GroupStats {
            group_size: group.group_size,
            relationship_count: rels.len() as i64,
            average_similarity,
            first_detected_at: rels.iter().map(|r| r.detected_at).min(),
            last_detected_at: rels.iter().map(|r| r.detected_at).max(),
        })
    }

    /// Count of relationships per `detection_method` across every group.
    pub async fn count_by_method(&self) -> Result<Vec<(DetectionMethod, i64)>> {
        let mut conn = self.pool.get().await?;
        let rels: Vec<DuplicateRelationship> = duplicate_relationships::table.load(&mut conn).await?;
        let mut counts: std::collections::HashMap<DetectionMethod, i64> =
            std::collections::HashMap::new();
        for r in rels {
            *counts.entry(r.detection_method).or_insert(0) += 1;
        }
        Ok(counts.into_iter().collect())
    }
}

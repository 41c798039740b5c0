use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::RecommendationStore;
use crate::error::{AppError, Result};
use crate::models::{CandidateKind, RecommendationRecord};

/// Serving table for ranked results. The replace path runs inside one
/// transaction so the read path can never observe rows from two runs.
pub struct PgRecommendationRepo {
    pool: PgPool,
}

impl PgRecommendationRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecommendationStore for PgRecommendationRepo {
    async fn replace_for_user(
        &self,
        user_id: Uuid,
        kind: CandidateKind,
        records: &[RecommendationRecord],
    ) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        sqlx::query("DELETE FROM recommendations WHERE user_id = $1 AND candidate_kind = $2")
            .bind(user_id)
            .bind(kind.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        for record in records {
            sqlx::query(
                r#"
                INSERT INTO recommendations
                    (user_id, candidate_id, candidate_kind, rank,
                     collaborative_score, content_score, final_score, cold_start, generated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(record.user_id)
            .bind(record.candidate_id)
            .bind(record.candidate_kind.as_str())
            .bind(record.rank)
            .bind(record.collaborative_score)
            .bind(record.content_score)
            .bind(record.final_score)
            .bind(record.cold_start)
            .bind(record.generated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }

    async fn fetch_for_user(
        &self,
        user_id: Uuid,
        kind: CandidateKind,
        limit: i64,
    ) -> Result<Vec<RecommendationRecord>> {
        let rows = sqlx::query_as::<
            _,
            (Uuid, i32, f64, f64, f64, bool, DateTime<Utc>),
        >(
            r#"
            SELECT candidate_id, rank, collaborative_score, content_score,
                   final_score, cold_start, generated_at
            FROM recommendations
            WHERE user_id = $1 AND candidate_kind = $2
            ORDER BY rank ASC
            LIMIT $3
            "#,
        )
        .bind(user_id)
        .bind(kind.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(
                |(
                    candidate_id,
                    rank,
                    collaborative_score,
                    content_score,
                    final_score,
                    cold_start,
                    generated_at,
                )| RecommendationRecord {
                    user_id,
                    candidate_id,
                    candidate_kind: kind,
                    rank,
                    collaborative_score,
                    content_score,
                    final_score,
                    cold_start,
                    generated_at,
                },
            )
            .collect())
    }
}

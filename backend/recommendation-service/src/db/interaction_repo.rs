use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::InteractionStore;
use crate::error::{AppError, Result};
use crate::models::{CandidateKind, InteractionDelta, InteractionScore};

pub struct PgInteractionRepo {
    pool: PgPool,
}

impl PgInteractionRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InteractionStore for PgInteractionRepo {
    async fn apply_deltas(&self, deltas: &[InteractionDelta]) -> Result<()> {
        if deltas.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        for delta in deltas {
            // GREATEST keeps the non-negativity invariant even if a future
            // decay pass applies negative deltas.
            sqlx::query(
                r#"
                INSERT INTO interaction_scores (user_id, candidate_id, candidate_kind, score, updated_at)
                VALUES ($1, $2, $3, GREATEST($4, 0), $5)
                ON CONFLICT (user_id, candidate_id, candidate_kind)
                DO UPDATE SET
                    score = GREATEST(interaction_scores.score + EXCLUDED.score, 0),
                    updated_at = GREATEST(interaction_scores.updated_at, EXCLUDED.updated_at)
                "#,
            )
            .bind(delta.user_id)
            .bind(delta.candidate_id)
            .bind(delta.candidate_kind.as_str())
            .bind(delta.delta)
            .bind(delta.occurred_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }

    async fn interactions_for_kind(&self, kind: CandidateKind) -> Result<Vec<InteractionScore>> {
        let rows = sqlx::query_as::<_, (Uuid, Uuid, f64, DateTime<Utc>)>(
            r#"
            SELECT user_id, candidate_id, score, updated_at
            FROM interaction_scores
            WHERE candidate_kind = $1
            "#,
        )
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|(user_id, candidate_id, score, updated_at)| InteractionScore {
                user_id,
                candidate_id,
                candidate_kind: kind,
                score,
                updated_at,
            })
            .collect())
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::PipelineStateStore;
use crate::error::{AppError, Result};
use crate::models::{PipelineStage, StageOutcome, StageStatus};

/// Persisted pipeline bookkeeping: the aggregator watermark and the
/// per-stage outcome history surfaced on the status endpoint.
pub struct PgPipelineStateRepo {
    pool: PgPool,
}

impl PgPipelineStateRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PipelineStateStore for PgPipelineStateRepo {
    async fn watermark(&self, name: &str) -> Result<i64> {
        let row = sqlx::query_as::<_, (i64,)>(
            "SELECT last_event_id FROM pipeline_watermarks WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(row.map(|(id,)| id).unwrap_or(0))
    }

    async fn set_watermark(&self, name: &str, last_event_id: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pipeline_watermarks (name, last_event_id, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (name)
            DO UPDATE SET last_event_id = EXCLUDED.last_event_id, updated_at = NOW()
            "#,
        )
        .bind(name)
        .bind(last_event_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }

    async fn record_stage(
        &self,
        stage: PipelineStage,
        outcome: StageOutcome,
        detail: Option<&str>,
    ) -> Result<()> {
        // Skipped counts as a successful no-op for the health signal; only a
        // failure leaves last_success_at behind.
        let advanced_success = outcome != StageOutcome::Failed;

        sqlx::query(
            r#"
            INSERT INTO pipeline_stage_status (stage, last_outcome, last_run_at, last_success_at, detail)
            VALUES ($1, $2, NOW(), CASE WHEN $3 THEN NOW() ELSE NULL END, $4)
            ON CONFLICT (stage)
            DO UPDATE SET
                last_outcome = EXCLUDED.last_outcome,
                last_run_at = EXCLUDED.last_run_at,
                last_success_at = CASE WHEN $3 THEN EXCLUDED.last_run_at
                                       ELSE pipeline_stage_status.last_success_at END,
                detail = EXCLUDED.detail
            "#,
        )
        .bind(stage.as_str())
        .bind(outcome.as_str())
        .bind(advanced_success)
        .bind(detail)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }

    async fn stage_statuses(&self) -> Result<Vec<StageStatus>> {
        let rows = sqlx::query_as::<
            _,
            (String, String, DateTime<Utc>, Option<DateTime<Utc>>, Option<String>),
        >(
            r#"
            SELECT stage, last_outcome, last_run_at, last_success_at, detail
            FROM pipeline_stage_status
            ORDER BY stage
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        let mut statuses = Vec::with_capacity(rows.len());
        for (stage_raw, outcome_raw, last_run_at, last_success_at, detail) in rows {
            let stage = match stage_raw.as_str() {
                "aggregating" => PipelineStage::Aggregating,
                "training" => PipelineStage::Training,
                "scoring" => PipelineStage::Scoring,
                other => {
                    return Err(AppError::Internal(format!(
                        "unknown pipeline stage in storage: {other}"
                    )))
                }
            };
            let last_outcome = match outcome_raw.as_str() {
                "succeeded" => StageOutcome::Succeeded,
                "skipped" => StageOutcome::Skipped,
                "failed" => StageOutcome::Failed,
                other => {
                    return Err(AppError::Internal(format!(
                        "unknown stage outcome in storage: {other}"
                    )))
                }
            };
            statuses.push(StageStatus {
                stage,
                last_outcome,
                last_run_at,
                last_success_at,
                detail,
            });
        }

        Ok(statuses)
    }
}

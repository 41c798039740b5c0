use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

use super::ModelStore;
use crate::error::{AppError, Result};
use crate::models::{CandidateKind, ModelArtifact, NewModelArtifact};

type FactorMap = HashMap<Uuid, Vec<f64>>;

/// Versioned model artifact storage. Rows are append-only: a failed training
/// run never writes, so the newest committed version is always a good one.
pub struct PgModelRepo {
    pool: PgPool,
}

impl PgModelRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ModelStore for PgModelRepo {
    async fn latest_artifact(&self, kind: CandidateKind) -> Result<Option<ModelArtifact>> {
        let row = sqlx::query_as::<
            _,
            (i64, DateTime<Utc>, i32, Json<FactorMap>, Json<FactorMap>),
        >(
            r#"
            SELECT version, trained_at, factor_dim, user_factors, candidate_factors
            FROM model_artifacts
            WHERE candidate_kind = $1
            ORDER BY version DESC
            LIMIT 1
            "#,
        )
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(row.map(
            |(version, trained_at, factor_dim, user_factors, candidate_factors)| ModelArtifact {
                version,
                candidate_kind: kind,
                trained_at,
                factor_dim: factor_dim as usize,
                user_factors: user_factors.0,
                candidate_factors: candidate_factors.0,
            },
        ))
    }

    async fn insert_artifact(&self, artifact: NewModelArtifact) -> Result<ModelArtifact> {
        let (version,) = sqlx::query_as::<_, (i64,)>(
            r#"
            INSERT INTO model_artifacts (candidate_kind, trained_at, factor_dim, user_factors, candidate_factors)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING version
            "#,
        )
        .bind(artifact.candidate_kind.as_str())
        .bind(artifact.trained_at)
        .bind(artifact.factor_dim as i32)
        .bind(Json(&artifact.user_factors))
        .bind(Json(&artifact.candidate_factors))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(ModelArtifact {
            version,
            candidate_kind: artifact.candidate_kind,
            trained_at: artifact.trained_at,
            factor_dim: artifact.factor_dim,
            user_factors: artifact.user_factors,
            candidate_factors: artifact.candidate_factors,
        })
    }
}

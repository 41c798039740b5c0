use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashSet;
use tracing::warn;
use uuid::Uuid;

use super::ProfileStore;
use crate::error::{AppError, Result};
use crate::models::{CandidateKind, CandidateProfile, Industry, UserPreference};

/// Read-only adapter over the preference and candidate snapshots owned by the
/// users/mentor-profile and materials collaborators.
pub struct PgProfileRepo {
    pool: PgPool,
}

impl PgProfileRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse_industries(raw: &[String]) -> HashSet<Industry> {
    raw.iter()
        .filter_map(|s| {
            let parsed = Industry::parse(s);
            if parsed.is_none() {
                warn!(industry = %s, "unknown industry tag, ignoring");
            }
            parsed
        })
        .collect()
}

#[async_trait]
impl ProfileStore for PgProfileRepo {
    async fn known_candidates(&self) -> Result<HashSet<(Uuid, CandidateKind)>> {
        let rows = sqlx::query_as::<_, (Uuid, String)>(
            "SELECT candidate_id, candidate_kind FROM candidate_profiles",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(rows
            .into_iter()
            .filter_map(|(id, kind)| CandidateKind::parse(&kind).map(|k| (id, k)))
            .collect())
    }

    async fn preferences(&self) -> Result<Vec<UserPreference>> {
        let rows = sqlx::query_as::<
            _,
            (Uuid, Vec<String>, Vec<String>, Option<i32>, DateTime<Utc>),
        >(
            r#"
            SELECT user_id, desired_industries, desired_languages, min_experience_years, updated_at
            FROM user_preferences
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(
                |(user_id, industries, languages, min_experience_years, updated_at)| {
                    UserPreference {
                        user_id,
                        desired_industries: parse_industries(&industries),
                        desired_languages: languages.into_iter().collect(),
                        min_experience_years,
                        updated_at,
                    }
                },
            )
            .collect())
    }

    async fn candidate_profiles(&self, kind: CandidateKind) -> Result<Vec<CandidateProfile>> {
        let rows = sqlx::query_as::<_, (Uuid, Vec<String>, Vec<String>, Option<i32>)>(
            r#"
            SELECT candidate_id, industries, skills, experience_years
            FROM candidate_profiles
            WHERE candidate_kind = $1
            "#,
        )
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(
                |(candidate_id, industries, skills, experience_years)| CandidateProfile {
                    candidate_id,
                    kind,
                    industries: parse_industries(&industries),
                    skills: skills.into_iter().collect(),
                    experience_years,
                },
            )
            .collect())
    }

    async fn exclusions_for(&self, user_id: Uuid, kind: CandidateKind) -> Result<HashSet<Uuid>> {
        let rows = sqlx::query_as::<_, (Uuid,)>(
            r#"
            SELECT candidate_id
            FROM candidate_exclusions
            WHERE user_id = $1 AND candidate_kind = $2
            "#,
        )
        .bind(user_id)
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

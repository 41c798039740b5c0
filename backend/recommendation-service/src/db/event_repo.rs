use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use super::EventStore;
use crate::error::{AppError, Result};
use crate::models::{CandidateKind, EngagementEvent, EventType};

/// Reads the append-only engagement feed written by the scheduling, ratings
/// and profile-view collaborators.
pub struct PgEventRepo {
    pool: PgPool,
}

impl PgEventRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventStore for PgEventRepo {
    async fn fetch_events_after(
        &self,
        after_id: i64,
        limit: i64,
    ) -> Result<Vec<EngagementEvent>> {
        let rows = sqlx::query_as::<
            _,
            (
                i64,
                Uuid,
                Uuid,
                String,
                String,
                Option<i16>,
                DateTime<Utc>,
            ),
        >(
            r#"
            SELECT id, user_id, candidate_id, candidate_kind, event_type, rating, occurred_at
            FROM engagement_events
            WHERE id > $1
            ORDER BY id ASC
            LIMIT $2
            "#,
        )
        .bind(after_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        let mut events = Vec::with_capacity(rows.len());
        for (id, user_id, candidate_id, kind_raw, event_raw, rating, occurred_at) in rows {
            let (Some(candidate_kind), Some(event_type)) =
                (CandidateKind::parse(&kind_raw), EventType::parse(&event_raw))
            else {
                // Constraint-violating rows can only appear if the feed schema
                // drifts; skip them rather than fail the whole page.
                warn!(event_id = id, kind = %kind_raw, event = %event_raw, "unparseable engagement event, skipping");
                continue;
            };

            events.push(EngagementEvent {
                id,
                user_id,
                candidate_id,
                candidate_kind,
                event_type,
                rating,
                occurred_at,
            });
        }

        Ok(events)
    }
}

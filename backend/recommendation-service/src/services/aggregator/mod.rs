/// Interaction Aggregator
///
/// Turns raw engagement events into decayed, weighted interaction scores per
/// (user, candidate) pair. Contributions follow `weight × e^(-λ × age_days)`
/// with λ derived from a configurable half-life, so a signal loses half its
/// value every `half_life_days`.
///
/// Idempotence comes from the persisted event-id watermark: each run only
/// consumes events strictly above the last committed id, and the watermark
/// only advances after the page's score upserts have committed.
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{EventStore, InteractionStore, PipelineStateStore, ProfileStore};
use crate::error::Result;
use crate::models::{CandidateKind, EngagementEvent, EventType, InteractionDelta};

pub const WATERMARK_NAME: &str = "interaction_aggregator";

/// Aggregator tuning. Weights follow the platform defaults: a completed
/// booking is the strongest signal, a profile view the weakest, and an
/// explicit rating scales linearly up to `rating_weight_max` at five stars.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub half_life_days: f64,
    pub page_size: i64,
    pub view_weight: f64,
    pub bookmark_weight: f64,
    pub booking_weight: f64,
    pub rating_weight_max: f64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            half_life_days: 30.0,
            page_size: 500,
            view_weight: 1.0,
            bookmark_weight: 3.0,
            booking_weight: 5.0,
            rating_weight_max: 2.0,
        }
    }
}

impl AggregatorConfig {
    /// Decay rate λ such that a contribution halves every `half_life_days`.
    pub fn decay_rate(&self) -> f64 {
        std::f64::consts::LN_2 / self.half_life_days
    }

    pub fn base_weight(&self, event_type: EventType, rating: Option<i16>) -> f64 {
        match event_type {
            EventType::ProfileView => self.view_weight,
            EventType::Bookmark => self.bookmark_weight,
            EventType::BookingCompleted => self.booking_weight,
            EventType::Rating => {
                let stars = rating.unwrap_or(0).clamp(1, 5) as f64;
                self.rating_weight_max * (stars / 5.0)
            }
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.half_life_days <= 0.0 {
            return Err(format!(
                "half-life must be positive, got {}",
                self.half_life_days
            ));
        }
        if self.page_size <= 0 {
            return Err(format!("page size must be positive, got {}", self.page_size));
        }
        if self.view_weight < 0.0
            || self.bookmark_weight < 0.0
            || self.booking_weight < 0.0
            || self.rating_weight_max < 0.0
        {
            return Err("event weights must be non-negative".to_string());
        }
        Ok(())
    }
}

/// Decayed contribution of a single event observed `age_days` after it
/// occurred. Events from the future (clock skew) contribute at full weight.
pub fn decayed_contribution(base_weight: f64, age_days: f64, decay_rate: f64) -> f64 {
    base_weight * (-decay_rate * age_days.max(0.0)).exp()
}

#[derive(Debug, Clone, Default)]
pub struct AggregationReport {
    pub events_processed: u64,
    pub contributions_applied: u64,
    pub skipped_unknown_candidate: u64,
    pub watermark: i64,
}

pub struct InteractionAggregator {
    events: Arc<dyn EventStore>,
    interactions: Arc<dyn InteractionStore>,
    profiles: Arc<dyn ProfileStore>,
    state: Arc<dyn PipelineStateStore>,
    config: AggregatorConfig,
}

impl InteractionAggregator {
    pub fn new(
        events: Arc<dyn EventStore>,
        interactions: Arc<dyn InteractionStore>,
        profiles: Arc<dyn ProfileStore>,
        state: Arc<dyn PipelineStateStore>,
        config: AggregatorConfig,
    ) -> Self {
        Self {
            events,
            interactions,
            profiles,
            state,
            config,
        }
    }

    /// Consume every event above the watermark and fold it into the
    /// interaction scores. `now` is the decay reference point.
    pub async fn aggregate(&self, now: DateTime<Utc>) -> Result<AggregationReport> {
        let mut watermark = self.state.watermark(WATERMARK_NAME).await?;
        let known_candidates = self.profiles.known_candidates().await?;
        let decay_rate = self.config.decay_rate();

        let mut report = AggregationReport {
            watermark,
            ..Default::default()
        };

        loop {
            let page = self
                .events
                .fetch_events_after(watermark, self.config.page_size)
                .await?;
            if page.is_empty() {
                break;
            }

            let page_len = page.len();
            let last_id = page.last().map(|e| e.id).unwrap_or(watermark);
            let deltas = self.fold_page(&page, &known_candidates, decay_rate, now, &mut report);

            self.interactions.apply_deltas(&deltas).await?;
            // Commit the cursor only after the page's scores are durable.
            self.state.set_watermark(WATERMARK_NAME, last_id).await?;

            watermark = last_id;
            report.watermark = watermark;
            report.contributions_applied += deltas.len() as u64;

            if (page_len as i64) < self.config.page_size {
                break;
            }
        }

        info!(
            events = report.events_processed,
            contributions = report.contributions_applied,
            skipped = report.skipped_unknown_candidate,
            watermark = report.watermark,
            "interaction aggregation complete"
        );

        Ok(report)
    }

    fn fold_page(
        &self,
        page: &[EngagementEvent],
        known_candidates: &HashSet<(Uuid, CandidateKind)>,
        decay_rate: f64,
        now: DateTime<Utc>,
        report: &mut AggregationReport,
    ) -> Vec<InteractionDelta> {
        let mut folded: HashMap<(Uuid, Uuid, CandidateKind), (f64, DateTime<Utc>)> =
            HashMap::new();

        for event in page {
            report.events_processed += 1;

            if !known_candidates.contains(&(event.candidate_id, event.candidate_kind)) {
                report.skipped_unknown_candidate += 1;
                warn!(
                    candidate_id = %event.candidate_id,
                    kind = %event.candidate_kind,
                    "event for unknown candidate, skipping"
                );
                continue;
            }

            let base = self.config.base_weight(event.event_type, event.rating);
            let age_days =
                (now - event.occurred_at).num_milliseconds() as f64 / (86_400.0 * 1000.0);
            let contribution = decayed_contribution(base, age_days, decay_rate);

            let entry = folded
                .entry((event.user_id, event.candidate_id, event.candidate_kind))
                .or_insert((0.0, event.occurred_at));
            entry.0 += contribution;
            if event.occurred_at > entry.1 {
                entry.1 = event.occurred_at;
            }
        }

        let mut deltas: Vec<InteractionDelta> = folded
            .into_iter()
            .map(
                |((user_id, candidate_id, candidate_kind), (delta, occurred_at))| {
                    InteractionDelta {
                        user_id,
                        candidate_id,
                        candidate_kind,
                        delta,
                        occurred_at,
                    }
                },
            )
            .collect();
        // Stable upsert order keeps runs reproducible.
        deltas.sort_by(|a, b| {
            (a.user_id, a.candidate_id, a.candidate_kind.as_str()).cmp(&(
                b.user_id,
                b.candidate_id,
                b.candidate_kind.as_str(),
            ))
        });
        deltas
    }
}

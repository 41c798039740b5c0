//! In-memory store implementations for pipeline tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use uuid::Uuid;

use recommendation_service::db::{
    EventStore, InteractionStore, ModelStore, PipelineStateStore, ProfileStore,
    RecommendationStore,
};
use recommendation_service::error::{AppError, Result};
use recommendation_service::models::{
    CandidateKind, CandidateProfile, EngagementEvent, EventType, Industry, InteractionDelta,
    InteractionScore, ModelArtifact, NewModelArtifact, PipelineStage, RecommendationRecord,
    StageOutcome, StageStatus, UserPreference,
};
use recommendation_service::services::pipeline::CycleLease;

#[derive(Default)]
pub struct InMemoryEventStore {
    events: Mutex<Vec<EngagementEvent>>,
}

impl InMemoryEventStore {
    pub fn push(&self, event: EngagementEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn fetch_events_after(
        &self,
        after_id: i64,
        limit: i64,
    ) -> Result<Vec<EngagementEvent>> {
        let mut page: Vec<EngagementEvent> = self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.id > after_id)
            .cloned()
            .collect();
        page.sort_by_key(|e| e.id);
        page.truncate(limit as usize);
        Ok(page)
    }
}

#[derive(Default)]
pub struct InMemoryInteractionStore {
    rows: Mutex<HashMap<(Uuid, Uuid, CandidateKind), (f64, DateTime<Utc>)>>,
}

impl InMemoryInteractionStore {
    pub fn score_of(&self, user_id: Uuid, candidate_id: Uuid, kind: CandidateKind) -> Option<f64> {
        self.rows
            .lock()
            .unwrap()
            .get(&(user_id, candidate_id, kind))
            .map(|(score, _)| *score)
    }

    pub fn all_scores(&self) -> Vec<f64> {
        self.rows
            .lock()
            .unwrap()
            .values()
            .map(|(score, _)| *score)
            .collect()
    }
}

#[async_trait]
impl InteractionStore for InMemoryInteractionStore {
    async fn apply_deltas(&self, deltas: &[InteractionDelta]) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        for delta in deltas {
            let entry = rows
                .entry((delta.user_id, delta.candidate_id, delta.candidate_kind))
                .or_insert((0.0, delta.occurred_at));
            entry.0 = (entry.0 + delta.delta).max(0.0);
            if delta.occurred_at > entry.1 {
                entry.1 = delta.occurred_at;
            }
        }
        Ok(())
    }

    async fn interactions_for_kind(&self, kind: CandidateKind) -> Result<Vec<InteractionScore>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|((_, _, k), _)| *k == kind)
            .map(
                |((user_id, candidate_id, k), (score, updated_at))| InteractionScore {
                    user_id: *user_id,
                    candidate_id: *candidate_id,
                    candidate_kind: *k,
                    score: *score,
                    updated_at: *updated_at,
                },
            )
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryProfileStore {
    pub preferences: Mutex<Vec<UserPreference>>,
    pub profiles: Mutex<Vec<CandidateProfile>>,
    pub exclusions: Mutex<HashSet<(Uuid, Uuid, CandidateKind)>>,
}

impl InMemoryProfileStore {
    pub fn add_preference(&self, preference: UserPreference) {
        self.preferences.lock().unwrap().push(preference);
    }

    pub fn add_profile(&self, profile: CandidateProfile) {
        self.profiles.lock().unwrap().push(profile);
    }

    pub fn exclude(&self, user_id: Uuid, candidate_id: Uuid, kind: CandidateKind) {
        self.exclusions
            .lock()
            .unwrap()
            .insert((user_id, candidate_id, kind));
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn known_candidates(&self) -> Result<HashSet<(Uuid, CandidateKind)>> {
        Ok(self
            .profiles
            .lock()
            .unwrap()
            .iter()
            .map(|p| (p.candidate_id, p.kind))
            .collect())
    }

    async fn preferences(&self) -> Result<Vec<UserPreference>> {
        Ok(self.preferences.lock().unwrap().clone())
    }

    async fn candidate_profiles(&self, kind: CandidateKind) -> Result<Vec<CandidateProfile>> {
        Ok(self
            .profiles
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.kind == kind)
            .cloned()
            .collect())
    }

    async fn exclusions_for(&self, user_id: Uuid, kind: CandidateKind) -> Result<HashSet<Uuid>> {
        Ok(self
            .exclusions
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _, k)| *u == user_id && *k == kind)
            .map(|(_, c, _)| *c)
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryModelStore {
    artifacts: Mutex<Vec<ModelArtifact>>,
}

impl InMemoryModelStore {
    pub fn version_count(&self) -> usize {
        self.artifacts.lock().unwrap().len()
    }

    pub fn seed_artifact(&self, artifact: ModelArtifact) {
        self.artifacts.lock().unwrap().push(artifact);
    }
}

#[async_trait]
impl ModelStore for InMemoryModelStore {
    async fn latest_artifact(&self, kind: CandidateKind) -> Result<Option<ModelArtifact>> {
        Ok(self
            .artifacts
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.candidate_kind == kind)
            .max_by_key(|a| a.version)
            .cloned())
    }

    async fn insert_artifact(&self, artifact: NewModelArtifact) -> Result<ModelArtifact> {
        let mut artifacts = self.artifacts.lock().unwrap();
        let version = artifacts.iter().map(|a| a.version).max().unwrap_or(0) + 1;
        let stored = ModelArtifact {
            version,
            candidate_kind: artifact.candidate_kind,
            trained_at: artifact.trained_at,
            factor_dim: artifact.factor_dim,
            user_factors: artifact.user_factors,
            candidate_factors: artifact.candidate_factors,
        };
        artifacts.push(stored.clone());
        Ok(stored)
    }
}

#[derive(Default)]
pub struct InMemoryRecommendationStore {
    rows: Mutex<HashMap<(Uuid, CandidateKind), Vec<RecommendationRecord>>>,
}

impl InMemoryRecommendationStore {
    pub fn set_for_user(&self, user_id: Uuid, kind: CandidateKind) -> Vec<RecommendationRecord> {
        self.rows
            .lock()
            .unwrap()
            .get(&(user_id, kind))
            .cloned()
            .unwrap_or_default()
    }

    pub fn user_count(&self, kind: CandidateKind) -> usize {
        self.rows
            .lock()
            .unwrap()
            .keys()
            .filter(|(_, k)| *k == kind)
            .count()
    }

    pub fn seed(&self, user_id: Uuid, kind: CandidateKind, records: Vec<RecommendationRecord>) {
        self.rows.lock().unwrap().insert((user_id, kind), records);
    }
}

#[async_trait]
impl RecommendationStore for InMemoryRecommendationStore {
    async fn replace_for_user(
        &self,
        user_id: Uuid,
        kind: CandidateKind,
        records: &[RecommendationRecord],
    ) -> Result<()> {
        self.rows
            .lock()
            .unwrap()
            .insert((user_id, kind), records.to_vec());
        Ok(())
    }

    async fn fetch_for_user(
        &self,
        user_id: Uuid,
        kind: CandidateKind,
        limit: i64,
    ) -> Result<Vec<RecommendationRecord>> {
        let mut records = self.set_for_user(user_id, kind);
        records.sort_by_key(|r| r.rank);
        records.truncate(limit as usize);
        Ok(records)
    }
}

/// Wraps a store and fails every replace for one chosen user, standing in
/// for a storage error mid-batch.
pub struct FailingRecommendationStore {
    pub inner: InMemoryRecommendationStore,
    pub fail_for: Uuid,
}

#[async_trait]
impl RecommendationStore for FailingRecommendationStore {
    async fn replace_for_user(
        &self,
        user_id: Uuid,
        kind: CandidateKind,
        records: &[RecommendationRecord],
    ) -> Result<()> {
        if user_id == self.fail_for {
            return Err(AppError::Database("simulated write failure".to_string()));
        }
        self.inner.replace_for_user(user_id, kind, records).await
    }

    async fn fetch_for_user(
        &self,
        user_id: Uuid,
        kind: CandidateKind,
        limit: i64,
    ) -> Result<Vec<RecommendationRecord>> {
        self.inner.fetch_for_user(user_id, kind, limit).await
    }
}

#[derive(Default)]
pub struct InMemoryPipelineStateStore {
    watermarks: Mutex<HashMap<String, i64>>,
    stages: Mutex<HashMap<&'static str, StageStatus>>,
}

impl InMemoryPipelineStateStore {
    pub fn stage_outcome(&self, stage: PipelineStage) -> Option<StageOutcome> {
        self.stages
            .lock()
            .unwrap()
            .get(stage.as_str())
            .map(|s| s.last_outcome)
    }
}

#[async_trait]
impl PipelineStateStore for InMemoryPipelineStateStore {
    async fn watermark(&self, name: &str) -> Result<i64> {
        Ok(*self.watermarks.lock().unwrap().get(name).unwrap_or(&0))
    }

    async fn set_watermark(&self, name: &str, last_event_id: i64) -> Result<()> {
        self.watermarks
            .lock()
            .unwrap()
            .insert(name.to_string(), last_event_id);
        Ok(())
    }

    async fn record_stage(
        &self,
        stage: PipelineStage,
        outcome: StageOutcome,
        detail: Option<&str>,
    ) -> Result<()> {
        let mut stages = self.stages.lock().unwrap();
        let now = Utc::now();
        let previous_success = stages.get(stage.as_str()).and_then(|s| s.last_success_at);
        stages.insert(
            stage.as_str(),
            StageStatus {
                stage,
                last_outcome: outcome,
                last_run_at: now,
                last_success_at: if outcome != StageOutcome::Failed {
                    Some(now)
                } else {
                    previous_success
                },
                detail: detail.map(|d| d.to_string()),
            },
        );
        Ok(())
    }

    async fn stage_statuses(&self) -> Result<Vec<StageStatus>> {
        Ok(self.stages.lock().unwrap().values().cloned().collect())
    }
}

/// Single-process lease stand-in.
#[derive(Default)]
pub struct InMemoryLease {
    held: Mutex<bool>,
}

#[async_trait]
impl CycleLease for InMemoryLease {
    async fn try_acquire(&self) -> anyhow::Result<bool> {
        let mut held = self.held.lock().unwrap();
        if *held {
            Ok(false)
        } else {
            *held = true;
            Ok(true)
        }
    }

    async fn renew(&self) -> anyhow::Result<bool> {
        Ok(*self.held.lock().unwrap())
    }

    async fn release(&self) -> anyhow::Result<()> {
        *self.held.lock().unwrap() = false;
        Ok(())
    }
}

/// Lease that is always held elsewhere.
pub struct DeniedLease;

#[async_trait]
impl CycleLease for DeniedLease {
    async fn try_acquire(&self) -> anyhow::Result<bool> {
        Ok(false)
    }

    async fn renew(&self) -> anyhow::Result<bool> {
        Ok(false)
    }

    async fn release(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

// -- fixture helpers ---------------------------------------------------------

pub fn uuid(n: u128) -> Uuid {
    Uuid::from_u128(n)
}

pub fn event(
    id: i64,
    user: Uuid,
    candidate: Uuid,
    event_type: EventType,
    rating: Option<i16>,
    days_ago: i64,
) -> EngagementEvent {
    EngagementEvent {
        id,
        user_id: user,
        candidate_id: candidate,
        candidate_kind: CandidateKind::Mentor,
        event_type,
        rating,
        occurred_at: Utc::now() - chrono::Duration::days(days_ago),
    }
}

pub fn mentor(id: Uuid, industries: &[Industry], skills: &[&str], years: i32) -> CandidateProfile {
    CandidateProfile {
        candidate_id: id,
        kind: CandidateKind::Mentor,
        industries: industries.iter().copied().collect(),
        skills: skills.iter().map(|s| s.to_string()).collect(),
        experience_years: Some(years),
    }
}

pub fn preference(user: Uuid, industries: &[Industry], languages: &[&str]) -> UserPreference {
    UserPreference {
        user_id: user,
        desired_industries: industries.iter().copied().collect(),
        desired_languages: languages.iter().map(|s| s.to_string()).collect(),
        min_experience_years: None,
        updated_at: Utc::now(),
    }
}

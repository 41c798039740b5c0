//! Storage seams for the pipeline.
//!
//! Services talk to these traits, not to SQL. The `Pg*` repositories are the
//! production implementations over a shared `PgPool`; tests substitute
//! in-memory implementations.

pub mod event_repo;
pub mod interaction_repo;
pub mod model_repo;
pub mod pipeline_state_repo;
pub mod profile_repo;
pub mod recommendation_repo;

pub use event_repo::PgEventRepo;
pub use interaction_repo::PgInteractionRepo;
pub use model_repo::PgModelRepo;
pub use pipeline_state_repo::PgPipelineStateRepo;
pub use profile_repo::PgProfileRepo;
pub use recommendation_repo::PgRecommendationRepo;

use crate::error::Result;
use crate::models::{
    CandidateKind, CandidateProfile, EngagementEvent, InteractionDelta, InteractionScore,
    ModelArtifact, NewModelArtifact, PipelineStage, RecommendationRecord, StageOutcome,
    StageStatus, UserPreference,
};
use async_trait::async_trait;
use std::collections::HashSet;
use uuid::Uuid;

/// Append-only behavioral event feed, paged by id above a watermark.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn fetch_events_after(&self, after_id: i64, limit: i64)
        -> Result<Vec<EngagementEvent>>;
}

#[async_trait]
pub trait InteractionStore: Send + Sync {
    /// Add contributions to interaction scores. Scores never drop below zero.
    async fn apply_deltas(&self, deltas: &[InteractionDelta]) -> Result<()>;

    async fn interactions_for_kind(&self, kind: CandidateKind) -> Result<Vec<InteractionScore>>;
}

/// Read-only view over collaborator-owned preference and profile snapshots.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn known_candidates(&self) -> Result<HashSet<(Uuid, CandidateKind)>>;

    async fn preferences(&self) -> Result<Vec<UserPreference>>;

    async fn candidate_profiles(&self, kind: CandidateKind) -> Result<Vec<CandidateProfile>>;

    /// Candidates the scheduling collaborator forbids for this user
    /// (already booked, blocked).
    async fn exclusions_for(&self, user_id: Uuid, kind: CandidateKind) -> Result<HashSet<Uuid>>;
}

#[async_trait]
pub trait ModelStore: Send + Sync {
    async fn latest_artifact(&self, kind: CandidateKind) -> Result<Option<ModelArtifact>>;

    /// Persist a new artifact version. Existing versions are never touched.
    async fn insert_artifact(&self, artifact: NewModelArtifact) -> Result<ModelArtifact>;
}

#[async_trait]
pub trait RecommendationStore: Send + Sync {
    /// Atomically swap the full recommendation set for (user, kind). A reader
    /// sees either the old set or the new one, never a mix.
    async fn replace_for_user(
        &self,
        user_id: Uuid,
        kind: CandidateKind,
        records: &[RecommendationRecord],
    ) -> Result<()>;

    async fn fetch_for_user(
        &self,
        user_id: Uuid,
        kind: CandidateKind,
        limit: i64,
    ) -> Result<Vec<RecommendationRecord>>;
}

#[async_trait]
pub trait PipelineStateStore: Send + Sync {
    async fn watermark(&self, name: &str) -> Result<i64>;

    async fn set_watermark(&self, name: &str, last_event_id: i64) -> Result<()>;

    async fn record_stage(
        &self,
        stage: PipelineStage,
        outcome: StageOutcome,
        detail: Option<&str>,
    ) -> Result<()>;

    async fn stage_statuses(&self) -> Result<Vec<StageStatus>>;
}

// Domain models for the recommendation pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// What a recommendation points at: a mentor profile or a learning material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateKind {
    Mentor,
    Material,
}

impl CandidateKind {
    pub const ALL: [CandidateKind; 2] = [CandidateKind::Mentor, CandidateKind::Material];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mentor => "mentor",
            Self::Material => "material",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "mentor" => Some(Self::Mentor),
            "material" => Some(Self::Material),
            _ => None,
        }
    }
}

impl std::fmt::Display for CandidateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Behavioral event type. Closed set: every inbound event maps to exactly one
/// of these variants or is rejected at the feed boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ProfileView,
    Bookmark,
    BookingCompleted,
    Rating,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProfileView => "profile_view",
            Self::Bookmark => "bookmark",
            Self::BookingCompleted => "booking_completed",
            Self::Rating => "rating",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "profile_view" => Some(Self::ProfileView),
            "bookmark" => Some(Self::Bookmark),
            "booking_completed" => Some(Self::BookingCompleted),
            "rating" => Some(Self::Rating),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Industry verticals users can declare interest in and candidates belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Industry {
    WebDevelopment,
    MobileDevelopment,
    DataScience,
    MachineLearning,
    DevOps,
    Security,
    Design,
    Product,
    Marketing,
    Finance,
    Education,
}

impl Industry {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WebDevelopment => "web_development",
            Self::MobileDevelopment => "mobile_development",
            Self::DataScience => "data_science",
            Self::MachineLearning => "machine_learning",
            Self::DevOps => "devops",
            Self::Security => "security",
            Self::Design => "design",
            Self::Product => "product",
            Self::Marketing => "marketing",
            Self::Finance => "finance",
            Self::Education => "education",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "web_development" => Some(Self::WebDevelopment),
            "mobile_development" => Some(Self::MobileDevelopment),
            "data_science" => Some(Self::DataScience),
            "machine_learning" => Some(Self::MachineLearning),
            "devops" => Some(Self::DevOps),
            "security" => Some(Self::Security),
            "design" => Some(Self::Design),
            "product" => Some(Self::Product),
            "marketing" => Some(Self::Marketing),
            "finance" => Some(Self::Finance),
            "education" => Some(Self::Education),
            _ => None,
        }
    }
}

/// Raw behavioral event from the append-only feed. Read-only to this service.
#[derive(Debug, Clone)]
pub struct EngagementEvent {
    pub id: i64,
    pub user_id: Uuid,
    pub candidate_id: Uuid,
    pub candidate_kind: CandidateKind,
    pub event_type: EventType,
    pub rating: Option<i16>,
    pub occurred_at: DateTime<Utc>,
}

/// Decayed, weighted accumulation of a user's signals toward one candidate.
#[derive(Debug, Clone)]
pub struct InteractionScore {
    pub user_id: Uuid,
    pub candidate_id: Uuid,
    pub candidate_kind: CandidateKind,
    pub score: f64,
    pub updated_at: DateTime<Utc>,
}

/// One aggregation run's additive contribution to an interaction score.
#[derive(Debug, Clone)]
pub struct InteractionDelta {
    pub user_id: Uuid,
    pub candidate_id: Uuid,
    pub candidate_kind: CandidateKind,
    pub delta: f64,
    pub occurred_at: DateTime<Utc>,
}

/// Declared preferences, owned by the profile collaborator.
#[derive(Debug, Clone)]
pub struct UserPreference {
    pub user_id: Uuid,
    pub desired_industries: HashSet<Industry>,
    pub desired_languages: HashSet<String>,
    pub min_experience_years: Option<i32>,
    pub updated_at: DateTime<Utc>,
}

/// Candidate attribute snapshot sourced from the mentor/material collaborators.
#[derive(Debug, Clone)]
pub struct CandidateProfile {
    pub candidate_id: Uuid,
    pub kind: CandidateKind,
    pub industries: HashSet<Industry>,
    pub skills: HashSet<String>,
    pub experience_years: Option<i32>,
}

/// Trained latent-factor model. Immutable once persisted; consumers always
/// read the highest committed version for a kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: i64,
    pub candidate_kind: CandidateKind,
    pub trained_at: DateTime<Utc>,
    pub factor_dim: usize,
    pub user_factors: HashMap<Uuid, Vec<f64>>,
    pub candidate_factors: HashMap<Uuid, Vec<f64>>,
}

impl ModelArtifact {
    pub fn user_factor(&self, user_id: &Uuid) -> Option<&[f64]> {
        self.user_factors.get(user_id).map(Vec::as_slice)
    }

    pub fn candidate_factor(&self, candidate_id: &Uuid) -> Option<&[f64]> {
        self.candidate_factors.get(candidate_id).map(Vec::as_slice)
    }
}

/// A freshly trained artifact before the store assigns its version.
#[derive(Debug, Clone)]
pub struct NewModelArtifact {
    pub candidate_kind: CandidateKind,
    pub trained_at: DateTime<Utc>,
    pub factor_dim: usize,
    pub user_factors: HashMap<Uuid, Vec<f64>>,
    pub candidate_factors: HashMap<Uuid, Vec<f64>>,
}

/// One ranked row of the serving table. All rows written for a (user, kind)
/// in one scoring pass share the same `generated_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationRecord {
    pub user_id: Uuid,
    pub candidate_id: Uuid,
    pub candidate_kind: CandidateKind,
    pub rank: i32,
    pub collaborative_score: f64,
    pub content_score: f64,
    pub final_score: f64,
    pub cold_start: bool,
    pub generated_at: DateTime<Utc>,
}

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Aggregating,
    Training,
    Scoring,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aggregating => "aggregating",
            Self::Training => "training",
            Self::Scoring => "scoring",
        }
    }

    /// Successor in the fixed aggregate → train → score order.
    pub fn next(&self) -> Option<PipelineStage> {
        match self {
            Self::Aggregating => Some(Self::Training),
            Self::Training => Some(Self::Scoring),
            Self::Scoring => None,
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Succeeded,
    Skipped,
    Failed,
}

impl StageOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Persisted per-stage status, surfaced on the status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageStatus {
    pub stage: PipelineStage,
    pub last_outcome: StageOutcome,
    pub last_run_at: DateTime<Utc>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub detail: Option<String>,
}

/// Collaborative Filtering Trainer
///
/// Builds a sparse user×candidate confidence matrix from the current
/// interaction scores and fits a latent-factor model per candidate kind.
/// A corpus below the configured minimums is skipped, not failed: the
/// previous artifact stays authoritative, and the scoring stage falls back
/// to pure content-based ranking for pairs without factors.
pub mod factorization;

pub use factorization::{FactorizationConfig, FactorizationError};

use chrono::Utc;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{InteractionStore, ModelStore};
use crate::error::{AppError, Result};
use crate::models::{CandidateKind, ModelArtifact, NewModelArtifact};

#[derive(Debug, Clone)]
pub struct TrainerConfig {
    pub factorization: FactorizationConfig,
    /// Linear scaling from interaction score to confidence:
    /// conf = 1 + confidence_weight × score.
    pub confidence_weight: f64,
    pub min_users: usize,
    pub min_candidates: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            factorization: FactorizationConfig::default(),
            confidence_weight: 1.0,
            min_users: 5,
            min_candidates: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NoInteractions,
    TooFewUsers { have: usize, need: usize },
    TooFewCandidates { have: usize, need: usize },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoInteractions => write!(f, "no interactions recorded"),
            Self::TooFewUsers { have, need } => {
                write!(f, "only {have} distinct users, need {need}")
            }
            Self::TooFewCandidates { have, need } => {
                write!(f, "only {have} distinct candidates, need {need}")
            }
        }
    }
}

pub enum TrainOutcome {
    Trained(ModelArtifact),
    Skipped(SkipReason),
}

pub struct CfTrainer {
    interactions: Arc<dyn InteractionStore>,
    models: Arc<dyn ModelStore>,
    config: TrainerConfig,
}

impl CfTrainer {
    pub fn new(
        interactions: Arc<dyn InteractionStore>,
        models: Arc<dyn ModelStore>,
        config: TrainerConfig,
    ) -> Self {
        Self {
            interactions,
            models,
            config,
        }
    }

    /// Train a fresh artifact for one kind. On any error the previously
    /// persisted artifact is left untouched.
    pub async fn train(&self, kind: CandidateKind) -> Result<TrainOutcome> {
        let interactions = self.interactions.interactions_for_kind(kind).await?;

        if interactions.is_empty() {
            info!(kind = %kind, "training skipped: no interactions");
            return Ok(TrainOutcome::Skipped(SkipReason::NoInteractions));
        }

        // Sorted id spaces give stable matrix indices run over run.
        let user_ids: BTreeSet<Uuid> = interactions.iter().map(|i| i.user_id).collect();
        let candidate_ids: BTreeSet<Uuid> = interactions.iter().map(|i| i.candidate_id).collect();

        if user_ids.len() < self.config.min_users {
            let reason = SkipReason::TooFewUsers {
                have: user_ids.len(),
                need: self.config.min_users,
            };
            info!(kind = %kind, %reason, "training skipped");
            return Ok(TrainOutcome::Skipped(reason));
        }
        if candidate_ids.len() < self.config.min_candidates {
            let reason = SkipReason::TooFewCandidates {
                have: candidate_ids.len(),
                need: self.config.min_candidates,
            };
            info!(kind = %kind, %reason, "training skipped");
            return Ok(TrainOutcome::Skipped(reason));
        }

        let user_index: HashMap<Uuid, usize> = user_ids
            .iter()
            .enumerate()
            .map(|(idx, id)| (*id, idx))
            .collect();
        let candidate_index: HashMap<Uuid, usize> = candidate_ids
            .iter()
            .enumerate()
            .map(|(idx, id)| (*id, idx))
            .collect();

        let mut cells: Vec<(usize, usize, f64)> = interactions
            .iter()
            .map(|i| {
                (
                    user_index[&i.user_id],
                    candidate_index[&i.candidate_id],
                    1.0 + self.config.confidence_weight * i.score,
                )
            })
            .collect();
        cells.sort_unstable_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        let fitted = factorization::factorize(
            &cells,
            user_ids.len(),
            candidate_ids.len(),
            &self.config.factorization,
        )
        .map_err(|e| {
            warn!(kind = %kind, error = %e, "training failed, previous artifact retained");
            AppError::Training(e.to_string())
        })?;

        let user_factors: HashMap<Uuid, Vec<f64>> = user_ids
            .iter()
            .zip(fitted.user_factors.iter())
            .map(|(id, f)| (*id, f.to_vec()))
            .collect();
        let candidate_factors: HashMap<Uuid, Vec<f64>> = candidate_ids
            .iter()
            .zip(fitted.item_factors.iter())
            .map(|(id, f)| (*id, f.to_vec()))
            .collect();

        let artifact = self
            .models
            .insert_artifact(NewModelArtifact {
                candidate_kind: kind,
                trained_at: Utc::now(),
                factor_dim: self.config.factorization.factor_dim,
                user_factors,
                candidate_factors,
            })
            .await?;

        info!(
            kind = %kind,
            version = artifact.version,
            users = user_ids.len(),
            candidates = candidate_ids.len(),
            epochs = fitted.epochs_run,
            loss = fitted.final_loss,
            "model artifact trained"
        );

        Ok(TrainOutcome::Trained(artifact))
    }
}

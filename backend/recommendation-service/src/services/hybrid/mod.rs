/// Hybrid Scorer / Ranker
///
/// Blends the trained latent-factor model with content similarity and writes
/// the serving table. Collaborative scores are min-max normalized per user
/// across their candidate pool; pairs without trained factors fall back to
/// pure content-based ranking (α forced to 0).
///
/// Scoring fans out across users with bounded concurrency. Each user's
/// read/blend/write is independent, and one user failing is logged and
/// skipped without aborting the batch.
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{InteractionStore, ModelStore, ProfileStore, RecommendationStore};
use crate::error::Result;
use crate::models::{
    CandidateKind, CandidateProfile, ModelArtifact, RecommendationRecord, UserPreference,
};
use crate::services::content::ContentScorer;

#[derive(Debug, Clone)]
pub struct HybridConfig {
    /// Collaborative share of the final score for warm pairs.
    pub blend_alpha: f64,
    pub max_results: usize,
    pub scoring_concurrency: usize,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            blend_alpha: 0.6,
            max_results: 50,
            scoring_concurrency: 8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScoringReport {
    pub kind: CandidateKind,
    pub users_scored: u64,
    pub users_skipped: u64,
    pub records_written: u64,
    pub generated_at: DateTime<Utc>,
}

pub struct HybridRanker {
    interactions: Arc<dyn InteractionStore>,
    profiles: Arc<dyn ProfileStore>,
    models: Arc<dyn ModelStore>,
    recommendations: Arc<dyn RecommendationStore>,
    content: ContentScorer,
    config: HybridConfig,
}

impl HybridRanker {
    pub fn new(
        interactions: Arc<dyn InteractionStore>,
        profiles: Arc<dyn ProfileStore>,
        models: Arc<dyn ModelStore>,
        recommendations: Arc<dyn RecommendationStore>,
        content: ContentScorer,
        config: HybridConfig,
    ) -> Self {
        Self {
            interactions,
            profiles,
            models,
            recommendations,
            content,
            config,
        }
    }

    /// Score and persist recommendations of one kind for every eligible user
    /// (anyone with a declared preference or an interaction record).
    pub async fn score_kind(&self, kind: CandidateKind) -> Result<ScoringReport> {
        let artifact = self.models.latest_artifact(kind).await?.map(Arc::new);
        let interactions = self.interactions.interactions_for_kind(kind).await?;
        let preferences = self.profiles.preferences().await?;
        let candidates = Arc::new(self.profiles.candidate_profiles(kind).await?);

        let mut last_interaction: HashMap<Uuid, HashMap<Uuid, DateTime<Utc>>> = HashMap::new();
        for row in &interactions {
            last_interaction
                .entry(row.user_id)
                .or_default()
                .insert(row.candidate_id, row.updated_at);
        }

        let preference_map: HashMap<Uuid, UserPreference> = preferences
            .into_iter()
            .map(|p| (p.user_id, p))
            .collect();

        let eligible: BTreeSet<Uuid> = preference_map
            .keys()
            .chain(last_interaction.keys())
            .copied()
            .collect();

        let generated_at = Utc::now();

        let outcomes: Vec<(Uuid, Result<usize>)> = stream::iter(eligible.into_iter().map(|user_id| {
            let profiles = Arc::clone(&self.profiles);
            let recommendations = Arc::clone(&self.recommendations);
            let candidates = Arc::clone(&candidates);
            let artifact = artifact.clone();
            let preference = preference_map.get(&user_id).cloned();
            let user_interactions = last_interaction.remove(&user_id).unwrap_or_default();
            let scorer = self.content.clone();
            let config = self.config.clone();

            async move {
                let result: Result<usize> = async {
                    let exclusions = profiles.exclusions_for(user_id, kind).await?;
                    let rows = rank_candidates(RankInput {
                        user_id,
                        kind,
                        preference: preference.as_ref(),
                        candidates: candidates.as_slice(),
                        exclusions: &exclusions,
                        artifact: artifact.as_deref(),
                        last_interaction: &user_interactions,
                        scorer: &scorer,
                        blend_alpha: config.blend_alpha,
                        max_results: config.max_results,
                        generated_at,
                    });
                    let written = rows.len();
                    recommendations.replace_for_user(user_id, kind, &rows).await?;
                    Ok(written)
                }
                .await;
                (user_id, result)
            }
        }))
        .buffer_unordered(self.config.scoring_concurrency.max(1))
        .collect()
        .await;

        let mut report = ScoringReport {
            kind,
            users_scored: 0,
            users_skipped: 0,
            records_written: 0,
            generated_at,
        };
        for (user_id, outcome) in outcomes {
            match outcome {
                Ok(written) => {
                    report.users_scored += 1;
                    report.records_written += written as u64;
                }
                Err(e) => {
                    report.users_skipped += 1;
                    warn!(user_id = %user_id, kind = %kind, error = %e, "scoring failed for user, skipping");
                }
            }
        }

        info!(
            kind = %kind,
            users = report.users_scored,
            skipped = report.users_skipped,
            records = report.records_written,
            "recommendation scoring complete"
        );

        Ok(report)
    }
}

pub struct RankInput<'a> {
    pub user_id: Uuid,
    pub kind: CandidateKind,
    pub preference: Option<&'a UserPreference>,
    pub candidates: &'a [CandidateProfile],
    pub exclusions: &'a HashSet<Uuid>,
    pub artifact: Option<&'a ModelArtifact>,
    pub last_interaction: &'a HashMap<Uuid, DateTime<Utc>>,
    pub scorer: &'a ContentScorer,
    pub blend_alpha: f64,
    pub max_results: usize,
    pub generated_at: DateTime<Utc>,
}

/// Rank one user's candidate pool. Deterministic: final score desc, then
/// content score desc, then most recent interaction desc, then candidate id.
pub fn rank_candidates(input: RankInput<'_>) -> Vec<RecommendationRecord> {
    let pool: Vec<&CandidateProfile> = input
        .candidates
        .iter()
        .filter(|c| !input.exclusions.contains(&c.candidate_id))
        .collect();

    let user_factor = input
        .artifact
        .and_then(|a| a.user_factor(&input.user_id));

    let raw_cf: Vec<Option<f64>> = pool
        .iter()
        .map(|c| match (input.artifact, user_factor) {
            (Some(artifact), Some(uf)) => artifact
                .candidate_factor(&c.candidate_id)
                .map(|cf| dot(uf, cf)),
            _ => None,
        })
        .collect();

    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for value in raw_cf.iter().flatten() {
        min = min.min(*value);
        max = max.max(*value);
    }

    let mut records: Vec<RecommendationRecord> = pool
        .iter()
        .zip(raw_cf.iter())
        .map(|(candidate, raw)| {
            let (collaborative, cold_start) = match raw {
                // A flat pool carries no ordering information; park it mid-scale.
                Some(_) if max <= min => (0.5, false),
                Some(value) => ((value - min) / (max - min), false),
                None => (0.0, true),
            };
            let content = input.scorer.score(input.preference, Some(candidate));
            let alpha = if cold_start { 0.0 } else { input.blend_alpha };
            let final_score = (alpha * collaborative + (1.0 - alpha) * content).clamp(0.0, 1.0);

            RecommendationRecord {
                user_id: input.user_id,
                candidate_id: candidate.candidate_id,
                candidate_kind: input.kind,
                rank: 0,
                collaborative_score: collaborative,
                content_score: content,
                final_score,
                cold_start,
                generated_at: input.generated_at,
            }
        })
        .collect();

    records.sort_by(|a, b| {
        b.final_score
            .total_cmp(&a.final_score)
            .then_with(|| b.content_score.total_cmp(&a.content_score))
            .then_with(|| {
                let a_seen = input.last_interaction.get(&a.candidate_id);
                let b_seen = input.last_interaction.get(&b.candidate_id);
                b_seen.cmp(&a_seen)
            })
            .then_with(|| a.candidate_id.cmp(&b.candidate_id))
    });

    records.truncate(input.max_results);
    for (index, record) in records.iter_mut().enumerate() {
        record.rank = index as i32 + 1;
    }
    records
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Industry;

    fn uuid(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    fn profile(id: Uuid, industries: &[Industry]) -> CandidateProfile {
        CandidateProfile {
            candidate_id: id,
            kind: CandidateKind::Mentor,
            industries: industries.iter().copied().collect(),
            skills: HashSet::new(),
            experience_years: Some(5),
        }
    }

    fn artifact_with(
        user: (Uuid, Vec<f64>),
        candidates: Vec<(Uuid, Vec<f64>)>,
    ) -> ModelArtifact {
        ModelArtifact {
            version: 1,
            candidate_kind: CandidateKind::Mentor,
            trained_at: Utc::now(),
            factor_dim: user.1.len(),
            user_factors: HashMap::from([user]),
            candidate_factors: candidates.into_iter().collect(),
        }
    }

    fn base_input<'a>(
        user_id: Uuid,
        candidates: &'a [CandidateProfile],
        exclusions: &'a HashSet<Uuid>,
        artifact: Option<&'a ModelArtifact>,
        last_interaction: &'a HashMap<Uuid, DateTime<Utc>>,
        scorer: &'a ContentScorer,
    ) -> RankInput<'a> {
        RankInput {
            user_id,
            kind: CandidateKind::Mentor,
            preference: None,
            candidates,
            exclusions,
            artifact,
            last_interaction,
            scorer,
            blend_alpha: 0.6,
            max_results: 50,
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn cold_start_final_equals_content() {
        let user = uuid(1);
        let candidates = vec![profile(uuid(10), &[]), profile(uuid(11), &[])];
        let exclusions = HashSet::new();
        let interactions = HashMap::new();
        let scorer = ContentScorer::default();

        let records = rank_candidates(base_input(
            user,
            &candidates,
            &exclusions,
            None,
            &interactions,
            &scorer,
        ));

        assert_eq!(records.len(), 2);
        for record in &records {
            assert!(record.cold_start);
            assert_eq!(record.collaborative_score, 0.0);
            assert_eq!(record.final_score, record.content_score);
        }
    }

    #[test]
    fn warm_pairs_blend_with_normalized_cf() {
        let user = uuid(1);
        let (liked, other) = (uuid(10), uuid(11));
        let candidates = vec![profile(liked, &[]), profile(other, &[])];
        let artifact = artifact_with(
            (user, vec![1.0, 0.0]),
            vec![(liked, vec![0.9, 0.1]), (other, vec![0.1, 0.9])],
        );
        let exclusions = HashSet::new();
        let interactions = HashMap::new();
        let scorer = ContentScorer::default();

        let records = rank_candidates(base_input(
            user,
            &candidates,
            &exclusions,
            Some(&artifact),
            &interactions,
            &scorer,
        ));

        let top = &records[0];
        let bottom = &records[1];
        assert_eq!(top.candidate_id, liked);
        assert!(!top.cold_start);
        // Min-max puts the extremes at exactly 1 and 0.
        assert_eq!(top.collaborative_score, 1.0);
        assert_eq!(bottom.collaborative_score, 0.0);
        // No preference row: content legs are neutral 0.5.
        assert!((top.final_score - (0.6 + 0.4 * 0.5)).abs() < 1e-12);
        assert!((bottom.final_score - 0.4 * 0.5).abs() < 1e-12);
    }

    #[test]
    fn candidate_without_factors_is_cold_within_a_warm_pool() {
        let user = uuid(1);
        let (warm, cold) = (uuid(10), uuid(11));
        let candidates = vec![profile(warm, &[]), profile(cold, &[])];
        let artifact = artifact_with((user, vec![1.0]), vec![(warm, vec![0.7])]);
        let exclusions = HashSet::new();
        let interactions = HashMap::new();
        let scorer = ContentScorer::default();

        let records = rank_candidates(base_input(
            user,
            &candidates,
            &exclusions,
            Some(&artifact),
            &interactions,
            &scorer,
        ));

        let cold_record = records.iter().find(|r| r.candidate_id == cold).unwrap();
        assert!(cold_record.cold_start);
        assert_eq!(cold_record.final_score, cold_record.content_score);
    }

    #[test]
    fn flat_cf_pool_parks_mid_scale() {
        let user = uuid(1);
        let candidates = vec![profile(uuid(10), &[]), profile(uuid(11), &[])];
        let artifact = artifact_with(
            (user, vec![1.0]),
            vec![(uuid(10), vec![0.4]), (uuid(11), vec![0.4])],
        );
        let exclusions = HashSet::new();
        let interactions = HashMap::new();
        let scorer = ContentScorer::default();

        let records = rank_candidates(base_input(
            user,
            &candidates,
            &exclusions,
            Some(&artifact),
            &interactions,
            &scorer,
        ));

        for record in &records {
            assert_eq!(record.collaborative_score, 0.5);
            assert!((0.0..=1.0).contains(&record.final_score));
        }
    }

    #[test]
    fn excluded_candidates_never_appear() {
        let user = uuid(1);
        let blocked = uuid(10);
        let candidates = vec![profile(blocked, &[]), profile(uuid(11), &[])];
        let exclusions = HashSet::from([blocked]);
        let interactions = HashMap::new();
        let scorer = ContentScorer::default();

        let records = rank_candidates(base_input(
            user,
            &candidates,
            &exclusions,
            None,
            &interactions,
            &scorer,
        ));

        assert_eq!(records.len(), 1);
        assert_ne!(records[0].candidate_id, blocked);
    }

    #[test]
    fn ties_break_on_recency_then_candidate_id() {
        let user = uuid(1);
        let (recent, stale, untouched) = (uuid(30), uuid(20), uuid(10));
        let candidates = vec![
            profile(untouched, &[]),
            profile(stale, &[]),
            profile(recent, &[]),
        ];
        let exclusions = HashSet::new();
        let now = Utc::now();
        let interactions = HashMap::from([
            (recent, now),
            (stale, now - chrono::Duration::days(7)),
        ]);
        let scorer = ContentScorer::default();

        let records = rank_candidates(base_input(
            user,
            &candidates,
            &exclusions,
            None,
            &interactions,
            &scorer,
        ));

        // All scores tie (neutral content, cold CF); order falls to recency,
        // with never-interacted candidates last, then id ascending.
        let order: Vec<Uuid> = records.iter().map(|r| r.candidate_id).collect();
        assert_eq!(order, vec![recent, stale, untouched]);
        assert_eq!(records[0].rank, 1);
        assert_eq!(records[2].rank, 3);
    }

    #[test]
    fn output_is_truncated_and_ranked() {
        let user = uuid(1);
        let candidates: Vec<CandidateProfile> =
            (10..20).map(|n| profile(uuid(n), &[])).collect();
        let exclusions = HashSet::new();
        let interactions = HashMap::new();
        let scorer = ContentScorer::default();

        let mut input = base_input(
            user,
            &candidates,
            &exclusions,
            None,
            &interactions,
            &scorer,
        );
        input.max_results = 3;
        let records = rank_candidates(input);

        assert_eq!(records.len(), 3);
        assert_eq!(
            records.iter().map(|r| r.rank).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn identical_inputs_rank_identically() {
        let user = uuid(1);
        let candidates: Vec<CandidateProfile> =
            (10..30).map(|n| profile(uuid(n), &[])).collect();
        let exclusions = HashSet::new();
        let interactions = HashMap::new();
        let scorer = ContentScorer::default();
        let generated_at = Utc::now();

        let run = || {
            let mut input = base_input(
                user,
                &candidates,
                &exclusions,
                None,
                &interactions,
                &scorer,
            );
            input.generated_at = generated_at;
            rank_candidates(input)
                .iter()
                .map(|r| (r.rank, r.candidate_id))
                .collect::<Vec<_>>()
        };

        assert_eq!(run(), run());
    }
}

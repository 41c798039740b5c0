/// Content-Based Scorer
///
/// Pure similarity between a user's declared preferences and a candidate's
/// attribute profile. No persistence, no behavioral history: this is the
/// cold-start half of the hybrid blend.
use std::collections::HashSet;

use crate::models::{CandidateProfile, UserPreference};

/// Neutral score when either side of the comparison is missing entirely.
pub const NEUTRAL_SCORE: f64 = 0.5;

/// Relative weights of the three sub-scores. Normalized at scoring time, so
/// any non-negative values work.
#[derive(Debug, Clone)]
pub struct ContentWeights {
    pub industry: f64,
    pub language: f64,
    pub experience: f64,
}

impl Default for ContentWeights {
    fn default() -> Self {
        Self {
            industry: 1.0,
            language: 1.0,
            experience: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContentScorer {
    weights: ContentWeights,
    /// Years of shortfall at which the experience fit bottoms out at zero.
    experience_tolerance_years: f64,
}

impl Default for ContentScorer {
    fn default() -> Self {
        Self::new(ContentWeights::default(), 3.0)
    }
}

impl ContentScorer {
    pub fn new(weights: ContentWeights, experience_tolerance_years: f64) -> Self {
        Self {
            weights,
            experience_tolerance_years: experience_tolerance_years.max(f64::EPSILON),
        }
    }

    /// Score in [0,1]. A missing preference or profile yields the neutral 0.5
    /// rather than an error.
    pub fn score(
        &self,
        preference: Option<&UserPreference>,
        profile: Option<&CandidateProfile>,
    ) -> f64 {
        let (Some(pref), Some(profile)) = (preference, profile) else {
            return NEUTRAL_SCORE;
        };

        let industry = industry_overlap(&pref.desired_industries, &profile.industries);
        let language = jaccard(&pref.desired_languages, &profile.skills);
        let experience = self.experience_fit(pref.min_experience_years, profile.experience_years);

        let weight_sum = self.weights.industry + self.weights.language + self.weights.experience;
        if weight_sum <= 0.0 {
            return NEUTRAL_SCORE;
        }

        let blended = (self.weights.industry * industry
            + self.weights.language * language
            + self.weights.experience * experience)
            / weight_sum;
        blended.clamp(0.0, 1.0)
    }

    /// 1.0 when the candidate meets the declared minimum (or none is
    /// declared), decaying linearly to 0 at `experience_tolerance_years`
    /// short.
    fn experience_fit(&self, min_years: Option<i32>, candidate_years: Option<i32>) -> f64 {
        let Some(min) = min_years else {
            return 1.0;
        };
        let candidate = candidate_years.unwrap_or(0);
        if candidate >= min {
            return 1.0;
        }
        let shortfall = (min - candidate) as f64;
        (1.0 - shortfall / self.experience_tolerance_years).max(0.0)
    }
}

/// Fraction of the desired industries the candidate covers. No declared
/// preference means no constraint, which scores as a perfect fit.
fn industry_overlap<T: Eq + std::hash::Hash>(desired: &HashSet<T>, candidate: &HashSet<T>) -> f64 {
    if desired.is_empty() {
        return 1.0;
    }
    let hits = desired.iter().filter(|d| candidate.contains(d)).count();
    hits as f64 / desired.len() as f64
}

fn jaccard(desired: &HashSet<String>, candidate: &HashSet<String>) -> f64 {
    if desired.is_empty() {
        return 1.0;
    }
    if candidate.is_empty() {
        return 0.0;
    }
    let intersection = desired.intersection(candidate).count();
    let union = desired.union(candidate).count();
    intersection as f64 / union as f64
}

//! Feature importance: how distinctive a value is for the seed set.
//!
//! For a value with frequency `p` among the seeds and `q` in the population,
//!
//! ```text
//! score(p, q) = (p - q) * ln( p (1 - q) / ((1 - p) q) )
//! ```
//!
//! which is the symmetric KL divergence between two Bernoulli distributions
//! carrying the sign of `p - q`. It is zero for `p == q`, grows as the value
//! becomes over-represented among the seeds and mirrors that for
//! under-representation: `score(0.8, 0.2) == -score(0.2, 0.8)`.
//!
//! The log term is undefined at 0 and 1. [`Saturation`] decides whether such
//! pairs are clamped into `[eps, 1 - eps]` or dropped.

use crate::probability::ValueProbabilityTable;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

pub const DEFAULT_EPSILON: f64 = 1e-6;

/// Handling of probabilities equal to 0 or 1
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Saturation {
    /// Clamp both probabilities into `[eps, 1 - eps]`
    Clamp(f64),
    /// Skip the pair
    Exclude,
}

impl Default for Saturation {
    fn default() -> Self {
        Saturation::Clamp(DEFAULT_EPSILON)
    }
}

/// Signed importance of one (feature, value) pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub value: String,
    /// Frequency among the seeds
    pub seed_probability: f64,
    /// Frequency in the population
    pub population_probability: f64,
    pub score: f64,
}

/// Score one pair. `None` when either input is outside `[0, 1]` or when the
/// pair is degenerate under [`Saturation::Exclude`].
pub fn score_pair(p: f64, q: f64, saturation: Saturation) -> Option<f64> {
    if !(0.0..=1.0).contains(&p) || !(0.0..=1.0).contains(&q) {
        return None;
    }
    if p == q {
        return Some(0.0);
    }

    let (p, q) = match saturation {
        Saturation::Exclude => {
            if p == 0.0 || p == 1.0 || q == 0.0 || q == 1.0 {
                return None;
            }
            (p, q)
        }
        Saturation::Clamp(eps) => {
            let eps = if eps > 0.0 && eps < 0.5 { eps } else { DEFAULT_EPSILON };
            (p.clamp(eps, 1.0 - eps), q.clamp(eps, 1.0 - eps))
        }
    };

    Some((p - q) * ((p * (1.0 - q)) / ((1.0 - p) * q)).ln())
}

/// Score every pair present in both tables, most important first.
///
/// Ordering is by descending absolute score, then feature name, then value.
pub fn rank(
    seed: &ValueProbabilityTable,
    population: &ValueProbabilityTable,
    saturation: Saturation,
) -> Vec<FeatureImportance> {
    let mut scored: Vec<FeatureImportance> = seed
        .iter()
        .filter_map(|(feature, value, p)| {
            let q = population.probability(feature, value)?;
            let score = score_pair(p, q, saturation)?;
            Some(FeatureImportance {
                feature: feature.to_string(),
                value: value.to_string(),
                seed_probability: p,
                population_probability: q,
                score,
            })
        })
        .collect();

    scored.sort_by(|a, b| {
        OrderedFloat(b.score.abs())
            .cmp(&OrderedFloat(a.score.abs()))
            .then_with(|| a.feature.cmp(&b.feature))
            .then_with(|| a.value.cmp(&b.value))
    });
    scored
}

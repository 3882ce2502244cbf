//! Explainability for lookalike expansions
//!
//! Scores expanded entities against the seed profile and reports which
//! features carried each score, so an expansion can be audited value by value.

use crate::importance::FeatureImportance;
use lookalike_core::{EntityId, ExpandOutcome, FeatureRecord, FeatureSchema, Population};
use ordered_float::OrderedFloat;
use serde::Serialize;
use std::collections::HashMap;

/// An expanded entity with a per-feature breakdown of its profile score
#[derive(Debug, Clone, Serialize)]
pub struct RankedEntity {
    pub id: EntityId,
    /// Sum of the importance scores of the entity's values
    pub score: f64,
    /// Per-feature contributions to `score`
    pub explain: HashMap<String, f64>,
}

/// Scores records against a set of feature importances
#[derive(Debug, Clone, Default)]
pub struct Explainer {
    scores: HashMap<String, HashMap<String, f64>>,
}

impl Explainer {
    pub fn new<'a, I>(importances: I) -> Self
    where
        I: IntoIterator<Item = &'a FeatureImportance>,
    {
        let mut scores: HashMap<String, HashMap<String, f64>> = HashMap::new();
        for imp in importances {
            scores
                .entry(imp.feature.clone())
                .or_default()
                .insert(imp.value.clone(), imp.score);
        }
        Self { scores }
    }

    /// Number of scored (feature, value) pairs
    pub fn len(&self) -> usize {
        self.scores.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Score one record. Values without an importance contribute nothing;
    /// features without any scored value are left out of the breakdown.
    pub fn score_record(&self, schema: &FeatureSchema, record: &FeatureRecord) -> RankedEntity {
        let mut explain = HashMap::new();
        for (name, value) in schema.feature_names().zip(&record.values) {
            let Some(by_value) = self.scores.get(name) else {
                continue;
            };
            let mut hit = false;
            let mut sum = 0.0;
            for scalar in value.scalars().iter().filter(|s| !s.is_null()) {
                if let Some(score) = by_value.get(&scalar.to_string()) {
                    sum += score;
                    hit = true;
                }
            }
            if hit {
                explain.insert(name.to_string(), sum);
            }
        }

        RankedEntity {
            id: record.id.clone(),
            score: explain.values().sum(),
            explain,
        }
    }

    /// Score and rank the given entities, best first. Ties are broken by id;
    /// ids missing from the population are skipped.
    pub fn rank<'a, I>(&self, population: &Population, ids: I) -> Vec<RankedEntity>
    where
        I: IntoIterator<Item = &'a EntityId>,
    {
        let schema = population.schema();
        let mut ranked: Vec<RankedEntity> = population
            .subset(ids)
            .into_iter()
            .map(|record| self.score_record(schema, record))
            .collect();
        ranked.sort_by(|a, b| {
            OrderedFloat(b.score)
                .cmp(&OrderedFloat(a.score))
                .then_with(|| a.id.cmp(&b.id))
        });
        ranked
    }
}

/// Summary statistics for an expansion
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpansionStats {
    /// Seeds found in the index
    pub seeds_count: usize,
    /// Seeds that were not indexed
    pub skipped_seeds: usize,
    /// Entities in the expansion
    pub results_count: usize,
    pub avg_score: f64,
    pub best_score: f64,
    /// Feature that contributed most to the best result
    pub top_contributing_feature: Option<String>,
}

impl ExpansionStats {
    /// `results` must be sorted best first, as [`Explainer::rank`] returns them
    pub fn compute(outcome: &ExpandOutcome, results: &[RankedEntity]) -> Self {
        let Some(best) = results.first() else {
            return Self {
                seeds_count: outcome.queried_seeds,
                skipped_seeds: outcome.skipped_seeds,
                results_count: 0,
                avg_score: 0.0,
                best_score: 0.0,
                top_contributing_feature: None,
            };
        };

        let avg_score = results.iter().map(|r| r.score).sum::<f64>() / results.len() as f64;
        let top_contributing_feature = best
            .explain
            .iter()
            .max_by(|a, b| OrderedFloat(*a.1).cmp(&OrderedFloat(*b.1)).then_with(|| b.0.cmp(a.0)))
            .map(|(name, _)| name.clone());

        Self {
            seeds_count: outcome.queried_seeds,
            skipped_seeds: outcome.skipped_seeds,
            results_count: results.len(),
            avg_score,
            best_score: best.score,
            top_contributing_feature,
        }
    }
}

/// Everything a lookalike run produces, ready to serialize
#[derive(Debug, Clone, Serialize)]
pub struct LookalikeReport {
    pub stats: ExpansionStats,
    pub importance: Vec<FeatureImportance>,
    pub result: Vec<RankedEntity>,
}

impl LookalikeReport {
    /// Rank the expansion with `importance` and bundle it with its stats
    pub fn new(population: &Population, outcome: &ExpandOutcome, importance: Vec<FeatureImportance>) -> Self {
        let explainer = Explainer::new(&importance);
        let result = explainer.rank(population, &outcome.neighbors);
        let stats = ExpansionStats::compute(outcome, &result);
        Self {
            stats,
            importance,
            result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lookalike_core::{FeatureSpec, FeatureValue};

    fn importance(feature: &str, value: &str, score: f64) -> FeatureImportance {
        FeatureImportance {
            feature: feature.to_string(),
            value: value.to_string(),
            seed_probability: 0.0,
            population_probability: 0.0,
            score,
        }
    }

    fn population() -> Population {
        let schema = FeatureSchema::new(
            "id",
            vec![FeatureSpec::scalar("plan"), FeatureSpec::multi("apps")],
        )
        .unwrap();
        let records = vec![
            FeatureRecord::new(1u64, vec![FeatureValue::from("pro"), FeatureValue::multi(["mail", "maps"])]),
            FeatureRecord::new(2u64, vec![FeatureValue::from("free"), FeatureValue::multi(["mail"])]),
            FeatureRecord::new(3u64, vec![FeatureValue::from("pro"), FeatureValue::multi(["chat"])]),
            FeatureRecord::new(4u64, vec![FeatureValue::from("team"), FeatureValue::multi(["games"])]),
        ];
        Population::new(schema, records).unwrap()
    }

    fn explainer() -> Explainer {
        Explainer::new(&[
            importance("plan", "pro", 1.5),
            importance("plan", "free", -0.5),
            importance("apps", "mail", 0.25),
            importance("apps", "maps", 0.75),
        ])
    }

    #[test]
    fn test_score_record_breakdown() {
        let population = population();
        let entity = explainer().score_record(population.schema(), population.get(&EntityId::Integer(1)).unwrap());
        assert_eq!(entity.score, 2.5);
        assert_eq!(entity.explain.get("plan"), Some(&1.5));
        assert_eq!(entity.explain.get("apps"), Some(&1.0));

        // nothing scored for "team" or "games"
        let entity = explainer().score_record(population.schema(), population.get(&EntityId::Integer(4)).unwrap());
        assert_eq!(entity.score, 0.0);
        assert!(entity.explain.is_empty());
    }

    #[test]
    fn test_rank_sorted_with_id_ties() {
        let population = population();
        let ids: Vec<EntityId> = [4u64, 3, 2, 1, 99].into_iter().map(EntityId::from).collect();
        let ranked = explainer().rank(&population, &ids);

        let order: Vec<EntityId> = ranked.iter().map(|r| r.id.clone()).collect();
        assert_eq!(
            order,
            vec![EntityId::Integer(1), EntityId::Integer(3), EntityId::Integer(4), EntityId::Integer(2)]
        );
        assert_eq!(ranked[3].score, -0.25);
    }

    #[test]
    fn test_stats() {
        let population = population();
        let outcome = ExpandOutcome {
            neighbors: [1u64, 2].into_iter().map(EntityId::from).collect(),
            queried_seeds: 2,
            skipped_seeds: 1,
        };
        let report = LookalikeReport::new(&population, &outcome, vec![importance("plan", "pro", 1.5), importance("apps", "maps", 0.75)]);

        assert_eq!(report.result.len(), 2);
        assert_eq!(report.stats.seeds_count, 2);
        assert_eq!(report.stats.skipped_seeds, 1);
        assert_eq!(report.stats.best_score, 2.25);
        assert_eq!(report.stats.avg_score, 1.125);
        assert_eq!(report.stats.top_contributing_feature.as_deref(), Some("plan"));
    }

    #[test]
    fn test_stats_empty() {
        let stats = ExpansionStats::compute(&ExpandOutcome::default(), &[]);
        assert_eq!(stats.results_count, 0);
        assert_eq!(stats.top_contributing_feature, None);
    }

    #[test]
    fn test_report_serializes() {
        let population = population();
        let outcome = ExpandOutcome {
            neighbors: [3u64].into_iter().map(EntityId::from).collect(),
            queried_seeds: 1,
            skipped_seeds: 0,
        };
        let report = LookalikeReport::new(&population, &outcome, vec![importance("plan", "pro", 1.5)]);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["result"][0]["id"], serde_json::json!(3));
        assert_eq!(json["stats"]["results_count"], serde_json::json!(1));
    }
}

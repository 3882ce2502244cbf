//! Empirical value distributions per feature.

use lookalike_core::{EntityId, FeatureRecord, FeatureSchema, Population};
use serde::Serialize;
use std::collections::BTreeMap;

/// Value counts of one feature
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeatureDistribution {
    /// Number of counted values across all rows
    pub total: usize,
    pub counts: BTreeMap<String, usize>,
}

impl FeatureDistribution {
    pub fn probability(&self, value: &str) -> Option<f64> {
        self.counts
            .get(value)
            .map(|&count| count as f64 / self.total as f64)
    }
}

/// Frequency of each (feature, value) pair within a set of rows.
///
/// Within a feature the probabilities sum to 1. Null scalars are not counted;
/// every element of a multi-valued cell is. The table is immutable: a new
/// subset means a new table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValueProbabilityTable {
    rows: usize,
    features: BTreeMap<String, FeatureDistribution>,
}

impl ValueProbabilityTable {
    pub fn from_records<'a, I>(schema: &FeatureSchema, records: I) -> Self
    where
        I: IntoIterator<Item = &'a FeatureRecord>,
    {
        let mut rows = 0;
        let mut features: BTreeMap<String, FeatureDistribution> = BTreeMap::new();

        for record in records {
            rows += 1;
            for (name, value) in schema.feature_names().zip(&record.values) {
                for scalar in value.scalars().iter().filter(|s| !s.is_null()) {
                    let dist = features.entry(name.to_string()).or_default();
                    *dist.counts.entry(scalar.to_string()).or_insert(0) += 1;
                    dist.total += 1;
                }
            }
        }

        Self { rows, features }
    }

    /// Table over the whole population
    pub fn from_population(population: &Population) -> Self {
        Self::from_records(population.schema(), population.records())
    }

    /// Table over the population rows with the given ids. Unknown ids are
    /// ignored and a repeated id counts once.
    pub fn from_subset<'a, I>(population: &Population, ids: I) -> Self
    where
        I: IntoIterator<Item = &'a EntityId>,
    {
        Self::from_records(population.schema(), population.subset(ids))
    }

    /// Number of rows the table was computed from
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of (feature, value) pairs
    pub fn len(&self) -> usize {
        self.features.values().map(|d| d.counts.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn feature(&self, name: &str) -> Option<&FeatureDistribution> {
        self.features.get(name)
    }

    pub fn probability(&self, feature: &str, value: &str) -> Option<f64> {
        self.features.get(feature)?.probability(value)
    }

    /// `(feature, value, probability)` in feature then value order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, f64)> + '_ {
        self.features.iter().flat_map(|(feature, dist)| {
            dist.counts.iter().map(move |(value, &count)| {
                (feature.as_str(), value.as_str(), count as f64 / dist.total as f64)
            })
        })
    }
}

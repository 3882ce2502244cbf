//! End-to-end lookalike run: rows in, explained report out.

use crate::config::LookalikeConfig;
use lookalike_core::{EntityId, LookalikeEngine, Population, Result};
use lookalike_profile::{importance, prepare_rows, LookalikeReport, Saturation, ValueProbabilityTable};
use serde_json::Value;
use tracing::info;

/// Clean raw JSON rows and validate them into a population.
pub fn load_population(config: &LookalikeConfig, rows: Vec<Value>) -> Result<Population> {
    let report = prepare_rows(rows, &config.schema, &config.prep_config());
    Population::from_json_rows(config.schema.clone(), &report.rows)
}

/// Build a fresh engine over `population`.
pub fn build_engine(config: &LookalikeConfig, population: Population) -> Result<LookalikeEngine> {
    LookalikeEngine::build(config.engine_config(), population)
}

/// Expand `seeds`, score feature importance for the seed set and rank the
/// expansion by it.
pub fn profile(
    engine: &LookalikeEngine,
    seeds: &[EntityId],
    k: usize,
    saturation: Saturation,
) -> Result<LookalikeReport> {
    let outcome = engine.expand(seeds, k)?;

    let population = engine.population();
    let seed_table = ValueProbabilityTable::from_subset(population, seeds);
    let population_table = ValueProbabilityTable::from_population(population);
    let ranked = importance::rank(&seed_table, &population_table, saturation);

    let report = LookalikeReport::new(population, &outcome, ranked);
    info!(
        seeds = outcome.queried_seeds,
        skipped = outcome.skipped_seeds,
        results = report.result.len(),
        "Lookalike report ready"
    );
    Ok(report)
}

/// [`load_population`], [`build_engine`] and [`profile`] in one call, with
/// `k` taken from the configuration.
pub fn run(config: &LookalikeConfig, rows: Vec<Value>, seeds: &[EntityId]) -> Result<LookalikeReport> {
    let population = load_population(config, rows)?;
    let engine = build_engine(config, population)?;
    profile(&engine, seeds, config.query.k, config.saturation())
}

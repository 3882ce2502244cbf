use crate::forest::{ForestConfig, LshForest, Neighbor};
use crate::minhash::{MinHasher, RecordEncoder, Signature, TokenMode, DEFAULT_SEED};
use crate::record::{EntityId, FeatureRecord};
use crate::{Error, Population, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Build progress is reported once per this many entities.
pub const PROGRESS_INTERVAL: usize = 5000;

/// Configuration of a lookalike engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub forest: ForestConfig,
    /// Seed of the MinHash permutation family
    pub seed: u64,
    pub token_mode: TokenMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            forest: ForestConfig::default(),
            seed: DEFAULT_SEED,
            token_mode: TokenMode::Plain,
        }
    }
}

/// Hooks into a running build
pub trait BuildObserver: Sync {
    fn on_progress(&self, _processed: usize, _total: usize) {}

    /// Polled between entities; returning true aborts the build.
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Observer that ignores progress and never cancels
pub struct NoopObserver;

impl BuildObserver for NoopObserver {}

/// A shared flag works as a cancellation token.
impl BuildObserver for AtomicBool {
    fn is_cancelled(&self) -> bool {
        self.load(Ordering::Acquire)
    }
}

/// Result of expanding a seed set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpandOutcome {
    /// Neighbors of all seeds, seeds themselves removed
    pub neighbors: HashSet<EntityId>,
    /// Distinct seed ids that were queried
    pub queried_seeds: usize,
    /// Distinct seed ids absent from the population
    pub skipped_seeds: usize,
}

/// A frozen similarity index over one population
pub struct LookalikeEngine {
    config: EngineConfig,
    population: Population,
    encoder: RecordEncoder,
    forest: LshForest,
}

impl LookalikeEngine {
    /// Encode and index every entity of `population`, then freeze.
    pub fn build(config: EngineConfig, population: Population) -> Result<Self> {
        Self::build_with_observer(config, population, &NoopObserver)
    }

    pub fn build_with_observer(
        config: EngineConfig,
        population: Population,
        observer: &dyn BuildObserver,
    ) -> Result<Self> {
        let forest = LshForest::new(config.forest)?;
        let encoder = Self::make_encoder(&config, &population);
        let total = population.len();
        let mut processed = 0;

        for chunk in population.records().chunks(PROGRESS_INTERVAL) {
            let done = processed;
            let signatures = chunk
                .par_iter()
                .map(|record| {
                    if observer.is_cancelled() {
                        return Err(Error::Cancelled { processed: done });
                    }
                    Ok(encoder.encode(record))
                })
                .collect::<Result<Vec<Signature>>>()?;

            for (record, signature) in chunk.iter().zip(signatures) {
                forest.insert(record.id.clone(), signature)?;
                processed += 1;
                if processed % PROGRESS_INTERVAL == 0 {
                    info!("Processing {} of {}", processed, total);
                    observer.on_progress(processed, total);
                }
            }
        }
        if processed % PROGRESS_INTERVAL != 0 {
            observer.on_progress(processed, total);
        }

        forest.freeze()?;
        info!(entities = total, "Lookalike index built");

        Ok(Self {
            config,
            population,
            encoder,
            forest,
        })
    }

    /// Reassemble an engine around an already frozen forest.
    ///
    /// Only ids are checked against the population; the stored signatures
    /// are trusted to come from these exact records.
    pub fn from_parts(config: EngineConfig, population: Population, forest: LshForest) -> Result<Self> {
        if !forest.is_frozen() {
            return Err(crate::StateError::NotFrozen.into());
        }
        if *forest.config() != config.forest {
            return Err(Error::InvalidConfig(format!(
                "forest shape {:?} does not match configuration {:?}",
                forest.config(),
                config.forest
            )));
        }
        if forest.len() != population.len()
            || population.records().iter().any(|r| !forest.contains(&r.id))
        {
            return Err(Error::InvalidConfig(
                "forest does not index exactly this population".to_string(),
            ));
        }

        let encoder = Self::make_encoder(&config, &population);
        Ok(Self {
            config,
            population,
            encoder,
            forest,
        })
    }

    fn make_encoder(config: &EngineConfig, population: &Population) -> RecordEncoder {
        RecordEncoder::new(
            MinHasher::with_seed(config.forest.num_perm, config.seed),
            population.schema(),
            config.token_mode,
        )
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn population(&self) -> &Population {
        &self.population
    }

    pub fn forest(&self) -> &LshForest {
        &self.forest
    }

    pub fn encoder(&self) -> &RecordEncoder {
        &self.encoder
    }

    pub fn into_parts(self) -> (EngineConfig, Population, LshForest) {
        (self.config, self.population, self.forest)
    }

    /// Signature of a record under this engine's schema and hasher
    pub fn encode(&self, record: &FeatureRecord) -> Result<Signature> {
        self.population.schema().check_record(record)?;
        Ok(self.encoder.encode(record))
    }

    /// Top-`k` neighbors of an indexed entity, the entity itself included
    pub fn neighbors(&self, id: &EntityId, k: usize) -> Result<Vec<Neighbor>> {
        let record = self
            .population
            .get(id)
            .ok_or_else(|| Error::EntityNotFound(id.to_string()))?;
        self.forest.query(&self.encoder.encode(record), k)
    }

    /// Top-`k` neighbors of a record that need not be in the population
    pub fn query_record(&self, record: &FeatureRecord, k: usize) -> Result<Vec<Neighbor>> {
        let signature = self.encode(record)?;
        self.forest.query(&signature, k)
    }

    /// Expand a seed set into its lookalikes.
    ///
    /// Every seed found in the population contributes its top-`k` neighbors;
    /// the union minus the seeds is returned. Unknown seeds are skipped and
    /// counted rather than failing the whole expansion.
    pub fn expand<'a, I>(&self, seeds: I, k: usize) -> Result<ExpandOutcome>
    where
        I: IntoIterator<Item = &'a EntityId>,
    {
        let seeds: HashSet<&EntityId> = seeds.into_iter().collect();
        let (present, missing): (Vec<&EntityId>, Vec<&EntityId>) =
            seeds.iter().copied().partition(|id| self.population.contains(id));

        for id in &missing {
            debug!(seed = %id, "seed not in population");
        }
        if !missing.is_empty() {
            warn!(skipped = missing.len(), "Skipping seed ids absent from the population");
        }

        let per_seed = present
            .par_iter()
            .map(|id| self.neighbors(id, k))
            .collect::<Result<Vec<_>>>()?;

        let mut neighbors: HashSet<EntityId> = per_seed
            .into_iter()
            .flatten()
            .map(|n| n.id)
            .collect();
        neighbors.retain(|id| !seeds.contains(id));

        info!(
            seeds = present.len(),
            neighbors = neighbors.len(),
            "Seed set expanded"
        );

        Ok(ExpandOutcome {
            neighbors,
            queried_seeds: present.len(),
            skipped_seeds: missing.len(),
        })
    }
}

impl std::fmt::Debug for LookalikeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LookalikeEngine")
            .field("config", &self.config)
            .field("entities", &self.population.len())
            .finish()
    }
}

//! Configuration file for lookalike runs.
//!
//! ```toml
//! [index]
//! num_perm = 128
//! bands = 32
//! rows = 4
//! seed = 1
//! token_mode = "plain"
//!
//! [query]
//! k = 10
//!
//! [prep]
//! max_list_len = 16
//!
//! [importance]
//! saturation_epsilon = 1e-6
//! exclude_degenerate = false
//!
//! [schema]
//! id_column = "customer_id"
//! features = [
//!     { name = "gender", kind = "scalar" },
//!     { name = "apps", kind = "multi_valued" },
//! ]
//! ```
//!
//! Every section except `[schema]` may be omitted.

use lookalike_core::{EngineConfig, Error, FeatureSchema, ForestConfig, Result, TokenMode};
use lookalike_profile::{PrepConfig, Saturation, DEFAULT_EPSILON};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Neighbors requested per seed when nothing else is configured
pub const DEFAULT_K: usize = 10;

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookalikeConfig {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub prep: PrepConfig,
    #[serde(default)]
    pub importance: ImportanceConfig,
    pub schema: FeatureSchema,
}

/// Signature and forest shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub num_perm: usize,
    pub bands: usize,
    pub rows: usize,
    /// MinHash permutation seed
    pub seed: u64,
    pub token_mode: TokenMode,
}

impl Default for IndexConfig {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            num_perm: engine.forest.num_perm,
            bands: engine.forest.bands,
            rows: engine.forest.rows,
            seed: engine.seed,
            token_mode: engine.token_mode,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Neighbors requested per seed
    pub k: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self { k: DEFAULT_K }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportanceConfig {
    /// Probabilities are clamped into `[eps, 1 - eps]`
    pub saturation_epsilon: f64,
    /// Drop pairs with a probability of 0 or 1 instead of clamping
    pub exclude_degenerate: bool,
}

impl Default for ImportanceConfig {
    fn default() -> Self {
        Self {
            saturation_epsilon: DEFAULT_EPSILON,
            exclude_degenerate: false,
        }
    }
}

impl ImportanceConfig {
    pub fn saturation(&self) -> Saturation {
        if self.exclude_degenerate {
            Saturation::Exclude
        } else {
            Saturation::Clamp(self.saturation_epsilon)
        }
    }
}

impl LookalikeConfig {
    /// Defaults around a schema
    pub fn new(schema: FeatureSchema) -> Self {
        Self {
            index: IndexConfig::default(),
            query: QueryConfig::default(),
            prep: PrepConfig::default(),
            importance: ImportanceConfig::default(),
            schema,
        }
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidConfig(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: LookalikeConfig = toml::from_str(content)
            .map_err(|e| Error::InvalidConfig(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        self.forest_config().validate()?;
        self.schema.validate()?;

        if self.query.k == 0 {
            return Err(Error::InvalidConfig("query.k must be greater than 0".into()));
        }
        if self.prep.max_list_len == 0 {
            return Err(Error::InvalidConfig(
                "prep.max_list_len must be greater than 0".into(),
            ));
        }
        let eps = self.importance.saturation_epsilon;
        if !self.importance.exclude_degenerate && !(eps > 0.0 && eps < 0.5) {
            return Err(Error::InvalidConfig(
                "importance.saturation_epsilon must lie in (0, 0.5)".into(),
            ));
        }
        Ok(())
    }

    pub fn forest_config(&self) -> ForestConfig {
        ForestConfig {
            num_perm: self.index.num_perm,
            bands: self.index.bands,
            rows: self.index.rows,
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            forest: self.forest_config(),
            seed: self.index.seed,
            token_mode: self.index.token_mode,
        }
    }

    pub fn prep_config(&self) -> PrepConfig {
        self.prep
    }

    pub fn saturation(&self) -> Saturation {
        self.importance.saturation()
    }
}

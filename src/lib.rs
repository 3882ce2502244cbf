//! # lookalike
//!
//! Lookalike expansion over tabular entity populations.
//!
//! Given a population of entities described by categorical and multi-valued
//! features, and a small seed set of ids, lookalike finds entities whose
//! feature sets resemble the seeds' and explains which feature values make
//! the seeds distinctive.
//!
//! Entities are encoded as MinHash signatures over their feature tokens and
//! indexed in a banded LSH forest, so candidates are found without comparing
//! every pair. Feature importance is the signed symmetric divergence between
//! a value's frequency among the seeds and in the whole population.
//!
//! ## Quick Start
//!
//! ### As a Command
//!
//! ```bash
//! lookalike --config lookalike.toml --population users.json --seeds seeds.json
//! ```
//!
//! ### As a Library
//!
//! ```rust
//! use lookalike::prelude::*;
//! use serde_json::json;
//!
//! let schema = FeatureSchema::new(
//!     "id",
//!     vec![FeatureSpec::scalar("plan"), FeatureSpec::multi("apps")],
//! )
//! .unwrap();
//! let config = LookalikeConfig::new(schema);
//!
//! let rows = vec![
//!     json!({"id": 1, "plan": ["pro"], "apps": ["mail", "maps"]}),
//!     json!({"id": 2, "plan": "pro", "apps": ["maps", "mail"]}),
//!     json!({"id": 3, "plan": "free", "apps": ["games"]}),
//! ];
//! let report = lookalike::run(&config, rows, &[EntityId::Integer(1)]).unwrap();
//! assert!(report.result.iter().all(|r| r.id != EntityId::Integer(1)));
//! ```
//!
//! ## Crate Structure
//!
//! - [`lookalike-core`](https://docs.rs/lookalike-core) - Schema, population, MinHash, LSH forest, engine
//! - [`lookalike-profile`](https://docs.rs/lookalike-profile) - Row prep, probability tables, importance, explanations
//! - [`lookalike-storage`](https://docs.rs/lookalike-storage) - Index snapshots

pub mod config;
pub mod pipeline;

pub use config::{ImportanceConfig, IndexConfig, LookalikeConfig, QueryConfig, DEFAULT_K};
pub use pipeline::{build_engine, load_population, profile, run};

// Re-export core types
pub use lookalike_core::{
    EngineConfig, EntityId, Error, ExpandOutcome, FeatureRecord, FeatureSchema, FeatureSpec,
    FeatureValue, ForestConfig, LookalikeEngine, LshForest, MinHasher, Neighbor, Population,
    RecordEncoder, Result, Signature, TokenMode,
};

// Re-export profiling
pub use lookalike_profile::{
    FeatureImportance, LookalikeReport, PrepConfig, RankedEntity, Saturation,
    ValueProbabilityTable,
};

// Re-export storage
pub use lookalike_storage::SnapshotStore;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        EngineConfig, EntityId, Error, FeatureImportance, FeatureRecord, FeatureSchema,
        FeatureSpec, FeatureValue, LookalikeConfig, LookalikeEngine, LookalikeReport, Population,
        Result, Saturation, SnapshotStore,
    };
}

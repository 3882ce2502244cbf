//! # Lookalike Core
//!
//! Core library for lookalike expansion over tabular entity populations.
//!
//! This crate provides the fundamental data structures and algorithms:
//!
//! - [`FeatureSchema`] - Ordered feature layout with per-column kinds
//! - [`Population`] - Validated in-memory table of [`FeatureRecord`]s
//! - [`MinHasher`] / [`RecordEncoder`] - MinHash signatures over feature tokens
//! - [`LshForest`] - Banded LSH index with an append-then-freeze lifecycle
//! - [`LookalikeEngine`] - Builds the index and expands seed sets
//!
//! ## Example
//!
//! ```rust
//! use lookalike_core::{
//!     EngineConfig, EntityId, FeatureRecord, FeatureSchema, FeatureSpec, FeatureValue,
//!     LookalikeEngine, Population,
//! };
//!
//! let schema = FeatureSchema::new("id", vec![FeatureSpec::multi("tags")]).unwrap();
//! let records = vec![
//!     FeatureRecord::new(1u64, vec![FeatureValue::multi(["a", "b", "c"])]),
//!     FeatureRecord::new(2u64, vec![FeatureValue::multi(["a", "b", "d"])]),
//!     FeatureRecord::new(3u64, vec![FeatureValue::multi(["x", "y", "z"])]),
//! ];
//! let population = Population::new(schema, records).unwrap();
//!
//! let engine = LookalikeEngine::build(EngineConfig::default(), population).unwrap();
//! let outcome = engine.expand(&[EntityId::Integer(1)], 10).unwrap();
//! assert!(!outcome.neighbors.contains(&EntityId::Integer(1)));
//! ```

pub mod error;
pub mod record;
pub mod schema;
pub mod population;
pub mod minhash;
pub mod forest;
pub mod engine;

pub use error::{Error, Result, SchemaError, StateError};
pub use record::{EntityId, FeatureRecord, FeatureValue, Scalar};
pub use schema::{FeatureKind, FeatureSchema, FeatureSpec};
pub use population::Population;
pub use minhash::{MinHasher, RecordEncoder, Signature, TokenMode, MAX_HASH};
pub use forest::{ForestConfig, ForestStats, LshForest, Neighbor};
pub use engine::{
    BuildObserver, EngineConfig, ExpandOutcome, LookalikeEngine, NoopObserver, PROGRESS_INTERVAL,
};

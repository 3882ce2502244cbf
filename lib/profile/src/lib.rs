//! # Lookalike Profile
//!
//! Seed-set profiling on top of [`lookalike_core`]:
//!
//! - [`prep`] - Cleanup of raw JSON rows before ingestion
//! - [`probability`] - Per-feature value frequencies over a population or subset
//! - [`importance`] - Signed importance of each value for the seed set
//! - [`explain`] - Per-feature breakdown and ranking of an expansion

pub mod prep;
pub mod probability;
pub mod importance;
pub mod explain;

pub use prep::{prepare_rows, PrepConfig, PrepReport, DEFAULT_MAX_LIST_LEN};
pub use probability::{FeatureDistribution, ValueProbabilityTable};
pub use importance::{rank, score_pair, FeatureImportance, Saturation, DEFAULT_EPSILON};
pub use explain::{Explainer, ExpansionStats, LookalikeReport, RankedEntity};

//! Persistence for frozen lookalike indexes.

pub mod snapshot;

pub use snapshot::{SnapshotDescription, SnapshotStore, SNAPSHOT_VERSION};

//! Data layer for registry analytics.
//!
//! Discovers and reads the registry's CSV exports, normalizes and merges them
//! into per-category datasets, and provides the aggregation primitives the
//! query layer is built from.

pub mod aggregator;
pub mod loader;
pub mod reader;
pub mod snapshot;

pub use registry_core as core;
pub use snapshot::{load_snapshot, Snapshot, SnapshotSummary};

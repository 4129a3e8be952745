//! Runtime layer for registry analytics.
//!
//! Owns the published snapshot, reloads it (synchronously, with a timeout, or
//! from a background task) and exposes the query facade presentation layers
//! call into.

pub mod data_manager;
pub mod orchestrator;
pub mod queries;

pub use registry_core as core;
pub use registry_data as data;

//! Shared data model for the registry analytics pipeline.
//!
//! Holds the category/row/dataset types, the per-category schema contracts,
//! the schema normalizer, statistics helpers, error type and CLI settings used
//! by the data, runtime and binary crates.

pub mod error;
pub mod formatting;
pub mod models;
pub mod normalize;
pub mod schema;
pub mod settings;
pub mod stats;

pub use error::{RegistryError, Result};

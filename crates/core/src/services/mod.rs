//! Core business logic services.

mod indexer;

pub use indexer::{IndexerConfig, IndexerService};

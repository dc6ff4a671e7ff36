//! Storage layer for the stakeledger indexer.
//!
//! This crate provides PostgreSQL and in-memory implementations of the
//! repository traits defined in `stakeledger-core`. It handles connection
//! pooling, migrations, the keyed entity store and atomic per-event commits.
//!
//! # Architecture
//!
//! - [`postgres::Database`] - Connection pool management
//! - [`postgres::PgRepositories`] - Composite repository for all data
//! - [`memory::MemoryRepositories`] - Same ports over an in-process map
//!
//! # Usage
//!
//! ```ignore
//! use stakeledger_storage::{Database, DatabaseConfig, PgRepositories};
//!
//! // Connect to the database
//! let config = DatabaseConfig::for_indexer(&database_url);
//! let db = Database::connect(&config).await?;
//!
//! // Run migrations
//! db.migrate().await?;
//!
//! // Create repositories
//! let repositories = Arc::new(PgRepositories::new(Arc::new(db)));
//! ```

pub mod memory;
pub mod postgres;

pub use memory::MemoryRepositories;
pub use postgres::{Database, DatabaseConfig, PgRepositories, PurgeStats};

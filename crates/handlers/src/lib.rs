//! Handler bundles for the stakeledger indexer.
//!
//! Each bundle is self-contained with its own:
//!
//! - Contract handlers (event processing)
//! - Entity types (stored in the shared `entities` table)
//! - SQL migrations (typed views for the query layer)
//!
//! # Registering Bundles
//!
//! ```ignore
//! let mut registry = BundleRegistry::new();
//! registry.register(Box::new(StakingBundle::new(chain_state, StakingConfig::default())));
//! registry.register(Box::new(PolicyBundle::new()));
//!
//! // Run all bundle migrations
//! registry.run_migrations(db.pool()).await?;
//!
//! // Get unified handler registry
//! let handlers = registry.into_handler_registry();
//! ```

pub mod policy;
pub mod staking;
pub mod utils;

mod bundle;
mod registry;

pub use bundle::HandlerBundle;
pub use registry::BundleRegistry;

pub use policy::PolicyBundle;
pub use staking::{StakingBundle, StakingConfig};

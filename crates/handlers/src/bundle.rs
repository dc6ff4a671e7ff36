//! Handler bundle trait definition.

use std::sync::Arc;

use stakeledger_core::ports::ContractHandler;

/// A self-contained bundle of handlers for one or more contracts.
///
/// Bundles provide a plugin-like architecture where each bundle can:
/// - Register one or more contract handlers
/// - Declare the entity kinds it writes
/// - Expose its entities to the query layer via SQL views
///
/// # Example
///
/// ```ignore
/// pub struct MyBundle { /* ... */ }
///
/// impl HandlerBundle for MyBundle {
///     fn name(&self) -> &'static str { "my_bundle" }
///
///     fn handlers(&self) -> Vec<Arc<dyn ContractHandler>> {
///         vec![Arc::new(MyHandler::new())]
///     }
///
///     fn entity_kinds(&self) -> &'static [&'static str] {
///         &["MyEntity"]
///     }
/// }
/// ```
pub trait HandlerBundle: Send + Sync {
    /// Unique name identifying this bundle.
    ///
    /// Used for logging and migration tracking.
    fn name(&self) -> &'static str;

    /// Returns all contract handlers provided by this bundle.
    ///
    /// These handlers will be registered with the indexer's HandlerRegistry.
    fn handlers(&self) -> Vec<Arc<dyn ContractHandler>>;

    /// SQL migration statements for this bundle.
    ///
    /// Entities live in the shared `entities` table; bundle migrations
    /// create typed views over it. Migrations are executed in order and
    /// tracked by checksum in `bundle_migrations`.
    fn migrations(&self) -> &'static [&'static str] {
        &[]
    }

    /// Priority for bundle initialization (higher = earlier).
    ///
    /// Bundles with dependencies on other bundles should use lower priority.
    /// Default is 0.
    fn priority(&self) -> i32 {
        0
    }

    /// Called after all migrations have been run.
    ///
    /// Override this for any post-migration initialization.
    fn on_initialized(&self) {}

    /// Entity kinds written by this bundle.
    ///
    /// Used to report per-kind counts at startup and after a purge.
    fn entity_kinds(&self) -> &'static [&'static str] {
        &[]
    }
}

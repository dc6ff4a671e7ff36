//! Bundle registry for managing handler bundles.

use std::cmp::Reverse;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use tracing::{debug, info, warn};

use stakeledger_core::error::{StorageError, StorageResult};
use stakeledger_core::ports::HandlerRegistry;

use crate::bundle::HandlerBundle;

/// Registry for managing handler bundles.
///
/// The registry handles:
/// - Bundle registration with priority ordering
/// - Migration execution with tracking (idempotent)
/// - Handler extraction for the indexer
///
/// # Example
///
/// ```ignore
/// let mut registry = BundleRegistry::new();
///
/// // Register bundles (order doesn't matter - priority determines execution order)
/// registry.register(Box::new(StakingBundle::new(chain.clone(), StakingConfig::default())));
/// registry.register(Box::new(PolicyBundle::new()));
///
/// // Run migrations for all bundles (tracked, idempotent)
/// registry.run_migrations(&pool).await?;
///
/// // Convert to HandlerRegistry for the indexer
/// let handlers = registry.into_handler_registry();
/// ```
pub struct BundleRegistry {
    bundles: Vec<Box<dyn HandlerBundle>>,
}

impl BundleRegistry {
    /// Create a new empty bundle registry.
    pub fn new() -> Self {
        Self {
            bundles: Vec::new(),
        }
    }

    /// Register a handler bundle.
    ///
    /// Bundles are stored and will be processed in priority order
    /// (higher priority first) when migrations are run.
    pub fn register(&mut self, bundle: Box<dyn HandlerBundle>) {
        info!(bundle = bundle.name(), "📦 Registering handler bundle");
        self.bundles.push(bundle);
    }

    /// Run all bundle migrations in priority order.
    ///
    /// Migrations are tracked in the `bundle_migrations` table by bundle
    /// name, index and content checksum. Bundle migrations only define
    /// views (`CREATE OR REPLACE VIEW`), so a migration whose checksum
    /// changed is re-applied and its checksum updated. Returns the number
    /// of migrations applied.
    pub async fn run_migrations(&self, pool: &sqlx::PgPool) -> StorageResult<usize> {
        let mut applied = 0;

        for bundle in self.sorted_bundles() {
            let migrations = bundle.migrations();
            if migrations.is_empty() {
                debug!(bundle = bundle.name(), "No migrations to run");
                continue;
            }

            for (index, migration) in migrations.iter().enumerate() {
                let checksum = compute_checksum(migration);

                let existing: Option<(String,)> = sqlx::query_as(
                    "SELECT checksum FROM bundle_migrations WHERE bundle_name = $1 AND migration_index = $2",
                )
                .bind(bundle.name())
                .bind(index as i32)
                .fetch_optional(pool)
                .await
                .map_err(|e| StorageError::MigrationError(e.to_string()))?;

                match existing {
                    Some((found,)) if found == checksum => {
                        debug!(
                            bundle = bundle.name(),
                            migration = index,
                            "Migration already applied, skipping"
                        );
                        continue;
                    }
                    Some((found,)) => {
                        warn!(
                            bundle = bundle.name(),
                            migration = index,
                            expected = %checksum,
                            found = %found,
                            "⚠️  Migration content changed, re-applying view definitions"
                        );
                    }
                    None => {
                        info!(
                            bundle = bundle.name(),
                            migration = index,
                            "🗄️  Applying migration"
                        );
                    }
                }

                apply_migration(pool, bundle.name(), index, migration, &checksum).await?;
                applied += 1;
            }

            bundle.on_initialized();
        }

        Ok(applied)
    }

    fn sorted_bundles(&self) -> Vec<&dyn HandlerBundle> {
        let mut sorted: Vec<&dyn HandlerBundle> = self.bundles.iter().map(|b| b.as_ref()).collect();
        sorted.sort_by_key(|b| Reverse(b.priority()));
        sorted
    }

    /// Convert this registry into a HandlerRegistry.
    ///
    /// This extracts all handlers from all bundles and registers them
    /// with a new HandlerRegistry. The BundleRegistry is consumed.
    pub fn into_handler_registry(self) -> HandlerRegistry {
        let mut registry = HandlerRegistry::new();

        // Sort by priority for deterministic handler registration
        let mut sorted = self.bundles;
        sorted.sort_by_key(|b| Reverse(b.priority()));

        for bundle in sorted {
            let handlers = bundle.handlers();
            debug!(
                bundle = bundle.name(),
                handlers = handlers.len(),
                "Extracting handlers"
            );

            for handler in handlers {
                registry.register(handler);
            }
        }

        registry
    }

    /// Get the names of all registered bundles.
    pub fn bundle_names(&self) -> Vec<&'static str> {
        self.bundles.iter().map(|b| b.name()).collect()
    }

    /// Get the number of registered bundles.
    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    /// Check if no bundles are registered.
    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    /// Get all entity kinds written by registered bundles.
    ///
    /// Returns a deduplicated, sorted list.
    pub fn entity_kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<&'static str> = self
            .bundles
            .iter()
            .flat_map(|b| b.entity_kinds().iter().copied())
            .collect();
        kinds.sort();
        kinds.dedup();
        kinds
    }
}

impl Default for BundleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Execute a migration and record its checksum in one transaction.
async fn apply_migration(
    pool: &sqlx::PgPool,
    bundle: &str,
    index: usize,
    sql: &str,
    checksum: &str,
) -> StorageResult<()> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| StorageError::TransactionError(e.to_string()))?;

    sqlx::raw_sql(sql)
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::MigrationError(format!("{}[{}]: {}", bundle, index, e)))?;

    sqlx::query(
        r#"
        INSERT INTO bundle_migrations (bundle_name, migration_index, checksum)
        VALUES ($1, $2, $3)
        ON CONFLICT (bundle_name, migration_index) DO UPDATE SET
            checksum = EXCLUDED.checksum,
            applied_at = NOW()
        "#,
    )
    .bind(bundle)
    .bind(index as i32)
    .bind(checksum)
    .execute(&mut *tx)
    .await
    .map_err(|e| StorageError::MigrationError(e.to_string()))?;

    tx.commit()
        .await
        .map_err(|e| StorageError::TransactionError(e.to_string()))
}

/// Compute a checksum for migration content.
fn compute_checksum(content: &str) -> String {
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

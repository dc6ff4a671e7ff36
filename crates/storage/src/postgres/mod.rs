//! PostgreSQL storage adapter.
//!
//! This module implements the repository traits defined in `stakeledger-core`
//! using PostgreSQL as the backing store.
//!
//! # Architecture
//!
//! - [`Database`] - Connection pool and migrations
//! - [`PgRepositories`] - Composite repository implementing `Repositories` trait
//! - Individual repos: `PgEntityRepository`, `PgEventRepository`, `PgCursorRepository`
//!
//! # Usage
//!
//! ```ignore
//! let config = DatabaseConfig::for_indexer(&database_url);
//! let db = Database::connect(&config).await?;
//! db.migrate().await?;
//!
//! let repositories = PgRepositories::new(Arc::new(db));
//! ```

mod cursor_repo;
mod database;
mod entity_repo;
mod event_repo;
mod helpers;

pub use cursor_repo::PgCursorRepository;
pub use database::{Database, DatabaseConfig, PurgeStats};
pub use entity_repo::PgEntityRepository;
pub use event_repo::PgEventRepository;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use stakeledger_core::error::{StorageError, StorageResult};
use stakeledger_core::ports::{
    CursorRepository, EntityRepository, EventData, EventRepository, Repositories,
};

use cursor_repo::UPSERT_CURSOR_SQL;
use entity_repo::UPSERT_ENTITY_SQL;
use event_repo::INSERT_EVENT_SQL;

// =============================================================================
// Composite Repository
// =============================================================================

/// Aggregated PostgreSQL repositories implementing the `Repositories` trait.
///
/// This provides a single entry point for all storage operations and
/// implements atomic transactions that span multiple tables.
pub struct PgRepositories {
    db: Arc<Database>,
    entities: PgEntityRepository,
    events: PgEventRepository,
    cursor: PgCursorRepository,
}

impl PgRepositories {
    /// Create a new repository aggregate from a database connection.
    pub fn new(db: Arc<Database>) -> Self {
        let pool = db.pool().clone();
        Self {
            entities: PgEntityRepository::new(pool.clone()),
            events: PgEventRepository::new(pool),
            cursor: PgCursorRepository::new(&db),
            db,
        }
    }
}

#[async_trait]
impl Repositories for PgRepositories {
    fn entities(&self) -> &dyn EntityRepository {
        &self.entities
    }

    fn events(&self) -> &dyn EventRepository {
        &self.events
    }

    fn cursor(&self) -> &dyn CursorRepository {
        &self.cursor
    }

    async fn persist_event_atomic(&self, data: EventData<'_>) -> StorageResult<()> {
        let mut tx = self
            .db
            .pool()
            .begin()
            .await
            .map_err(|e| StorageError::TransactionError(e.to_string()))?;

        let block_number = data.cursor.position.block_number as i64;

        // Upsert staged entities
        for change in data.changes.iter() {
            sqlx::query(UPSERT_ENTITY_SQL)
                .bind(change.kind)
                .bind(&change.id)
                .bind(&change.data)
                .bind(block_number)
                .execute(&mut *tx)
                .await
                .map_err(|e| StorageError::QueryError(e.to_string()))?;
        }

        // Insert audit record
        let record = data.record;
        sqlx::query(INSERT_EVENT_SQL)
            .bind(&record.id)
            .bind(&record.contract)
            .bind(&record.name)
            .bind(record.block_number as i64)
            .bind(&record.block_hash.0[..])
            .bind(record.timestamp)
            .bind(&record.tx_hash.0[..])
            .bind(record.log_index as i32)
            .bind(&record.address.0[..])
            .bind(&record.params)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::QueryError(e.to_string()))?;

        // Advance cursor
        sqlx::query(UPSERT_CURSOR_SQL)
            .bind(&data.cursor.chain_id)
            .bind(block_number)
            .bind(data.cursor.position.log_index as i32)
            .bind(data.cursor.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::QueryError(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StorageError::TransactionError(e.to_string()))?;

        trace!(
            changes = data.changes.len(),
            position = %data.cursor.position,
            "Event committed"
        );
        Ok(())
    }
}

//! Port traits for data repositories.
//!
//! These traits define the storage interface used by the domain layer.
//! Implementations live in the infrastructure layer (`stakeledger-storage`).

use async_trait::async_trait;

use crate::entity::ChangeSet;
use crate::error::StorageResult;
use crate::models::{EventRecord, IndexerCursor, TxHash};

use super::pagination::{Connection, OrderDirection, Pagination};

// =============================================================================
// Stored types & filters
// =============================================================================

/// An entity row as returned by an index scan.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntity {
    pub kind: String,
    pub id: String,
    pub data: serde_json::Value,
    /// Block of the last event that wrote this entity.
    pub updated_block: u64,
}

/// Filter options for audit record queries.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub contract: Option<String>,
    pub name: Option<String>,
    pub block_number_gte: Option<u64>,
    pub block_number_lte: Option<u64>,
}

// =============================================================================
// Repository Traits
// =============================================================================

/// Keyed entity store with per-kind index scans.
#[async_trait]
pub trait EntityRepository: Send + Sync {
    /// Read an entity by key.
    async fn get_entity(&self, kind: &str, id: &str) -> StorageResult<Option<serde_json::Value>>;

    /// Scan entities of one kind ordered by id.
    async fn list_entities(
        &self,
        kind: &str,
        pagination: Pagination,
        order: OrderDirection,
    ) -> StorageResult<Connection<StoredEntity>>;

    /// Number of entities of one kind.
    async fn count_entities(&self, kind: &str) -> StorageResult<u64>;
}

/// Repository for per-event audit records.
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Get an audit record by ID.
    async fn get_event(&self, id: &str) -> StorageResult<Option<EventRecord>>;

    /// List audit records emitted by one transaction.
    async fn list_events_for_transaction(&self, tx_hash: &TxHash) -> StorageResult<Vec<EventRecord>>;

    /// List audit records with pagination and filtering, in ledger order.
    async fn list_events(
        &self,
        filter: EventFilter,
        pagination: Pagination,
        order: OrderDirection,
    ) -> StorageResult<Connection<EventRecord>>;
}

/// Repository for indexer cursor state.
#[async_trait]
pub trait CursorRepository: Send + Sync {
    /// Get current cursor for a chain.
    async fn get_cursor(&self, chain_id: &str) -> StorageResult<Option<IndexerCursor>>;

    /// Get any existing cursor (for chain mismatch detection).
    async fn get_any_cursor(&self) -> StorageResult<Option<IndexerCursor>>;

    /// Update cursor (upsert).
    async fn set_cursor(&self, cursor: &IndexerCursor) -> StorageResult<()>;
}

// =============================================================================
// Composite Repository
// =============================================================================

/// Data bundle for atomic per-event persistence.
#[derive(Debug)]
pub struct EventData<'a> {
    pub changes: &'a ChangeSet,
    pub record: &'a EventRecord,
    pub cursor: &'a IndexerCursor,
}

/// Combined repository access for the indexer.
#[async_trait]
pub trait Repositories: Send + Sync {
    /// Access the entity repository.
    fn entities(&self) -> &dyn EntityRepository;

    /// Access the audit record repository.
    fn events(&self) -> &dyn EventRepository;

    /// Access the cursor repository.
    fn cursor(&self) -> &dyn CursorRepository;

    /// Persist one event's effects atomically.
    ///
    /// Upserts the staged entities, inserts the audit record and advances
    /// the cursor. If any operation fails, everything is rolled back.
    async fn persist_event_atomic(&self, data: EventData<'_>) -> StorageResult<()>;
}

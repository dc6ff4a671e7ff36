//! In-memory storage adapter.
//!
//! Backs dry runs (`--memory`) and tests. State lives behind a single
//! `tokio::sync::RwLock`, so [`Repositories::persist_event_atomic`] applies
//! an event's changes under one write guard.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use stakeledger_core::error::StorageResult;
use stakeledger_core::models::{EventRecord, IndexerCursor, TxHash};
use stakeledger_core::ports::{
    Connection, Cursor, CursorRepository, Edge, EntityRepository, EventData, EventFilter,
    EventRepository, OrderDirection, PageInfo, Pagination, Repositories, StoredEntity,
};

#[derive(Default)]
struct State {
    /// (kind, id) -> (document, updated_block)
    entities: BTreeMap<(String, String), (serde_json::Value, u64)>,
    /// (block_number, log_index) -> record
    events: BTreeMap<(u64, u32), EventRecord>,
    cursors: HashMap<String, IndexerCursor>,
}

/// In-memory implementation of every repository port.
#[derive(Default)]
pub struct MemoryRepositories {
    state: RwLock<State>,
}

impl MemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of entities across all kinds.
    pub async fn entity_count(&self) -> usize {
        self.state.read().await.entities.len()
    }

    /// Total number of audit records.
    pub async fn event_count(&self) -> usize {
        self.state.read().await.events.len()
    }
}

fn page<T>(
    items: Vec<(String, T)>,
    pagination: &Pagination,
    limit: usize,
) -> Connection<T> {
    let has_more = items.len() > limit;
    let edges: Vec<Edge<T>> = items
        .into_iter()
        .take(limit)
        .map(|(cursor, node)| Edge {
            cursor: Cursor { value: cursor },
            node,
        })
        .collect();

    Connection {
        page_info: PageInfo {
            has_next_page: has_more,
            has_previous_page: pagination.after.is_some(),
            start_cursor: edges.first().map(|e| e.cursor.clone()),
            end_cursor: edges.last().map(|e| e.cursor.clone()),
        },
        edges,
        total_count: None,
    }
}

/// Scan order of entity ids: shorter first, then text. Matches the
/// Postgres adapter, so numeric ids sort numerically.
fn id_key(id: &str) -> (usize, &str) {
    (id.len(), id)
}

#[async_trait]
impl EntityRepository for MemoryRepositories {
    async fn get_entity(&self, kind: &str, id: &str) -> StorageResult<Option<serde_json::Value>> {
        let state = self.state.read().await;
        Ok(state
            .entities
            .get(&(kind.to_string(), id.to_string()))
            .map(|(data, _)| data.clone()))
    }

    async fn list_entities(
        &self,
        kind: &str,
        pagination: Pagination,
        order: OrderDirection,
    ) -> StorageResult<Connection<StoredEntity>> {
        let state = self.state.read().await;
        let limit = pagination.limit() as usize;
        let after = pagination.after.as_ref().map(|c| c.value.as_str());

        let mut items: Vec<_> = state
            .entities
            .iter()
            .filter(|((k, _), _)| k == kind)
            .map(|((k, id), (data, block))| {
                (
                    id.clone(),
                    StoredEntity {
                        kind: k.clone(),
                        id: id.clone(),
                        data: data.clone(),
                        updated_block: *block,
                    },
                )
            })
            .filter(|(id, _)| {
                after.is_none_or(|a| match order {
                    OrderDirection::Asc => id_key(id) > id_key(a),
                    OrderDirection::Desc => id_key(id) < id_key(a),
                })
            })
            .collect();
        items.sort_by(|(a, _), (b, _)| match order {
            OrderDirection::Asc => id_key(a).cmp(&id_key(b)),
            OrderDirection::Desc => id_key(b).cmp(&id_key(a)),
        });
        items.truncate(limit + 1);

        Ok(page(items, &pagination, limit))
    }

    async fn count_entities(&self, kind: &str) -> StorageResult<u64> {
        let state = self.state.read().await;
        Ok(state.entities.keys().filter(|(k, _)| k == kind).count() as u64)
    }
}

#[async_trait]
impl EventRepository for MemoryRepositories {
    async fn get_event(&self, id: &str) -> StorageResult<Option<EventRecord>> {
        let state = self.state.read().await;
        Ok(state.events.values().find(|r| r.id == id).cloned())
    }

    async fn list_events_for_transaction(&self, tx_hash: &TxHash) -> StorageResult<Vec<EventRecord>> {
        let state = self.state.read().await;
        Ok(state
            .events
            .values()
            .filter(|r| r.tx_hash == *tx_hash)
            .cloned()
            .collect())
    }

    async fn list_events(
        &self,
        filter: EventFilter,
        pagination: Pagination,
        order: OrderDirection,
    ) -> StorageResult<Connection<EventRecord>> {
        let state = self.state.read().await;
        let limit = pagination.limit() as usize;

        let matches = |r: &&EventRecord| {
            filter.contract.as_ref().is_none_or(|c| &r.contract == c)
                && filter.name.as_ref().is_none_or(|n| &r.name == n)
                && filter.block_number_gte.is_none_or(|b| r.block_number >= b)
                && filter.block_number_lte.is_none_or(|b| r.block_number <= b)
        };

        let records: Box<dyn Iterator<Item = &EventRecord>> = match order {
            OrderDirection::Asc => Box::new(state.events.values()),
            OrderDirection::Desc => Box::new(state.events.values().rev()),
        };
        let items: Vec<_> = records
            .filter(matches)
            .take(limit + 1)
            .map(|r| (r.id.clone(), r.clone()))
            .collect();

        Ok(page(items, &pagination, limit))
    }
}

#[async_trait]
impl CursorRepository for MemoryRepositories {
    async fn get_cursor(&self, chain_id: &str) -> StorageResult<Option<IndexerCursor>> {
        Ok(self.state.read().await.cursors.get(chain_id).cloned())
    }

    async fn get_any_cursor(&self) -> StorageResult<Option<IndexerCursor>> {
        Ok(self.state.read().await.cursors.values().next().cloned())
    }

    async fn set_cursor(&self, cursor: &IndexerCursor) -> StorageResult<()> {
        self.state
            .write()
            .await
            .cursors
            .insert(cursor.chain_id.clone(), cursor.clone());
        Ok(())
    }
}

#[async_trait]
impl Repositories for MemoryRepositories {
    fn entities(&self) -> &dyn EntityRepository {
        self
    }

    fn events(&self) -> &dyn EventRepository {
        self
    }

    fn cursor(&self) -> &dyn CursorRepository {
        self
    }

    async fn persist_event_atomic(&self, data: EventData<'_>) -> StorageResult<()> {
        let mut state = self.state.write().await;
        let block = data.cursor.position.block_number;

        for change in data.changes.iter() {
            state.entities.insert(
                (change.kind.to_string(), change.id.clone()),
                (change.data.clone(), block),
            );
        }
        state
            .events
            .entry((data.record.block_number, data.record.log_index))
            .or_insert_with(|| data.record.clone());
        state
            .cursors
            .insert(data.cursor.chain_id.clone(), data.cursor.clone());

        Ok(())
    }
}

//! Audit record repository implementation for PostgreSQL.

use async_trait::async_trait;
use sqlx::PgPool;

use stakeledger_core::error::{StorageError, StorageResult};
use stakeledger_core::models::{BlockHash, EventRecord, TxHash};
use stakeledger_core::ports::{
    Connection, Cursor, Edge, EventFilter, EventRepository, OrderDirection, PageInfo, Pagination,
};

use super::helpers::{bytes_to_address, bytes_to_hash32, i64_to_u64};

// =============================================================================
// Repository Implementation
// =============================================================================

/// PostgreSQL implementation of EventRepository.
pub struct PgEventRepository {
    pool: PgPool,
}

impl PgEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub(crate) const INSERT_EVENT_SQL: &str = r#"
    INSERT INTO events (
        id, contract, name, block_number, block_hash, timestamp,
        tx_hash, log_index, address, params
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
    ON CONFLICT (id) DO NOTHING
"#;

const SELECT_COLUMNS: &str = r#"
    id, contract, name, block_number, block_hash, timestamp,
    tx_hash, log_index, address, params
"#;

#[async_trait]
impl EventRepository for PgEventRepository {
    async fn get_event(&self, id: &str) -> StorageResult<Option<EventRecord>> {
        let query = format!("SELECT {} FROM events WHERE id = $1", SELECT_COLUMNS);
        let row = sqlx::query_as::<_, EventRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::QueryError(e.to_string()))?;

        row.map(EventRow::into_record).transpose()
    }

    async fn list_events_for_transaction(&self, tx_hash: &TxHash) -> StorageResult<Vec<EventRecord>> {
        let query = format!(
            "SELECT {} FROM events WHERE tx_hash = $1 ORDER BY log_index ASC",
            SELECT_COLUMNS
        );
        let rows = sqlx::query_as::<_, EventRow>(&query)
            .bind(&tx_hash.0[..])
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::QueryError(e.to_string()))?;

        rows.into_iter().map(EventRow::into_record).collect()
    }

    async fn list_events(
        &self,
        filter: EventFilter,
        pagination: Pagination,
        order: OrderDirection,
    ) -> StorageResult<Connection<EventRecord>> {
        let limit = pagination.limit();
        let order_sql = match order {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        };

        // Column names and operators are hardcoded; every value is bound.
        let mut conditions = Vec::new();
        let mut param_idx = 1;

        if filter.contract.is_some() {
            conditions.push(format!("contract = ${}", param_idx));
            param_idx += 1;
        }
        if filter.name.is_some() {
            conditions.push(format!("name = ${}", param_idx));
            param_idx += 1;
        }
        if filter.block_number_gte.is_some() {
            conditions.push(format!("block_number >= ${}", param_idx));
            param_idx += 1;
        }
        if filter.block_number_lte.is_some() {
            conditions.push(format!("block_number <= ${}", param_idx));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let query = format!(
            r#"
            SELECT {}
            FROM events
            {}
            ORDER BY block_number {}, log_index {}
            LIMIT {}
            "#,
            SELECT_COLUMNS,
            where_clause,
            order_sql,
            order_sql,
            limit + 1
        );

        let mut q = sqlx::query_as::<_, EventRow>(&query);
        if let Some(ref contract) = filter.contract {
            q = q.bind(contract);
        }
        if let Some(ref name) = filter.name {
            q = q.bind(name);
        }
        if let Some(gte) = filter.block_number_gte {
            q = q.bind(gte as i64);
        }
        if let Some(lte) = filter.block_number_lte {
            q = q.bind(lte as i64);
        }
        let rows = q
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::QueryError(e.to_string()))?;

        let has_more = rows.len() > limit as usize;
        let edges: Vec<Edge<EventRecord>> = rows
            .into_iter()
            .take(limit as usize)
            .map(|row| {
                let record = row.into_record()?;
                Ok(Edge {
                    cursor: Cursor {
                        value: record.id.clone(),
                    },
                    node: record,
                })
            })
            .collect::<StorageResult<_>>()?;

        Ok(Connection {
            page_info: PageInfo {
                has_next_page: has_more,
                has_previous_page: pagination.after.is_some(),
                start_cursor: edges.first().map(|e| e.cursor.clone()),
                end_cursor: edges.last().map(|e| e.cursor.clone()),
            },
            edges,
            total_count: None,
        })
    }
}

// =============================================================================
// Row Mapping
// =============================================================================

#[derive(sqlx::FromRow)]
struct EventRow {
    id: String,
    contract: String,
    name: String,
    block_number: i64,
    block_hash: Vec<u8>,
    timestamp: chrono::DateTime<chrono::Utc>,
    tx_hash: Vec<u8>,
    log_index: i32,
    address: Vec<u8>,
    params: serde_json::Value,
}

impl EventRow {
    fn into_record(self) -> StorageResult<EventRecord> {
        Ok(EventRecord {
            id: self.id,
            contract: self.contract,
            name: self.name,
            block_number: i64_to_u64(self.block_number, "event.block_number")?,
            block_hash: BlockHash(bytes_to_hash32(self.block_hash, "event.block_hash")?),
            timestamp: self.timestamp,
            tx_hash: TxHash(bytes_to_hash32(self.tx_hash, "event.tx_hash")?),
            log_index: self.log_index as u32,
            address: bytes_to_address(self.address, "event.address")?,
            params: self.params,
        })
    }
}

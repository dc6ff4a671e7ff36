//! Entity repository implementation for PostgreSQL.
//!
//! All aggregates share the `entities` table, partitioned by `kind`. The
//! JSON document is stored as JSONB so bundle views can project typed
//! columns out of it.

use async_trait::async_trait;
use sqlx::PgPool;

use stakeledger_core::error::{StorageError, StorageResult};
use stakeledger_core::ports::{
    Connection, Cursor, Edge, EntityRepository, OrderDirection, PageInfo, Pagination,
    StoredEntity,
};

use super::helpers::i64_to_u64;

/// PostgreSQL implementation of EntityRepository.
pub struct PgEntityRepository {
    pool: PgPool,
}

impl PgEntityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub(crate) const UPSERT_ENTITY_SQL: &str = r#"
    INSERT INTO entities (kind, id, data, updated_block, updated_at)
    VALUES ($1, $2, $3, $4, NOW())
    ON CONFLICT (kind, id) DO UPDATE SET
        data = EXCLUDED.data,
        updated_block = EXCLUDED.updated_block,
        updated_at = EXCLUDED.updated_at
"#;

/// Keyset scan over one kind, ordered by `(LENGTH(id), id)`.
///
/// Numeric ids (periods) then sort numerically, and fixed-width hex ids
/// keep their plain text order. Only the direction keyword and the
/// comparison operator are interpolated; both come from the enum.
pub(crate) fn list_query(order: OrderDirection, has_after: bool, limit: u32) -> String {
    let (order_sql, after_op) = match order {
        OrderDirection::Asc => ("ASC", ">"),
        OrderDirection::Desc => ("DESC", "<"),
    };
    let after_clause = if has_after {
        format!("AND (LENGTH(id), id) {} (LENGTH($2), $2)", after_op)
    } else {
        String::new()
    };

    format!(
        r#"
        SELECT kind, id, data, updated_block
        FROM entities
        WHERE kind = $1 {}
        ORDER BY LENGTH(id) {}, id {}
        LIMIT {}
        "#,
        after_clause,
        order_sql,
        order_sql,
        limit + 1
    )
}

#[async_trait]
impl EntityRepository for PgEntityRepository {
    async fn get_entity(&self, kind: &str, id: &str) -> StorageResult<Option<serde_json::Value>> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT data FROM entities WHERE kind = $1 AND id = $2")
                .bind(kind)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StorageError::QueryError(e.to_string()))?;

        Ok(row.map(|(data,)| data))
    }

    async fn list_entities(
        &self,
        kind: &str,
        pagination: Pagination,
        order: OrderDirection,
    ) -> StorageResult<Connection<StoredEntity>> {
        let limit = pagination.limit();
        let query = list_query(order, pagination.after.is_some(), limit);

        let mut q = sqlx::query_as::<_, EntityRow>(&query).bind(kind);
        if let Some(ref after) = pagination.after {
            q = q.bind(&after.value);
        }
        let rows = q
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::QueryError(e.to_string()))?;

        let has_more = rows.len() > limit as usize;
        let edges: Vec<Edge<StoredEntity>> = rows
            .into_iter()
            .take(limit as usize)
            .map(|row| {
                let entity = row.into_entity()?;
                Ok(Edge {
                    cursor: Cursor {
                        value: entity.id.clone(),
                    },
                    node: entity,
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

    async fn count_entities(&self, kind: &str) -> StorageResult<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM entities WHERE kind = $1")
            .bind(kind)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::QueryError(e.to_string()))?;

        i64_to_u64(count, "entities.count")
    }
}

// =============================================================================
// Row Mapping
// =============================================================================

#[derive(sqlx::FromRow)]
struct EntityRow {
    kind: String,
    id: String,
    data: serde_json::Value,
    updated_block: i64,
}

impl EntityRow {
    fn into_entity(self) -> StorageResult<StoredEntity> {
        Ok(StoredEntity {
            kind: self.kind,
            id: self.id,
            data: self.data,
            updated_block: i64_to_u64(self.updated_block, "entity.updated_block")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_query_orders_by_length_then_id() {
        let asc = list_query(OrderDirection::Asc, false, 10);
        assert!(asc.contains("ORDER BY LENGTH(id) ASC, id ASC"));
        assert!(asc.contains("LIMIT 11"));
        assert!(!asc.contains("$2"));

        let desc = list_query(OrderDirection::Desc, true, 5);
        assert!(desc.contains("AND (LENGTH(id), id) < (LENGTH($2), $2)"));
        assert!(desc.contains("ORDER BY LENGTH(id) DESC, id DESC"));
    }
}

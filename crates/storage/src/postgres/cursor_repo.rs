//! Cursor repository implementation for PostgreSQL.

use async_trait::async_trait;
use sqlx::PgPool;

use stakeledger_core::error::{StorageError, StorageResult};
use stakeledger_core::models::{IndexerCursor, LogPosition};
use stakeledger_core::ports::CursorRepository;

use super::database::Database;
use super::helpers::i64_to_u64;

/// PostgreSQL implementation of CursorRepository.
pub struct PgCursorRepository {
    pool: PgPool,
}

impl PgCursorRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }
}

pub(crate) const UPSERT_CURSOR_SQL: &str = r#"
    INSERT INTO indexer_cursor (chain_id, block_number, log_index, updated_at)
    VALUES ($1, $2, $3, $4)
    ON CONFLICT (chain_id) DO UPDATE SET
        block_number = EXCLUDED.block_number,
        log_index = EXCLUDED.log_index,
        updated_at = EXCLUDED.updated_at
"#;

#[async_trait]
impl CursorRepository for PgCursorRepository {
    async fn get_cursor(&self, chain_id: &str) -> StorageResult<Option<IndexerCursor>> {
        let row = sqlx::query_as::<_, CursorRow>(
            r#"
            SELECT chain_id, block_number, log_index, updated_at
            FROM indexer_cursor
            WHERE chain_id = $1
            "#,
        )
        .bind(chain_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::QueryError(e.to_string()))?;

        row.map(CursorRow::into_cursor).transpose()
    }

    async fn get_any_cursor(&self) -> StorageResult<Option<IndexerCursor>> {
        let row = sqlx::query_as::<_, CursorRow>(
            r#"
            SELECT chain_id, block_number, log_index, updated_at
            FROM indexer_cursor
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::QueryError(e.to_string()))?;

        row.map(CursorRow::into_cursor).transpose()
    }

    async fn set_cursor(&self, cursor: &IndexerCursor) -> StorageResult<()> {
        sqlx::query(UPSERT_CURSOR_SQL)
            .bind(&cursor.chain_id)
            .bind(cursor.position.block_number as i64)
            .bind(cursor.position.log_index as i32)
            .bind(cursor.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::QueryError(e.to_string()))?;

        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct CursorRow {
    chain_id: String,
    block_number: i64,
    log_index: i32,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl CursorRow {
    fn into_cursor(self) -> StorageResult<IndexerCursor> {
        Ok(IndexerCursor {
            chain_id: self.chain_id,
            position: LogPosition {
                block_number: i64_to_u64(self.block_number, "cursor.block_number")?,
                log_index: self.log_index as u32,
            },
            updated_at: self.updated_at,
        })
    }
}

//! PostgreSQL implementation of the durable store contract.

use std::future::Future;

use async_trait::async_trait;
use deadpool_postgres::{Pool, PoolError};
use serde_json::Value as JsonValue;
use tokio_postgres::Row;
use vercache_core::{
    ConcurrencyError, ContextError, Document, OpContext, Record, StoreKind, Timestamp,
    VercacheError, VercacheResult, Version,
};
use vercache_storage::{ChangeLogEntry, ChangeLogReader, ChangeOperation, DurableStore};

use crate::config::DbConfig;
use crate::schema;

// ============================================================================
// QUERIES
// ============================================================================

pub(crate) const SELECT_RECORD: &str =
    "SELECT id, data, version, created_at, updated_at FROM cacheable_data WHERE id = $1";

pub(crate) const UPSERT_RECORD: &str = "INSERT INTO cacheable_data (id, data) VALUES ($1, $2)
     ON CONFLICT (id) DO UPDATE
     SET data = EXCLUDED.data, version = cacheable_data.version + 1, updated_at = NOW()";

pub(crate) const CONDITIONAL_UPDATE: &str =
    "UPDATE cacheable_data SET data = $1, version = version + 1, updated_at = NOW()
     WHERE id = $2 AND version = $3";

pub(crate) const SELECT_VERSION: &str = "SELECT version FROM cacheable_data WHERE id = $1";

pub(crate) const DELETE_RECORD: &str = "DELETE FROM cacheable_data WHERE id = $1";

pub(crate) const SELECT_CHANGES: &str =
    "SELECT id, operation, table_name, record_id, old_data, new_data, created_at
     FROM cache_invalidation_log WHERE id > $1 ORDER BY id LIMIT $2";

// ============================================================================
// ERROR MAPPING
// ============================================================================

pub(crate) fn durable_error(e: tokio_postgres::Error) -> VercacheError {
    VercacheError::unavailable(StoreKind::Durable, e.to_string())
}

pub(crate) fn pool_error(e: PoolError) -> VercacheError {
    VercacheError::unavailable(StoreKind::Durable, format!("pool: {}", e))
}

/// Run `fut` within the context's remaining time.
async fn bounded<T, F>(ctx: &OpContext, fut: F) -> VercacheResult<T>
where
    F: Future<Output = VercacheResult<T>>,
{
    ctx.check()?;
    match ctx.remaining() {
        Some(remaining) => tokio::time::timeout(remaining, fut)
            .await
            .map_err(|_| VercacheError::from(ContextError::DeadlineExceeded))?,
        None => fut.await,
    }
}

fn record_from_row(row: &Row) -> VercacheResult<Record> {
    let key: String = row.get("id");
    let data: JsonValue = row.get("data");
    let value = match data {
        JsonValue::Object(map) => Document::from(map),
        other => {
            return Err(VercacheError::corruption(
                StoreKind::Durable,
                key,
                format!("expected a JSON object, found {}", other),
            ))
        }
    };
    Ok(Record {
        key,
        value,
        version: row.get("version"),
        created_at: row.get::<_, Timestamp>("created_at"),
        updated_at: row.get::<_, Timestamp>("updated_at"),
    })
}

fn change_from_row(row: &Row) -> VercacheResult<ChangeLogEntry> {
    let record_id: String = row.get("record_id");
    let operation: String = row.get("operation");
    let operation = ChangeOperation::from_db_str(&operation).map_err(|e| {
        VercacheError::corruption(StoreKind::Durable, record_id.clone(), e.to_string())
    })?;
    Ok(ChangeLogEntry {
        id: row.get("id"),
        operation,
        table_name: row.get("table_name"),
        record_id,
        old_data: row.get("old_data"),
        new_data: row.get("new_data"),
        created_at: row.get("created_at"),
    })
}

fn stored_data(value: &Document) -> JsonValue {
    JsonValue::Object(value.without_version().into_map())
}

// ============================================================================
// STORE
// ============================================================================

/// Durable store backed by a pooled PostgreSQL connection.
///
/// Each call checks out one connection, runs its statements and returns it.
/// A conditional update relies on the affected-row count; when nothing was
/// updated a follow-up read tells conflicts and missing keys apart.
#[derive(Clone)]
pub struct PostgresDurableStore {
    pool: Pool,
}

impl PostgresDurableStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a store with a fresh pool built from configuration.
    pub fn from_config(config: &DbConfig) -> VercacheResult<Self> {
        Ok(Self::new(config.create_pool()?))
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Create the tables and trigger if missing.
    pub async fn bootstrap(&self) -> VercacheResult<()> {
        schema::bootstrap(&self.pool).await
    }

    async fn get_conn(&self) -> VercacheResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(pool_error)
    }
}

#[async_trait]
impl DurableStore for PostgresDurableStore {
    async fn get(&self, ctx: &OpContext, key: &str) -> VercacheResult<Option<Record>> {
        bounded(ctx, async {
            let conn = self.get_conn().await?;
            let row = conn
                .query_opt(SELECT_RECORD, &[&key])
                .await
                .map_err(durable_error)?;
            row.as_ref().map(record_from_row).transpose()
        })
        .await
    }

    async fn set(&self, ctx: &OpContext, key: &str, value: &Document) -> VercacheResult<()> {
        let data = stored_data(value);
        bounded(ctx, async {
            let conn = self.get_conn().await?;
            conn.execute(UPSERT_RECORD, &[&key, &data])
                .await
                .map_err(durable_error)?;
            tracing::debug!(key = %key, "Durable upsert");
            Ok(())
        })
        .await
    }

    async fn update(
        &self,
        ctx: &OpContext,
        key: &str,
        value: &Document,
        expected_version: Version,
    ) -> VercacheResult<()> {
        let data = stored_data(value);
        bounded(ctx, async {
            let conn = self.get_conn().await?;
            let updated = conn
                .execute(CONDITIONAL_UPDATE, &[&data, &key, &expected_version])
                .await
                .map_err(durable_error)?;
            if updated > 0 {
                tracing::debug!(key = %key, expected_version, "Durable conditional update");
                return Ok(());
            }

            let actual: Option<Version> = conn
                .query_opt(SELECT_VERSION, &[&key])
                .await
                .map_err(durable_error)?
                .map(|row| row.get(0));
            match actual {
                Some(actual) => {
                    tracing::debug!(key = %key, expected_version, actual, "Version conflict");
                    Err(ConcurrencyError::Conflict {
                        key: key.to_string(),
                        expected: expected_version,
                        actual: Some(actual),
                    }
                    .into())
                }
                None => Err(ConcurrencyError::NotFound {
                    key: key.to_string(),
                }
                .into()),
            }
        })
        .await
    }

    async fn delete(&self, ctx: &OpContext, key: &str) -> VercacheResult<()> {
        bounded(ctx, async {
            let conn = self.get_conn().await?;
            conn.execute(DELETE_RECORD, &[&key])
                .await
                .map_err(durable_error)?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl ChangeLogReader for PostgresDurableStore {
    async fn changes_since(
        &self,
        ctx: &OpContext,
        after_id: i64,
        limit: usize,
    ) -> VercacheResult<Vec<ChangeLogEntry>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        bounded(ctx, async {
            let conn = self.get_conn().await?;
            let rows = conn
                .query(SELECT_CHANGES, &[&after_id, &limit])
                .await
                .map_err(durable_error)?;
            rows.iter().map(change_from_row).collect()
        })
        .await
    }
}

//! In-memory durable store with versioning and a change log.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use vercache_core::{
    ConcurrencyError, Document, OpContext, Record, StoreKind, Timestamp, VercacheError,
    VercacheResult, Version,
};

use crate::change_log::{row_image, ChangeLogEntry, ChangeOperation, RECORD_TABLE};
use crate::faults::{DurableOp, FaultInjector};
use crate::traits::{ChangeLogReader, DurableStore};

#[derive(Debug, Clone)]
struct Row {
    value: Document,
    version: Version,
    created_at: Timestamp,
    updated_at: Timestamp,
}

impl Row {
    fn image(&self, key: &str) -> serde_json::Value {
        row_image(key, &self.value, self.version, self.created_at, self.updated_at)
    }

    fn to_record(&self, key: &str) -> Record {
        Record {
            key: key.to_string(),
            value: self.value.clone(),
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

fn next_version(key: &str, current: Version) -> VercacheResult<Version> {
    current.checked_add(1).ok_or_else(|| {
        ConcurrencyError::VersionExhausted {
            key: key.to_string(),
        }
        .into()
    })
}

#[derive(Debug, Default)]
struct State {
    rows: HashMap<String, Row>,
    log: Vec<ChangeLogEntry>,
}

impl State {
    fn append(
        &mut self,
        operation: ChangeOperation,
        key: &str,
        old_data: Option<serde_json::Value>,
        new_data: Option<serde_json::Value>,
    ) {
        let id = self.log.last().map(|e| e.id + 1).unwrap_or(1);
        self.log.push(ChangeLogEntry {
            id,
            operation,
            table_name: RECORD_TABLE.to_string(),
            record_id: key.to_string(),
            old_data,
            new_data,
            created_at: Utc::now(),
        });
    }
}

/// In-memory implementation of [`DurableStore`] and [`ChangeLogReader`].
///
/// Rows and the change log share one lock, so a mutation and its log entry
/// are applied atomically, the way a row trigger runs inside the writing
/// transaction.
#[derive(Debug, Default)]
pub struct InMemoryDurableStore {
    state: RwLock<State>,
    faults: FaultInjector<DurableOp>,
}

impl InMemoryDurableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call counters and failure switches.
    pub fn faults(&self) -> &FaultInjector<DurableOp> {
        &self.faults
    }

    /// Read a record without going through the contract (not counted, never
    /// fails).
    pub async fn peek(&self, key: &str) -> Option<Record> {
        self.state.read().await.rows.get(key).map(|row| row.to_record(key))
    }

    /// Insert or replace a row with an explicit version. The change is logged
    /// like any other write.
    pub async fn seed(&self, key: &str, value: &Document, version: Version) {
        let now = Utc::now();
        let mut state = self.state.write().await;
        let row = Row {
            value: value.without_version(),
            version,
            created_at: now,
            updated_at: now,
        };
        let new_image = row.image(key);
        let (operation, old_image) = match state.rows.insert(key.to_string(), row) {
            Some(old) => (ChangeOperation::Update, Some(old.image(key))),
            None => (ChangeOperation::Insert, None),
        };
        state.append(operation, key, old_image, Some(new_image));
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.rows.is_empty()
    }

    /// Full change log, oldest first.
    pub async fn change_log(&self) -> Vec<ChangeLogEntry> {
        self.state.read().await.log.clone()
    }

    fn enter(&self, ctx: &OpContext, op: DurableOp) -> VercacheResult<()> {
        ctx.check()?;
        if self.faults.enter(op) {
            return Err(VercacheError::unavailable(
                StoreKind::Durable,
                format!("injected failure on {:?}", op),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl DurableStore for InMemoryDurableStore {
    async fn get(&self, ctx: &OpContext, key: &str) -> VercacheResult<Option<Record>> {
        self.enter(ctx, DurableOp::Get)?;
        Ok(self.state.read().await.rows.get(key).map(|row| row.to_record(key)))
    }

    async fn set(&self, ctx: &OpContext, key: &str, value: &Document) -> VercacheResult<()> {
        self.enter(ctx, DurableOp::Set)?;

        let now = Utc::now();
        let value = value.without_version();
        let mut state = self.state.write().await;

        let (operation, old_image, row) = match state.rows.get(key) {
            Some(existing) => (
                ChangeOperation::Update,
                Some(existing.image(key)),
                Row {
                    value,
                    version: next_version(key, existing.version)?,
                    created_at: existing.created_at,
                    updated_at: now,
                },
            ),
            None => (
                ChangeOperation::Insert,
                None,
                Row {
                    value,
                    version: 1,
                    created_at: now,
                    updated_at: now,
                },
            ),
        };

        let new_image = row.image(key);
        state.rows.insert(key.to_string(), row);
        state.append(operation, key, old_image, Some(new_image));
        Ok(())
    }

    async fn update(
        &self,
        ctx: &OpContext,
        key: &str,
        value: &Document,
        expected_version: Version,
    ) -> VercacheResult<()> {
        self.enter(ctx, DurableOp::Update)?;

        let mut state = self.state.write().await;
        let existing = match state.rows.get(key) {
            Some(row) => row.clone(),
            None => {
                return Err(ConcurrencyError::NotFound {
                    key: key.to_string(),
                }
                .into())
            }
        };

        if existing.version != expected_version {
            return Err(ConcurrencyError::Conflict {
                key: key.to_string(),
                expected: expected_version,
                actual: Some(existing.version),
            }
            .into());
        }

        let row = Row {
            value: value.without_version(),
            version: next_version(key, existing.version)?,
            created_at: existing.created_at,
            updated_at: Utc::now(),
        };
        let old_image = existing.image(key);
        let new_image = row.image(key);
        state.rows.insert(key.to_string(), row);
        state.append(ChangeOperation::Update, key, Some(old_image), Some(new_image));
        Ok(())
    }

    async fn delete(&self, ctx: &OpContext, key: &str) -> VercacheResult<()> {
        self.enter(ctx, DurableOp::Delete)?;

        let mut state = self.state.write().await;
        if let Some(old) = state.rows.remove(key) {
            let old_image = old.image(key);
            state.append(ChangeOperation::Delete, key, Some(old_image), None);
        }
        Ok(())
    }
}

#[async_trait]
impl ChangeLogReader for InMemoryDurableStore {
    async fn changes_since(
        &self,
        ctx: &OpContext,
        after_id: i64,
        limit: usize,
    ) -> VercacheResult<Vec<ChangeLogEntry>> {
        ctx.check()?;
        let state = self.state.read().await;
        Ok(state
            .log
            .iter()
            .filter(|entry| entry.id > after_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

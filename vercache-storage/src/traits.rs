//! Store contracts used by the cache strategies.
//!
//! Both contracts are object-safe async traits so a strategy can hold either
//! a concrete store or an `Arc<dyn ...>`. Every method receives the caller's
//! [`OpContext`]; implementations must honor an already-cancelled or expired
//! context by failing before doing any I/O.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use vercache_core::{Document, OpContext, Record, VercacheResult, Version};

use crate::change_log::ChangeLogEntry;

/// Fast, expiring key-value store (the cache).
///
/// # Failure modes
///
/// - A missing key is `Ok(None)`, never an error.
/// - Connectivity problems are `StoreError::Unavailable`.
/// - Bytes that fail to decode are `StoreError::Corruption`.
#[async_trait]
pub trait VolatileStore: Send + Sync {
    /// Read a cached document.
    async fn get(&self, ctx: &OpContext, key: &str) -> VercacheResult<Option<Document>>;

    /// Write a document with a time-to-live measured from now.
    ///
    /// A zero `ttl` stores the value without expiry.
    async fn set(
        &self,
        ctx: &OpContext,
        key: &str,
        value: &Document,
        ttl: Duration,
    ) -> VercacheResult<()>;

    /// Remove a key. Removing a missing key succeeds.
    async fn delete(&self, ctx: &OpContext, key: &str) -> VercacheResult<()>;

    /// Write several fields of a hash-structured entry.
    async fn hset(&self, ctx: &OpContext, key: &str, fields: &Document) -> VercacheResult<()>;

    /// Read every field of a hash-structured entry. A missing key yields an
    /// empty map.
    async fn hgetall(&self, ctx: &OpContext, key: &str) -> VercacheResult<HashMap<String, String>>;
}

/// Authoritative, versioned record store.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Read a record.
    async fn get(&self, ctx: &OpContext, key: &str) -> VercacheResult<Option<Record>>;

    /// Unconditional upsert. A new key starts at version 1; an existing key has
    /// its value replaced and its version incremented.
    async fn set(&self, ctx: &OpContext, key: &str, value: &Document) -> VercacheResult<()>;

    /// Conditional write. Succeeds only if the stored version equals
    /// `expected_version`, incrementing it by one.
    ///
    /// Zero affected rows is reported as `ConcurrencyError::Conflict` when the
    /// key exists and `ConcurrencyError::NotFound` when it does not.
    async fn update(
        &self,
        ctx: &OpContext,
        key: &str,
        value: &Document,
        expected_version: Version,
    ) -> VercacheResult<()>;

    /// Delete a record. Deleting a missing key succeeds.
    async fn delete(&self, ctx: &OpContext, key: &str) -> VercacheResult<()>;
}

/// Read access to the append-only change log kept by a durable store.
#[async_trait]
pub trait ChangeLogReader: Send + Sync {
    /// Entries with `id > after_id`, oldest first, at most `limit` of them.
    async fn changes_since(
        &self,
        ctx: &OpContext,
        after_id: i64,
        limit: usize,
    ) -> VercacheResult<Vec<ChangeLogEntry>>;
}

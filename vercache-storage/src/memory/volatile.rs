//! In-memory volatile store with lazy expiry.
//!
//! Values are kept in their encoded form, exactly as a networked key-value
//! server would hold them, so decoding failures surface as corruption errors.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use vercache_core::{Document, OpContext, StoreKind, Timestamp, VercacheError, VercacheResult};

use crate::faults::{FaultInjector, VolatileOp};
use crate::traits::VolatileStore;

#[derive(Debug, Clone)]
struct Entry {
    bytes: Vec<u8>,
    expires_at: Option<Timestamp>,
}

impl Entry {
    fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.map(|at| now >= at).unwrap_or(false)
    }
}

/// Absolute expiry for `ttl`. Zero, or a TTL reaching past the last
/// representable timestamp, means the entry never expires.
fn expiry_from(ttl: Duration) -> Option<Timestamp> {
    if ttl.is_zero() {
        return None;
    }
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| Utc::now().checked_add_signed(ttl))
}

/// In-memory implementation of [`VolatileStore`].
///
/// Uses `tokio::sync::RwLock` for async access. Every contract call is
/// counted and can be made to fail through [`InMemoryVolatileStore::faults`].
#[derive(Debug, Default)]
pub struct InMemoryVolatileStore {
    values: RwLock<HashMap<String, Entry>>,
    hashes: RwLock<HashMap<String, HashMap<String, String>>>,
    faults: FaultInjector<VolatileOp>,
}

impl InMemoryVolatileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call counters and failure switches.
    pub fn faults(&self) -> &FaultInjector<VolatileOp> {
        &self.faults
    }

    /// Read a live value without going through the contract (not counted,
    /// never fails).
    pub async fn peek(&self, key: &str) -> Option<Document> {
        let values = self.values.read().await;
        values
            .get(key)
            .filter(|entry| !entry.is_expired(Utc::now()))
            .and_then(|entry| Document::decode(&entry.bytes).ok())
    }

    /// Remaining lifetime of a live key. Keys without expiry report
    /// `Duration::MAX`.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Utc::now();
        let values = self.values.read().await;
        let entry = values.get(key).filter(|entry| !entry.is_expired(now))?;
        match entry.expires_at {
            Some(at) => at.signed_duration_since(now).to_std().ok(),
            None => Some(Duration::MAX),
        }
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.peek_raw(key).await.is_some()
    }

    /// Store raw bytes, bypassing encoding. Used to simulate corrupted data.
    pub async fn insert_raw(&self, key: &str, bytes: Vec<u8>, ttl: Duration) -> VercacheResult<()> {
        let expires_at = expiry_from(ttl);
        self.values
            .write()
            .await
            .insert(key.to_string(), Entry { bytes, expires_at });
        Ok(())
    }

    /// Number of physically present string entries, expired or not.
    pub async fn len(&self) -> usize {
        self.values.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.values.read().await.is_empty()
    }

    async fn peek_raw(&self, key: &str) -> Option<Vec<u8>> {
        let values = self.values.read().await;
        values
            .get(key)
            .filter(|entry| !entry.is_expired(Utc::now()))
            .map(|entry| entry.bytes.clone())
    }

    fn enter(&self, ctx: &OpContext, op: VolatileOp) -> VercacheResult<()> {
        ctx.check()?;
        if self.faults.enter(op) {
            return Err(VercacheError::unavailable(
                StoreKind::Volatile,
                format!("injected failure on {:?}", op),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl VolatileStore for InMemoryVolatileStore {
    async fn get(&self, ctx: &OpContext, key: &str) -> VercacheResult<Option<Document>> {
        self.enter(ctx, VolatileOp::Get)?;

        let now = Utc::now();
        let bytes = {
            let values = self.values.read().await;
            match values.get(key) {
                Some(entry) if !entry.is_expired(now) => entry.bytes.clone(),
                Some(_) | None => return Ok(None),
            }
        };

        Document::decode(&bytes)
            .map(Some)
            .map_err(|e| VercacheError::corruption(StoreKind::Volatile, key, e.to_string()))
    }

    async fn set(
        &self,
        ctx: &OpContext,
        key: &str,
        value: &Document,
        ttl: Duration,
    ) -> VercacheResult<()> {
        self.enter(ctx, VolatileOp::Set)?;

        let bytes = value.encode()?;
        let expires_at = expiry_from(ttl);
        self.values
            .write()
            .await
            .insert(key.to_string(), Entry { bytes, expires_at });
        Ok(())
    }

    async fn delete(&self, ctx: &OpContext, key: &str) -> VercacheResult<()> {
        self.enter(ctx, VolatileOp::Delete)?;

        self.values.write().await.remove(key);
        self.hashes.write().await.remove(key);
        Ok(())
    }

    async fn hset(&self, ctx: &OpContext, key: &str, fields: &Document) -> VercacheResult<()> {
        self.enter(ctx, VolatileOp::HSet)?;

        let mut hashes = self.hashes.write().await;
        hashes
            .entry(key.to_string())
            .or_default()
            .extend(fields.to_field_strings());
        Ok(())
    }

    async fn hgetall(&self, ctx: &OpContext, key: &str) -> VercacheResult<HashMap<String, String>> {
        self.enter(ctx, VolatileOp::HGetAll)?;

        Ok(self.hashes.read().await.get(key).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vercache_core::{ContextError, StoreError};

    fn doc() -> Document {
        Document::new().with("data", "hello")
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let store = InMemoryVolatileStore::new();
        let ctx = OpContext::background();

        store.set(&ctx, "k", &doc(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get(&ctx, "k").await.unwrap(), Some(doc()));
        assert_eq!(store.faults().calls(VolatileOp::Set), 1);
        assert_eq!(store.faults().calls(VolatileOp::Get), 1);
    }

    #[tokio::test]
    async fn test_missing_key_is_none() {
        let store = InMemoryVolatileStore::new();
        let ctx = OpContext::background();
        assert_eq!(store.get(&ctx, "missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_entry_is_absent() {
        let store = InMemoryVolatileStore::new();
        let ctx = OpContext::background();

        store.set(&ctx, "k", &doc(), Duration::from_millis(20)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(store.get(&ctx, "k").await.unwrap(), None);
        assert!(store.ttl("k").await.is_none());
    }

    #[tokio::test]
    async fn test_zero_ttl_never_expires() {
        let store = InMemoryVolatileStore::new();
        let ctx = OpContext::background();

        store.set(&ctx, "k", &doc(), Duration::ZERO).await.unwrap();
        assert_eq!(store.ttl("k").await, Some(Duration::MAX));
    }

    #[tokio::test]
    async fn test_unrepresentable_ttl_never_expires() {
        let store = InMemoryVolatileStore::new();
        let ctx = OpContext::background();

        store
            .set(&ctx, "k", &doc(), Duration::from_secs(1_000_000_000_000_000))
            .await
            .unwrap();
        assert_eq!(store.peek("k").await, Some(doc()));
        assert_eq!(store.ttl("k").await, Some(Duration::MAX));
    }

    #[tokio::test]
    async fn test_ttl_reports_remaining_lifetime() {
        let store = InMemoryVolatileStore::new();
        let ctx = OpContext::background();

        store.set(&ctx, "k", &doc(), Duration::from_secs(300)).await.unwrap();
        let remaining = store.ttl("k").await.unwrap();
        assert!(remaining <= Duration::from_secs(300));
        assert!(remaining > Duration::from_secs(295));
    }

    #[tokio::test]
    async fn test_corrupt_bytes_are_an_error() {
        let store = InMemoryVolatileStore::new();
        let ctx = OpContext::background();

        store
            .insert_raw("k", b"{not json".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();

        let err = store.get(&ctx, "k").await.unwrap_err();
        assert!(err.is_corruption());
        assert!(matches!(
            err,
            VercacheError::Store(StoreError::Corruption { store: StoreKind::Volatile, .. })
        ));
    }

    #[tokio::test]
    async fn test_injected_failure_is_unavailable() {
        let store = InMemoryVolatileStore::new();
        let ctx = OpContext::background();

        store.faults().fail_once(VolatileOp::Delete);
        let err = store.delete(&ctx, "k").await.unwrap_err();
        assert!(err.is_unavailable());
        assert!(store.delete(&ctx, "k").await.is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_context_is_not_counted() {
        let store = InMemoryVolatileStore::new();
        let (handle, ctx) = OpContext::cancellable();
        handle.cancel();

        let err = store.get(&ctx, "k").await.unwrap_err();
        assert_eq!(err, VercacheError::Context(ContextError::Cancelled));
        assert_eq!(store.faults().calls(VolatileOp::Get), 0);
    }

    #[tokio::test]
    async fn test_hash_fields() {
        let store = InMemoryVolatileStore::new();
        let ctx = OpContext::background();

        assert!(store.hgetall(&ctx, "h").await.unwrap().is_empty());

        store
            .hset(&ctx, "h", &Document::new().with("name", "alice").with("age", 30))
            .await
            .unwrap();
        store
            .hset(&ctx, "h", &Document::new().with("age", 31))
            .await
            .unwrap();

        let fields = store.hgetall(&ctx, "h").await.unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields["name"], "alice");
        assert_eq!(fields["age"], "31");

        store.delete(&ctx, "h").await.unwrap();
        assert!(store.hgetall(&ctx, "h").await.unwrap().is_empty());
    }
}

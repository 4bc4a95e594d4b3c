//! Cache-aside: the durable store is written first, the cache follows.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use vercache_core::constants::DEFAULT_CACHE_ASIDE_TTL_SECS;
use vercache_core::{Document, OpContext, VercacheResult};

use super::{BestEffort, CacheStrategy, StrategyCounters, StrategyKind, StrategyStats};
use crate::traits::{DurableStore, VolatileStore};
use crate::warnings::{TracingWarningSink, WarningKind, WarningSink};

/// Cache-aside strategy.
///
/// - Reads try the cache; on a miss the durable record is copied into the
///   cache (best effort) and returned.
/// - Writes go to the durable store first; the cache is only written once
///   the durable write succeeded.
/// - Updates re-read the durable record and cache the fresh snapshot, so the
///   cached version is always the one the durable store assigned.
pub struct CacheAside<V: ?Sized = dyn VolatileStore, D: ?Sized = dyn DurableStore> {
    volatile: Arc<V>,
    durable: Arc<D>,
    ttl: Duration,
    warnings: Arc<dyn WarningSink>,
    counters: StrategyCounters,
}

impl<V, D> CacheAside<V, D>
where
    V: VolatileStore + ?Sized,
    D: DurableStore + ?Sized,
{
    /// Create a strategy with the default 5 minute TTL.
    pub fn new(volatile: Arc<V>, durable: Arc<D>) -> Self {
        Self::with_ttl(
            volatile,
            durable,
            Duration::from_secs(DEFAULT_CACHE_ASIDE_TTL_SECS),
        )
    }

    pub fn with_ttl(volatile: Arc<V>, durable: Arc<D>, ttl: Duration) -> Self {
        Self {
            volatile,
            durable,
            ttl,
            warnings: Arc::new(TracingWarningSink),
            counters: StrategyCounters::default(),
        }
    }

    /// Replace the default tracing sink.
    pub fn with_warning_sink(mut self, warnings: Arc<dyn WarningSink>) -> Self {
        self.warnings = warnings;
        self
    }

    /// TTL applied to every cache write.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn best_effort(&self) -> BestEffort<'_> {
        BestEffort {
            strategy: StrategyKind::CacheAside,
            sink: self.warnings.as_ref(),
            counters: &self.counters,
        }
    }
}

#[async_trait]
impl<V, D> CacheStrategy for CacheAside<V, D>
where
    V: VolatileStore + ?Sized,
    D: DurableStore + ?Sized,
{
    fn kind(&self) -> StrategyKind {
        StrategyKind::CacheAside
    }

    async fn get(&self, ctx: &OpContext, key: &str) -> VercacheResult<Option<Document>> {
        ctx.check()?;
        if let Some(cached) = self.volatile.get(ctx, key).await? {
            self.counters.hit();
            tracing::debug!(key = %key, "Cache hit");
            return Ok(Some(cached));
        }
        self.counters.miss();

        ctx.check()?;
        let record = match self.durable.get(ctx, key).await? {
            Some(record) => record,
            None => {
                tracing::debug!(key = %key, "Cache miss, no durable record");
                return Ok(None);
            }
        };

        let snapshot = record.snapshot();
        ctx.check()?;
        if let Err(e) = self.volatile.set(ctx, key, &snapshot, self.ttl).await {
            self.best_effort()
                .swallow(WarningKind::PopulateFailed, key, e);
        } else {
            tracing::debug!(key = %key, version = record.version, "Cache populated from durable store");
        }

        Ok(Some(snapshot))
    }

    async fn set(&self, ctx: &OpContext, key: &str, value: &Document) -> VercacheResult<()> {
        ctx.check()?;
        self.durable.set(ctx, key, value).await?;

        ctx.check()?;
        self.volatile.set(ctx, key, value, self.ttl).await?;
        tracing::debug!(key = %key, "Cache-aside set complete");
        Ok(())
    }

    async fn update(&self, ctx: &OpContext, key: &str, value: &Document) -> VercacheResult<()> {
        let expected = value.expected_version()?;

        ctx.check()?;
        self.durable.update(ctx, key, value, expected).await?;

        ctx.check()?;
        let fresh = self.durable.get(ctx, key).await?;

        ctx.check()?;
        match fresh {
            Some(record) => {
                self.volatile
                    .set(ctx, key, &record.snapshot(), self.ttl)
                    .await?;
                tracing::debug!(key = %key, version = record.version, "Cache-aside update complete");
            }
            None => {
                // Deleted between the update and the re-read.
                self.volatile.delete(ctx, key).await?;
                tracing::debug!(key = %key, "Record vanished after update, cache invalidated");
            }
        }
        Ok(())
    }

    async fn delete(&self, ctx: &OpContext, key: &str) -> VercacheResult<()> {
        ctx.check()?;
        self.best_effort()
            .invalidate(self.volatile.as_ref(), ctx, key)
            .await?;

        ctx.check()?;
        self.durable.delete(ctx, key).await
    }

    fn stats(&self) -> StrategyStats {
        self.counters.snapshot()
    }
}

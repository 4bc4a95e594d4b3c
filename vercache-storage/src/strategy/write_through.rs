//! Write-through: the cache is written first, the durable store follows.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use vercache_core::constants::DEFAULT_WRITE_THROUGH_TTL_SECS;
use vercache_core::{Document, OpContext, VercacheResult};

use super::{BestEffort, CacheStrategy, StrategyCounters, StrategyKind, StrategyStats};
use crate::traits::{DurableStore, VolatileStore};
use crate::warnings::{TracingWarningSink, WarningSink};

/// Write-through strategy.
///
/// Reads are served from the cache only. Writes hit the cache first and
/// reach the durable store only if the cache write succeeded; a durable
/// failure after that leaves the cache holding the new value.
///
/// An update caches the request document as given, so the cached `version`
/// field is the version the caller expected, not the one the durable store
/// assigned.
pub struct WriteThrough<V: ?Sized = dyn VolatileStore, D: ?Sized = dyn DurableStore> {
    volatile: Arc<V>,
    durable: Arc<D>,
    ttl: Duration,
    warnings: Arc<dyn WarningSink>,
    counters: StrategyCounters,
}

impl<V, D> WriteThrough<V, D>
where
    V: VolatileStore + ?Sized,
    D: DurableStore + ?Sized,
{
    /// Create a strategy with the default 10 minute TTL.
    pub fn new(volatile: Arc<V>, durable: Arc<D>) -> Self {
        Self::with_ttl(
            volatile,
            durable,
            Duration::from_secs(DEFAULT_WRITE_THROUGH_TTL_SECS),
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

    pub fn with_warning_sink(mut self, warnings: Arc<dyn WarningSink>) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn best_effort(&self) -> BestEffort<'_> {
        BestEffort {
            strategy: StrategyKind::WriteThrough,
            sink: self.warnings.as_ref(),
            counters: &self.counters,
        }
    }
}

#[async_trait]
impl<V, D> CacheStrategy for WriteThrough<V, D>
where
    V: VolatileStore + ?Sized,
    D: DurableStore + ?Sized,
{
    fn kind(&self) -> StrategyKind {
        StrategyKind::WriteThrough
    }

    async fn get(&self, ctx: &OpContext, key: &str) -> VercacheResult<Option<Document>> {
        ctx.check()?;
        let cached = self.volatile.get(ctx, key).await?;
        if cached.is_some() {
            self.counters.hit();
        } else {
            self.counters.miss();
        }
        Ok(cached)
    }

    async fn set(&self, ctx: &OpContext, key: &str, value: &Document) -> VercacheResult<()> {
        ctx.check()?;
        self.volatile.set(ctx, key, value, self.ttl).await?;

        ctx.check()?;
        self.durable.set(ctx, key, value).await?;
        tracing::debug!(key = %key, "Write-through set complete");
        Ok(())
    }

    async fn update(&self, ctx: &OpContext, key: &str, value: &Document) -> VercacheResult<()> {
        let expected = value.expected_version()?;

        ctx.check()?;
        self.volatile.set(ctx, key, value, self.ttl).await?;

        ctx.check()?;
        self.durable.update(ctx, key, value, expected).await?;
        tracing::debug!(key = %key, expected, "Write-through update complete");
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

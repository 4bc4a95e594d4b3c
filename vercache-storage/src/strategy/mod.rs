//! Cache-consistency strategies.
//!
//! A strategy decides, for each operation, in which order the volatile and
//! durable stores are touched and which failures are fatal. Two are provided:
//!
//! | Strategy        | Read                         | Write order            | TTL    |
//! |-----------------|------------------------------|------------------------|--------|
//! | [`CacheAside`]  | cache, then durable + populate | durable, then cache  | 5 min  |
//! | [`WriteThrough`]| cache only                   | cache, then durable    | 10 min |
//!
//! Deletes are identical for both: best-effort cache invalidation, then the
//! durable delete whose result is returned.
//!
//! Strategies never retry and never take locks. Concurrent updates race at the
//! durable store's conditional update; the loser gets
//! [`ConcurrencyError::Conflict`](vercache_core::ConcurrencyError::Conflict).

mod cache_aside;
mod write_through;

pub use cache_aside::CacheAside;
pub use write_through::WriteThrough;

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use vercache_core::{Document, OpContext, StrategyConfig, VercacheResult};

use crate::traits::{DurableStore, VolatileStore};
use crate::warnings::{CacheWarning, WarningKind, WarningSink};

/// Common interface of every cache strategy.
#[async_trait]
pub trait CacheStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Read a document. `Ok(None)` when absent.
    async fn get(&self, ctx: &OpContext, key: &str) -> VercacheResult<Option<Document>>;

    /// Unconditional write.
    async fn set(&self, ctx: &OpContext, key: &str, value: &Document) -> VercacheResult<()>;

    /// Conditional write. `value` must carry the expected version in its
    /// reserved `version` field.
    async fn update(&self, ctx: &OpContext, key: &str, value: &Document) -> VercacheResult<()>;

    async fn delete(&self, ctx: &OpContext, key: &str) -> VercacheResult<()>;

    /// Counters since construction.
    fn stats(&self) -> StrategyStats;
}

// ============================================================================
// STRATEGY KIND
// ============================================================================

/// Which strategy to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    CacheAside,
    WriteThrough,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::CacheAside => "cache-aside",
            StrategyKind::WriteThrough => "write-through",
        }
    }

    /// Parse a strategy name. Underscores are accepted in place of dashes.
    pub fn from_name(s: &str) -> Result<Self, StrategyKindParseError> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "cache-aside" => Ok(StrategyKind::CacheAside),
            "write-through" => Ok(StrategyKind::WriteThrough),
            _ => Err(StrategyKindParseError(s.to_string())),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = StrategyKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyKindParseError(pub String);

impl fmt::Display for StrategyKindParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown cache strategy: {}", self.0)
    }
}

impl std::error::Error for StrategyKindParseError {}

/// Build a strategy over shared store handles.
///
/// Validates `config` first so a zero TTL never reaches the volatile store.
pub fn build_strategy(
    kind: StrategyKind,
    volatile: Arc<dyn VolatileStore>,
    durable: Arc<dyn DurableStore>,
    config: &StrategyConfig,
    warnings: Arc<dyn WarningSink>,
) -> VercacheResult<Box<dyn CacheStrategy>> {
    config.validate()?;
    let strategy: Box<dyn CacheStrategy> = match kind {
        StrategyKind::CacheAside => Box::new(
            CacheAside::with_ttl(volatile, durable, config.cache_aside_ttl)
                .with_warning_sink(warnings),
        ),
        StrategyKind::WriteThrough => Box::new(
            WriteThrough::with_ttl(volatile, durable, config.write_through_ttl)
                .with_warning_sink(warnings),
        ),
    };
    Ok(strategy)
}

// ============================================================================
// STATISTICS
// ============================================================================

/// Snapshot of a strategy's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StrategyStats {
    /// Reads answered by the volatile store.
    pub hits: u64,
    /// Reads the volatile store could not answer.
    pub misses: u64,
    /// Swallowed volatile-store failures.
    pub best_effort_failures: u64,
}

impl StrategyStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct StrategyCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    best_effort_failures: AtomicU64,
}

impl StrategyCounters {
    pub(crate) fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> StrategyStats {
        StrategyStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            best_effort_failures: self.best_effort_failures.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// SHARED STEPS
// ============================================================================

/// Reporting context for a best-effort step.
pub(crate) struct BestEffort<'a> {
    pub(crate) strategy: StrategyKind,
    pub(crate) sink: &'a dyn WarningSink,
    pub(crate) counters: &'a StrategyCounters,
}

impl BestEffort<'_> {
    /// Record a swallowed failure.
    pub(crate) fn swallow(&self, kind: WarningKind, key: &str, error: vercache_core::VercacheError) {
        self.counters
            .best_effort_failures
            .fetch_add(1, Ordering::Relaxed);
        self.sink
            .record(CacheWarning::new(self.strategy, kind, key, error));
    }

    /// Delete `key` from the volatile store, swallowing store failures.
    ///
    /// Context errors are not swallowed: a cancelled caller must not go on
    /// to the durable delete.
    pub(crate) async fn invalidate<V>(&self, volatile: &V, ctx: &OpContext, key: &str) -> VercacheResult<()>
    where
        V: VolatileStore + ?Sized,
    {
        match volatile.delete(ctx, key).await {
            Ok(()) => Ok(()),
            Err(e @ vercache_core::VercacheError::Context(_)) => Err(e),
            Err(e) => {
                self.swallow(WarningKind::InvalidateFailed, key, e);
                Ok(())
            }
        }
    }
}

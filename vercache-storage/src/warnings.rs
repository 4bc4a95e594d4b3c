//! Best-effort failure reporting.
//!
//! Strategies swallow cache populate and invalidate failures so that the
//! caller's operation still succeeds. Each swallowed failure is handed to a
//! [`WarningSink`] instead of being dropped silently.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use vercache_core::{Timestamp, VercacheError};

use crate::strategy::StrategyKind;

/// What the strategy was trying to do when the volatile store failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarningKind {
    /// Writing a value into the cache.
    PopulateFailed,
    /// Deleting a key from the cache.
    InvalidateFailed,
}

impl WarningKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningKind::PopulateFailed => "populate_failed",
            WarningKind::InvalidateFailed => "invalidate_failed",
        }
    }
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A swallowed volatile-store failure.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheWarning {
    pub strategy: StrategyKind,
    pub kind: WarningKind,
    pub key: String,
    pub error: VercacheError,
    pub at: Timestamp,
}

impl CacheWarning {
    pub fn new(
        strategy: StrategyKind,
        kind: WarningKind,
        key: impl Into<String>,
        error: VercacheError,
    ) -> Self {
        Self {
            strategy,
            kind,
            key: key.into(),
            error,
            at: Utc::now(),
        }
    }
}

/// Receiver for best-effort failures.
pub trait WarningSink: Send + Sync {
    fn record(&self, warning: CacheWarning);
}

/// Emits each warning as a `tracing` event at WARN level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingWarningSink;

impl WarningSink for TracingWarningSink {
    fn record(&self, warning: CacheWarning) {
        tracing::warn!(
            strategy = %warning.strategy,
            kind = %warning.kind,
            key = %warning.key,
            error = %warning.error,
            "Best-effort cache operation failed"
        );
    }
}

/// Collects warnings in memory for later inspection.
#[derive(Debug, Default)]
pub struct MemoryWarningSink {
    warnings: Mutex<Vec<CacheWarning>>,
}

impl MemoryWarningSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warnings(&self) -> Vec<CacheWarning> {
        self.warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain everything recorded so far.
    pub fn take(&self) -> Vec<CacheWarning> {
        std::mem::take(&mut *self.warnings.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl WarningSink for MemoryWarningSink {
    fn record(&self, warning: CacheWarning) {
        self.warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(warning);
    }
}

//! Version Sweep Background Task
//!
//! Periodically calls [`VersionManager::cleanup_expired`] so that expired
//! entries do not accumulate between reads. Lazy expiry already hides them
//! from readers; the sweep only reclaims memory.
//!
//! # Configuration
//!
//! ```rust
//! use vercache_core::SweepConfig;
//! use std::time::Duration;
//!
//! let config = SweepConfig::default()
//!     .with_interval(Duration::from_secs(30))
//!     .with_logging(false);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use vercache_core::SweepConfig;

use crate::version::VersionManager;

// ============================================================================
// METRICS
// ============================================================================

/// Counters for sweep activity.
#[derive(Debug, Default)]
pub struct SweepMetrics {
    /// Total sweep cycles completed
    pub sweep_cycles: AtomicU64,

    /// Total expired entries removed since startup
    pub entries_removed: AtomicU64,
}

impl SweepMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current snapshot of all metrics.
    pub fn snapshot(&self) -> SweepSnapshot {
        SweepSnapshot {
            sweep_cycles: self.sweep_cycles.load(Ordering::Relaxed),
            entries_removed: self.entries_removed.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of sweep metrics at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepSnapshot {
    pub sweep_cycles: u64,
    pub entries_removed: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Sweep expired version entries until the shutdown signal is received.
///
/// The first sweep runs immediately; later ones follow `config.interval`.
/// Missed ticks are skipped rather than bunched.
///
/// # Example
///
/// ```ignore
/// let (shutdown_tx, shutdown_rx) = watch::channel(false);
/// let versions = Arc::new(VersionManager::new());
///
/// let handle = tokio::spawn(version_sweep_task(
///     Arc::clone(&versions),
///     SweepConfig::from_env(),
///     shutdown_rx,
/// ));
///
/// // Later
/// let _ = shutdown_tx.send(true);
/// let metrics = handle.await?;
/// ```
pub async fn version_sweep_task(
    versions: Arc<VersionManager>,
    config: SweepConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<SweepMetrics> {
    let metrics = Arc::new(SweepMetrics::new());

    let mut sweep_interval = interval(config.interval);
    sweep_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        interval_ms = config.interval.as_millis() as u64,
        "Version sweep task started"
    );

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                // A dropped sender also means shutdown.
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::info!("Version sweep task shutting down");
                    break;
                }
            }

            _ = sweep_interval.tick() => {
                sweep_once(&versions, &config, &metrics);
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        sweep_cycles = snapshot.sweep_cycles,
        entries_removed = snapshot.entries_removed,
        "Version sweep task completed"
    );

    metrics
}

fn sweep_once(versions: &VersionManager, config: &SweepConfig, metrics: &SweepMetrics) {
    let removed = versions.cleanup_expired();
    metrics.sweep_cycles.fetch_add(1, Ordering::Relaxed);
    metrics
        .entries_removed
        .fetch_add(removed as u64, Ordering::Relaxed);

    if removed > 0 && config.log_sweeps {
        tracing::info!(removed, remaining = versions.len(), "Swept expired versions");
    } else {
        tracing::trace!("Version sweep found nothing to remove");
    }
}

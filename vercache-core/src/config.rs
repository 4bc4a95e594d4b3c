//! Configuration types

use crate::constants::{
    DEFAULT_CACHE_ASIDE_TTL_SECS, DEFAULT_VERSION_SWEEP_INTERVAL_SECS, DEFAULT_VERSION_TTL_SECS,
    DEFAULT_WRITE_THROUGH_TTL_SECS, MAX_TTL_SECS,
};
use crate::error::{ConfigError, VercacheResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn env_secs(name: &str, default: u64) -> Duration {
    Duration::from_secs(
        std::env::var(name)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(default),
    )
}

fn require_non_zero(field: &str, value: Duration) -> VercacheResult<()> {
    if value.is_zero() {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: format!("{:?}", value),
            reason: "must be greater than zero".to_string(),
        }
        .into());
    }
    Ok(())
}

fn require_ttl(field: &str, value: Duration) -> VercacheResult<()> {
    require_non_zero(field, value)?;
    if value > Duration::from_secs(MAX_TTL_SECS) {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: format!("{:?}", value),
            reason: format!("must not exceed {} seconds", MAX_TTL_SECS),
        }
        .into());
    }
    Ok(())
}

// ============================================================================
// STRATEGY CONFIG
// ============================================================================

/// Cache lifetimes for the two strategies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// TTL applied by cache-aside writes and read-through populates.
    pub cache_aside_ttl: Duration,
    /// TTL applied by write-through writes.
    pub write_through_ttl: Duration,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            cache_aside_ttl: Duration::from_secs(DEFAULT_CACHE_ASIDE_TTL_SECS),
            write_through_ttl: Duration::from_secs(DEFAULT_WRITE_THROUGH_TTL_SECS),
        }
    }
}

impl StrategyConfig {
    /// Create StrategyConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `VERCACHE_CACHE_ASIDE_TTL_SECS` (default: 300)
    /// - `VERCACHE_WRITE_THROUGH_TTL_SECS` (default: 600)
    pub fn from_env() -> Self {
        Self {
            cache_aside_ttl: env_secs("VERCACHE_CACHE_ASIDE_TTL_SECS", DEFAULT_CACHE_ASIDE_TTL_SECS),
            write_through_ttl: env_secs(
                "VERCACHE_WRITE_THROUGH_TTL_SECS",
                DEFAULT_WRITE_THROUGH_TTL_SECS,
            ),
        }
    }

    pub fn with_cache_aside_ttl(mut self, ttl: Duration) -> Self {
        self.cache_aside_ttl = ttl;
        self
    }

    pub fn with_write_through_ttl(mut self, ttl: Duration) -> Self {
        self.write_through_ttl = ttl;
        self
    }

    pub fn validate(&self) -> VercacheResult<()> {
        require_ttl("cache_aside_ttl", self.cache_aside_ttl)?;
        require_ttl("write_through_ttl", self.write_through_ttl)
    }
}

// ============================================================================
// VERSION MANAGER CONFIG
// ============================================================================

/// Version manager settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionConfig {
    /// How long a version entry stays logically present after its last touch.
    pub ttl: Duration,
}

impl Default for VersionConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_VERSION_TTL_SECS),
        }
    }
}

impl VersionConfig {
    /// Reads `VERCACHE_VERSION_TTL_SECS` (default: 300).
    pub fn from_env() -> Self {
        Self {
            ttl: env_secs("VERCACHE_VERSION_TTL_SECS", DEFAULT_VERSION_TTL_SECS),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn validate(&self) -> VercacheResult<()> {
        require_ttl("version_ttl", self.ttl)
    }
}

// ============================================================================
// SWEEPER CONFIG
// ============================================================================

/// Configuration for the background version sweeper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepConfig {
    /// How often to sweep expired version entries (default: 60 seconds)
    pub interval: Duration,
    /// Whether to log sweeps that removed entries (default: true)
    pub log_sweeps: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_VERSION_SWEEP_INTERVAL_SECS),
            log_sweeps: true,
        }
    }
}

impl SweepConfig {
    /// Create SweepConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `VERCACHE_VERSION_SWEEP_INTERVAL_SECS` (default: 60)
    /// - `VERCACHE_VERSION_SWEEP_LOG` (default: true)
    pub fn from_env() -> Self {
        let log_sweeps = std::env::var("VERCACHE_VERSION_SWEEP_LOG")
            .ok()
            .map(|s| s.to_lowercase() != "false")
            .unwrap_or(true);

        Self {
            interval: env_secs(
                "VERCACHE_VERSION_SWEEP_INTERVAL_SECS",
                DEFAULT_VERSION_SWEEP_INTERVAL_SECS,
            ),
            log_sweeps,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_logging(mut self, enabled: bool) -> Self {
        self.log_sweeps = enabled;
        self
    }

    pub fn validate(&self) -> VercacheResult<()> {
        require_non_zero("sweep_interval", self.interval)
    }
}

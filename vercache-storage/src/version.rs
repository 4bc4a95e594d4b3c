//! Time-bounded version tracking for optimistic locking.
//!
//! [`VersionManager`] remembers the last known version of each key for a
//! limited time so that callers can run compare-and-swap loops without a
//! round-trip to the durable store.
//!
//! # Expiry
//!
//! Every successful write, increment or compare-and-swap refreshes the entry's
//! expiry to `now + ttl`. Reads apply *lazy expiry*: an entry past its expiry
//! is reported as absent even though it stays in memory until
//! [`VersionManager::cleanup_expired`] sweeps it.
//!
//! # Locking
//!
//! The map sits behind a reader/writer lock. Reads share it; every mutation
//! holds it exclusively for its whole duration. The lock is never held across
//! an `.await` point.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use vercache_core::constants::DEFAULT_VERSION_TTL_SECS;
use vercache_core::{ConfigError, Timestamp, VercacheResult, Version, VersionConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct VersionEntry {
    version: Version,
    expires_at: Timestamp,
}

impl VersionEntry {
    fn is_expired(&self, now: Timestamp) -> bool {
        now > self.expires_at
    }
}

/// In-process map from key to last known version, each entry with a TTL.
///
/// There is no global instance: construct one, share it through an `Arc`,
/// and drive [`cleanup_expired`](Self::cleanup_expired) from a timer (see
/// [`crate::sweeper`]).
#[derive(Debug)]
pub struct VersionManager {
    entries: RwLock<HashMap<String, VersionEntry>>,
    ttl: chrono::Duration,
}

impl Default for VersionManager {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: chrono::Duration::seconds(DEFAULT_VERSION_TTL_SECS as i64),
        }
    }
}

impl VersionManager {
    /// Create a manager with the default 5 minute TTL.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a manager from configuration.
    pub fn from_config(config: &VersionConfig) -> VercacheResult<Self> {
        config.validate()?;
        let ttl = chrono::Duration::from_std(config.ttl).map_err(|e| ConfigError::InvalidValue {
            field: "version_ttl".to_string(),
            value: format!("{:?}", config.ttl),
            reason: e.to_string(),
        })?;
        Ok(Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        })
    }

    /// Entry lifetime after each touch.
    pub fn ttl(&self) -> chrono::Duration {
        self.ttl
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, VersionEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, VersionEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn fresh_entry(&self, version: Version, now: Timestamp) -> VersionEntry {
        VersionEntry {
            version,
            expires_at: now
                .checked_add_signed(self.ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    // ========================================================================
    // OPERATIONS
    // ========================================================================

    /// Last known version of `key`, or `None` if it was never set or has
    /// expired.
    pub fn get_version(&self, key: &str) -> Option<Version> {
        self.get_version_at(key, Utc::now())
    }

    /// [`get_version`](Self::get_version) evaluated at `now`.
    pub fn get_version_at(&self, key: &str, now: Timestamp) -> Option<Version> {
        self.read()
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.version)
    }

    /// Unconditionally record `version` for `key` and refresh its TTL.
    pub fn set_version(&self, key: &str, version: Version) {
        self.set_version_at(key, version, Utc::now());
    }

    /// [`set_version`](Self::set_version) evaluated at `now`.
    pub fn set_version_at(&self, key: &str, version: Version, now: Timestamp) {
        let entry = self.fresh_entry(version, now);
        self.write().insert(key.to_string(), entry);
    }

    /// Increment the version of `key` and return the new value.
    ///
    /// An absent or expired key counts as version 0, so the first increment
    /// returns 1. Absence is not reported; check
    /// [`get_version`](Self::get_version) first if it matters. The counter
    /// saturates at `Version::MAX`.
    pub fn increment_version(&self, key: &str) -> Version {
        self.increment_version_at(key, Utc::now())
    }

    /// [`increment_version`](Self::increment_version) evaluated at `now`.
    pub fn increment_version_at(&self, key: &str, now: Timestamp) -> Version {
        let mut entries = self.write();
        let current = entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.version)
            .unwrap_or(0);
        let next = current.saturating_add(1);
        entries.insert(key.to_string(), self.fresh_entry(next, now));
        next
    }

    /// Atomic compare-and-swap.
    ///
    /// Commits `new_version` (refreshing the TTL) and returns `true` only if
    /// `key` is present and its version equals `expected`. Otherwise nothing
    /// changes and `false` is returned. Among concurrent callers passing the
    /// same `expected`, at most one succeeds.
    ///
    /// Presence here is physical: an entry past its expiry that has not been
    /// swept can still be matched, unlike in
    /// [`get_version`](Self::get_version).
    pub fn check_and_set(&self, key: &str, expected: Version, new_version: Version) -> bool {
        self.check_and_set_at(key, expected, new_version, Utc::now())
    }

    /// [`check_and_set`](Self::check_and_set) evaluated at `now`.
    pub fn check_and_set_at(
        &self,
        key: &str,
        expected: Version,
        new_version: Version,
        now: Timestamp,
    ) -> bool {
        let mut entries = self.write();
        match entries.get_mut(key) {
            Some(entry) if entry.version == expected => {
                *entry = self.fresh_entry(new_version, now);
                true
            }
            _ => false,
        }
    }

    /// Remove every expired entry and return how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        self.cleanup_expired_at(Utc::now())
    }

    /// [`cleanup_expired`](Self::cleanup_expired) evaluated at `now`.
    pub fn cleanup_expired_at(&self, now: Timestamp) -> usize {
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Number of physically present entries, expired or not.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

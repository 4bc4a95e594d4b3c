//! Error types for vercache operations

use crate::{StoreKind, Version};
use thiserror::Error;

/// Store-level failures, raised by either the volatile or the durable store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{store} store unavailable: {reason}")]
    Unavailable { store: StoreKind, reason: String },

    #[error("Corrupt value in {store} store for key {key}: {reason}")]
    Corruption {
        store: StoreKind,
        key: String,
        reason: String,
    },
}

/// Optimistic concurrency failures from conditional durable writes.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConcurrencyError {
    #[error("Optimistic locking conflict on key {key}: expected version {expected}, found {actual:?}")]
    Conflict {
        key: String,
        expected: Version,
        actual: Option<Version>,
    },

    #[error("Conditional update on missing key {key}")]
    NotFound { key: String },

    #[error("Version of key {key} cannot be incremented past {max}", max = Version::MAX)]
    VersionExhausted { key: String },
}

/// Validation errors for caller-supplied values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Operation context errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation deadline exceeded")]
    DeadlineExceeded,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Telemetry initialization failed: {reason}")]
    TelemetryInit { reason: String },
}

/// Master error type for all vercache errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VercacheError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Concurrency error: {0}")]
    Concurrency(#[from] ConcurrencyError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl VercacheError {
    /// Shorthand for a store-unavailable error.
    pub fn unavailable(store: StoreKind, reason: impl Into<String>) -> Self {
        StoreError::Unavailable {
            store,
            reason: reason.into(),
        }
        .into()
    }

    /// Shorthand for a corruption error.
    pub fn corruption(store: StoreKind, key: impl Into<String>, reason: impl Into<String>) -> Self {
        StoreError::Corruption {
            store,
            key: key.into(),
            reason: reason.into(),
        }
        .into()
    }

    /// True for an optimistic-locking conflict. The caller should re-read the
    /// latest version and retry.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            VercacheError::Concurrency(ConcurrencyError::Conflict { .. })
        )
    }

    /// True when the failure came from a store being unreachable.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, VercacheError::Store(StoreError::Unavailable { .. }))
    }

    /// True when a stored value could not be decoded.
    pub fn is_corruption(&self) -> bool {
        matches!(self, VercacheError::Store(StoreError::Corruption { .. }))
    }
}

/// Result type alias for vercache operations.
pub type VercacheResult<T> = Result<T, VercacheError>;

// =============================================================================
// TESTS
// =============================================================================

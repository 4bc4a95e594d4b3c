//! vercache Test Utilities
//!
//! Shared test infrastructure for the vercache workspace:
//! - Proptest generators for keys and documents
//! - Fixtures for common documents and timestamps
//! - A harness wiring in-memory stores to both strategies
//! - Assertions for the error categories callers branch on

// Re-export in-memory stores and fault switches from their source crate
pub use vercache_storage::{
    DurableOp, FaultInjector, InMemoryDurableStore, InMemoryVolatileStore, MemoryWarningSink,
    VolatileOp,
};

// Re-export core types for convenience
pub use vercache_core::{
    ConcurrencyError, ContextError, Document, OpContext, Record, StoreError, StoreKind,
    Timestamp, ValidationError, VercacheError, VercacheResult, Version, VERSION_FIELD,
};

use std::sync::Arc;

use vercache_storage::{CacheAside, VersionManager, WriteThrough};

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for keys, field values and documents.

    use super::*;
    use proptest::prelude::*;
    use serde_json::Value;

    /// Generate a cache key such as `user:42` or `order-7`.
    pub fn arb_key() -> impl Strategy<Value = String> {
        "[a-z]{1,8}[:-][0-9]{1,4}"
    }

    /// Generate a field name that never collides with the reserved version
    /// field.
    pub fn arb_field_name() -> impl Strategy<Value = String> {
        "[a-z][a-z_]{0,11}".prop_filter("reserved field", |name| name != VERSION_FIELD)
    }

    /// Generate a scalar JSON value.
    pub fn arb_scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            "[ -~]{0,24}".prop_map(Value::String),
        ]
    }

    /// Generate a JSON value nested at most two levels deep.
    pub fn arb_value() -> impl Strategy<Value = Value> {
        arb_scalar().prop_recursive(2, 16, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                    .prop_map(|map| Value::Object(map.into_iter().collect())),
            ]
        })
    }

    /// Generate a document without the reserved version field.
    pub fn arb_document() -> impl Strategy<Value = Document> {
        prop::collection::btree_map(arb_field_name(), arb_value(), 0..6)
            .prop_map(|fields| fields.into_iter().collect())
    }

    /// Generate a plausible record version.
    pub fn arb_version() -> impl Strategy<Value = Version> {
        1i64..1_000
    }

    /// Generate an update request: a document carrying an expected version.
    pub fn arb_update_request() -> impl Strategy<Value = (Document, Version)> {
        (arb_document(), arb_version())
            .prop_map(|(doc, version)| (doc.with_version(version), version))
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Ready-made values for common scenarios.

    use super::*;
    use chrono::Utc;

    /// A single-field document `{"data": <data>}`.
    pub fn doc(data: &str) -> Document {
        Document::new().with("data", data)
    }

    /// An update request `{"data": <data>, "version": <expected>}`.
    pub fn update_request(data: &str, expected: Version) -> Document {
        doc(data).with_version(expected)
    }

    /// A user profile document with mixed field types.
    pub fn user_profile() -> Document {
        Document::new()
            .with("name", "alice")
            .with("age", 30)
            .with("active", true)
            .with("tags", serde_json::json!(["admin", "ops"]))
    }

    /// A timestamp `minutes` in the past.
    pub fn minutes_ago(minutes: i64) -> Timestamp {
        Utc::now() - chrono::Duration::minutes(minutes)
    }

    /// An already cancelled context.
    pub fn cancelled_context() -> OpContext {
        let (handle, ctx) = OpContext::cancellable();
        handle.cancel();
        ctx
    }
}

// ============================================================================
// HARNESS
// ============================================================================

/// In-memory stores shared by one strategy of each kind, plus a warning sink
/// and a version manager.
pub struct Harness {
    pub volatile: Arc<InMemoryVolatileStore>,
    pub durable: Arc<InMemoryDurableStore>,
    pub warnings: Arc<MemoryWarningSink>,
    pub versions: Arc<VersionManager>,
    pub cache_aside: CacheAside<InMemoryVolatileStore, InMemoryDurableStore>,
    pub write_through: WriteThrough<InMemoryVolatileStore, InMemoryDurableStore>,
}

impl Harness {
    pub fn new() -> Self {
        let volatile = Arc::new(InMemoryVolatileStore::new());
        let durable = Arc::new(InMemoryDurableStore::new());
        let warnings = Arc::new(MemoryWarningSink::new());

        let cache_aside = CacheAside::new(Arc::clone(&volatile), Arc::clone(&durable))
            .with_warning_sink(warnings.clone());
        let write_through = WriteThrough::new(Arc::clone(&volatile), Arc::clone(&durable))
            .with_warning_sink(warnings.clone());

        Self {
            volatile,
            durable,
            warnings,
            versions: Arc::new(VersionManager::new()),
            cache_aside,
            write_through,
        }
    }

    /// Clear the call counters of both stores.
    pub fn reset_calls(&self) {
        self.volatile.faults().reset_calls();
        self.durable.faults().reset_calls();
    }

    /// Total calls that reached either store.
    pub fn total_calls(&self) -> u64 {
        self.volatile.faults().total_calls() + self.durable.faults().total_calls()
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for the error categories callers branch on.

    use super::*;

    /// Assert that a result is a version conflict.
    pub fn assert_conflict<T: std::fmt::Debug>(result: &VercacheResult<T>) {
        match result {
            Err(e) if e.is_conflict() => {}
            other => panic!("Expected conflict, got: {:?}", other),
        }
    }

    /// Assert that a result is a store-unavailable error from `store`.
    pub fn assert_unavailable<T: std::fmt::Debug>(result: &VercacheResult<T>, store: StoreKind) {
        match result {
            Err(VercacheError::Store(StoreError::Unavailable { store: s, .. })) if *s == store => {}
            other => panic!("Expected {} store unavailable, got: {:?}", store, other),
        }
    }

    /// Assert that a result is a cancellation or deadline error.
    pub fn assert_context_error<T: std::fmt::Debug>(result: &VercacheResult<T>) {
        assert!(
            matches!(result, Err(VercacheError::Context(_))),
            "Expected context error, got: {:?}",
            result
        );
    }

    /// Assert that a result is a validation error.
    pub fn assert_validation_error<T: std::fmt::Debug>(result: &VercacheResult<T>) {
        assert!(
            matches!(result, Err(VercacheError::Validation(_))),
            "Expected validation error, got: {:?}",
            result
        );
    }
}

//! vercache Core - Data Types
//!
//! Documents, records, errors, configuration and the operation context shared
//! by every other crate in the workspace. No store or strategy logic lives here.

pub mod config;
pub mod constants;
pub mod context;
pub mod error;

pub use config::{StrategyConfig, SweepConfig, VersionConfig};
pub use context::{CancelHandle, OpContext};
pub use error::{
    ConcurrencyError, ConfigError, ContextError, StoreError, ValidationError, VercacheError,
    VercacheResult,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

// ============================================================================
// PRIMITIVE TYPES
// ============================================================================

/// Record version used for optimistic locking.
pub type Version = i64;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Reserved document field carrying a version number.
///
/// On an update request it holds the version the caller believes is current;
/// on a cached snapshot it holds the record's version at snapshot time.
pub const VERSION_FIELD: &str = "version";

/// Which side of the consistency layer a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoreKind {
    Volatile,
    Durable,
}

impl StoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::Volatile => "volatile",
            StoreKind::Durable => "durable",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// DOCUMENT
// ============================================================================

/// Schema-less record value: field name to arbitrary JSON data.
///
/// Crossing a store boundary always goes through [`Document::encode`] and
/// [`Document::decode`]; a document is never reinterpreted structurally.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field insert.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// Builder-style version stamp.
    pub fn with_version(self, version: Version) -> Self {
        self.with(VERSION_FIELD, version)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    pub fn contains_key(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Version carried in the reserved field, if it is an integer.
    pub fn version(&self) -> Option<Version> {
        self.0.get(VERSION_FIELD).and_then(Value::as_i64)
    }

    /// Version an update request expects the durable record to have.
    pub fn expected_version(&self) -> VercacheResult<Version> {
        match self.0.get(VERSION_FIELD) {
            None | Some(Value::Null) => Err(ValidationError::RequiredFieldMissing {
                field: VERSION_FIELD.to_string(),
            }
            .into()),
            Some(value) => value.as_i64().ok_or_else(|| {
                ValidationError::InvalidValue {
                    field: VERSION_FIELD.to_string(),
                    reason: format!("expected an integer, got {}", value),
                }
                .into()
            }),
        }
    }

    /// Copy of this document without the reserved version field.
    pub fn without_version(&self) -> Document {
        let mut copy = self.clone();
        copy.0.remove(VERSION_FIELD);
        copy
    }

    /// Encode to the structured text form used on the wire.
    pub fn encode(&self) -> VercacheResult<Vec<u8>> {
        serde_json::to_vec(&self.0).map_err(|e| {
            ValidationError::InvalidValue {
                field: "document".to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Decode from the structured text form. Anything other than a JSON
    /// object is rejected.
    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice::<Map<String, Value>>(bytes).map(Document)
    }

    /// Flatten into string fields for hash-style storage. Strings are kept
    /// verbatim, every other value uses its JSON text.
    pub fn to_field_strings(&self) -> HashMap<String, String> {
        self.0
            .iter()
            .map(|(field, value)| {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (field.clone(), text)
            })
            .collect()
    }
}

impl From<Map<String, Value>> for Document {
    fn from(map: Map<String, Value>) -> Self {
        Document(map)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Document(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

// ============================================================================
// RECORD
// ============================================================================

/// Authoritative row held by the durable store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub key: String,
    /// Stored value, never containing the reserved version field.
    pub value: Document,
    pub version: Version,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Record {
    /// The value as it should be cached: the stored fields with the record's
    /// current version stamped into the reserved field.
    pub fn snapshot(&self) -> Document {
        self.value.clone().with_version(self.version)
    }
}

// ============================================================================
// TESTS
// ============================================================================


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn scalar_strategy() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[a-zA-Z0-9 ]{0,16}".prop_map(Value::from),
            Just(Value::Null),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Decoding what was encoded yields the same document.
        #[test]
        fn prop_encode_decode_preserves_document(
            fields in prop::collection::btree_map("[a-z_]{1,8}", scalar_strategy(), 0..8)
        ) {
            let doc: Document = fields.into_iter().collect();
            let bytes = doc.encode().expect("encode should succeed");
            let decoded = Document::decode(&bytes).expect("decode should succeed");
            prop_assert_eq!(doc, decoded);
        }

        /// Stripping the version field never touches other fields.
        #[test]
        fn prop_without_version_keeps_other_fields(
            fields in prop::collection::btree_map("[a-z_]{1,8}", scalar_strategy(), 0..8),
            version in any::<i64>(),
        ) {
            let doc: Document = fields.into_iter().collect();
            let stamped = doc.clone().with_version(version);
            prop_assert_eq!(stamped.version(), Some(version));
            prop_assert_eq!(stamped.without_version(), doc.without_version());
        }
    }
}

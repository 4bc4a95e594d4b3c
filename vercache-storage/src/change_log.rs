//! Change log entries recorded by durable stores.
//!
//! Every insert, update and delete on the record table appends one entry.
//! External invalidation consumers read the log; the strategies never do.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use vercache_core::{Document, Timestamp, Version};

/// Table holding authoritative records.
pub const RECORD_TABLE: &str = "cacheable_data";

/// Table holding the change log.
pub const CHANGE_LOG_TABLE: &str = "cache_invalidation_log";

/// Kind of mutation captured by a change log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeOperation {
    Insert,
    Update,
    Delete,
}

impl ChangeOperation {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            ChangeOperation::Insert => "INSERT",
            ChangeOperation::Update => "UPDATE",
            ChangeOperation::Delete => "DELETE",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, ChangeOperationParseError> {
        match s.to_uppercase().as_str() {
            "INSERT" => Ok(ChangeOperation::Insert),
            "UPDATE" => Ok(ChangeOperation::Update),
            "DELETE" => Ok(ChangeOperation::Delete),
            _ => Err(ChangeOperationParseError(s.to_string())),
        }
    }
}

impl fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

impl FromStr for ChangeOperation {
    type Err = ChangeOperationParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid change operation string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeOperationParseError(pub String);

impl fmt::Display for ChangeOperationParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid change operation: {}", self.0)
    }
}

impl std::error::Error for ChangeOperationParseError {}

/// One row of the change log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    /// Monotonically increasing log position.
    pub id: i64,
    pub operation: ChangeOperation,
    pub table_name: String,
    pub record_id: String,
    /// Row image before the change; `None` for inserts.
    pub old_data: Option<Value>,
    /// Row image after the change; `None` for deletes.
    pub new_data: Option<Value>,
    pub created_at: Timestamp,
}

/// JSON image of a record row, shaped like the database row.
pub fn row_image(
    key: &str,
    value: &Document,
    version: Version,
    created_at: Timestamp,
    updated_at: Timestamp,
) -> Value {
    json!({
        "id": key,
        "data": value,
        "version": version,
        "created_at": created_at,
        "updated_at": updated_at,
    })
}

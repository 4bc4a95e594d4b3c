//! vercache Storage - Store Contracts, Version Manager and Strategies
//!
//! Defines the volatile/durable store contracts, the cache-aside and
//! write-through strategies built on them, and the in-process version
//! manager used for optimistic locking. The PostgreSQL durable store lives in
//! vercache-pg.

pub mod change_log;
pub mod faults;
pub mod memory;
pub mod strategy;
pub mod sweeper;
pub mod telemetry;
pub mod traits;
pub mod version;
pub mod warnings;

pub use change_log::{
    row_image, ChangeLogEntry, ChangeOperation, ChangeOperationParseError, CHANGE_LOG_TABLE,
    RECORD_TABLE,
};
pub use faults::{DurableOp, FaultInjector, VolatileOp};
pub use memory::{InMemoryDurableStore, InMemoryVolatileStore};
pub use strategy::{
    build_strategy, CacheAside, CacheStrategy, StrategyKind, StrategyKindParseError,
    StrategyStats, WriteThrough,
};
pub use sweeper::{version_sweep_task, SweepMetrics, SweepSnapshot};
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig};
pub use traits::{ChangeLogReader, DurableStore, VolatileStore};
pub use version::VersionManager;
pub use warnings::{CacheWarning, MemoryWarningSink, TracingWarningSink, WarningKind, WarningSink};

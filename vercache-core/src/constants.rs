//! Default values shared across the workspace.

/// Cache lifetime used by the cache-aside strategy.
pub const DEFAULT_CACHE_ASIDE_TTL_SECS: u64 = 300;

/// Cache lifetime used by the write-through strategy.
pub const DEFAULT_WRITE_THROUGH_TTL_SECS: u64 = 600;

/// Lifetime of a version entry after its last touch.
pub const DEFAULT_VERSION_TTL_SECS: u64 = 300;

/// Upper bound for any configured TTL (one year).
pub const MAX_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// How often the version sweeper runs.
pub const DEFAULT_VERSION_SWEEP_INTERVAL_SECS: u64 = 60;

//! Tracing subscriber setup.
//!
//! The library itself only emits `tracing` events. Binaries and test
//! harnesses call [`init_tracing`] once at startup to decide where they go.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vercache_core::{ConfigError, VercacheResult};

const DEFAULT_FILTER: &str = "vercache_storage=info,vercache_pg=info,warn";

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    /// Parse a format name. Anything other than `json` is pretty.
    pub fn from_name(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// `EnvFilter` directive string.
    pub filter: String,
    pub format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl TelemetryConfig {
    /// Create TelemetryConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `VERCACHE_LOG`: filter directives (default: `vercache_storage=info,vercache_pg=info,warn`)
    /// - `VERCACHE_LOG_FORMAT`: `pretty` or `json` (default: pretty)
    pub fn from_env() -> Self {
        Self {
            filter: std::env::var("VERCACHE_LOG").unwrap_or_else(|_| DEFAULT_FILTER.to_string()),
            format: std::env::var("VERCACHE_LOG_FORMAT")
                .map(|s| LogFormat::from_name(&s))
                .unwrap_or_default(),
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }
}

/// Install the global tracing subscriber.
///
/// Fails if the filter does not parse or a global subscriber is already set.
pub fn init_tracing(config: &TelemetryConfig) -> VercacheResult<()> {
    let env_filter = EnvFilter::try_new(&config.filter).map_err(|e| ConfigError::TelemetryInit {
        reason: format!("invalid filter {:?}: {}", config.filter, e),
    })?;

    let (json_layer, pretty_layer) = match config.format {
        LogFormat::Json => (Some(tracing_subscriber::fmt::layer().json()), None),
        LogFormat::Pretty => (None, Some(tracing_subscriber::fmt::layer())),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(pretty_layer)
        .try_init()
        .map_err(|e| ConfigError::TelemetryInit {
            reason: format!("failed to init subscriber: {}", e),
        })?;

    tracing::debug!(filter = %config.filter, format = ?config.format, "Tracing initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vercache_core::VercacheError;

    struct EnvVarGuard {
        key: &'static str,
        original: Option<String>,
    }

    impl EnvVarGuard {
        fn set(key: &'static str, value: Option<&str>) -> Self {
            let original = std::env::var(key).ok();
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
            Self { key, original }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            match self.original.as_deref() {
                Some(v) => std::env::set_var(self.key, v),
                None => std::env::remove_var(self.key),
            }
        }
    }

    #[test]
    fn test_log_format_parsing() {
        assert_eq!(LogFormat::from_name("json"), LogFormat::Json);
        assert_eq!(LogFormat::from_name(" JSON "), LogFormat::Json);
        assert_eq!(LogFormat::from_name("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::from_name("anything"), LogFormat::Pretty);
    }

    #[test]
    fn test_config_from_env() {
        let _filter = EnvVarGuard::set("VERCACHE_LOG", Some("debug"));
        let _format = EnvVarGuard::set("VERCACHE_LOG_FORMAT", Some("json"));

        let config = TelemetryConfig::from_env();
        assert_eq!(config.filter, "debug");
        assert_eq!(config.format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_filter_rejected() {
        let config = TelemetryConfig::default().with_filter("vercache_storage=loud");
        let err = init_tracing(&config).unwrap_err();
        assert!(matches!(err, VercacheError::Config(ConfigError::TelemetryInit { .. })));
    }

    #[test]
    fn test_second_init_fails() {
        let config = TelemetryConfig::default().with_format(LogFormat::Json);
        let _ = init_tracing(&config);
        assert!(init_tracing(&config).is_err());
    }
}

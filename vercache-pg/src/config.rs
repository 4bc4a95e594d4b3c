//! Connection pool configuration.

use std::time::Duration;

use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;
use vercache_core::{ConfigError, VercacheResult};

/// Database connection pool configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// How long to wait for a pooled connection
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "vercache".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 25,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Create a database configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `VERCACHE_DB_HOST` (default: localhost)
    /// - `VERCACHE_DB_PORT` (default: 5432)
    /// - `VERCACHE_DB_NAME` (default: vercache)
    /// - `VERCACHE_DB_USER` (default: postgres)
    /// - `VERCACHE_DB_PASSWORD` (default: empty)
    /// - `VERCACHE_DB_POOL_SIZE` (default: 25)
    /// - `VERCACHE_DB_TIMEOUT` seconds (default: 30)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("VERCACHE_DB_HOST").unwrap_or(defaults.host),
            port: std::env::var("VERCACHE_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            dbname: std::env::var("VERCACHE_DB_NAME").unwrap_or(defaults.dbname),
            user: std::env::var("VERCACHE_DB_USER").unwrap_or(defaults.user),
            password: std::env::var("VERCACHE_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("VERCACHE_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_size),
            timeout: std::env::var("VERCACHE_DB_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_dbname(mut self, dbname: impl Into<String>) -> Self {
        self.dbname = dbname.into();
        self
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn validate(&self) -> VercacheResult<()> {
        if self.max_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "db_pool_size".to_string(),
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Create a connection pool from this configuration.
    ///
    /// No connection is opened until the pool is first used.
    pub fn create_pool(&self) -> VercacheResult<Pool> {
        self.validate()?;

        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_cfg = PoolConfig::new(self.max_size);
        pool_cfg.timeouts.wait = Some(self.timeout);
        cfg.pool = Some(pool_cfg);

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ConfigError::InvalidValue {
                field: "db".to_string(),
                value: format!("{}:{}/{}", self.host, self.port, self.dbname),
                reason: format!("failed to create pool: {}", e),
            })?;

        Ok(pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DbConfig::default();
        assert_eq!(config.port, 5432);
        assert_eq!(config.max_size, 25);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_pool_size_rejected() {
        let config = DbConfig::default().with_max_size(0);
        assert!(config.validate().is_err());
        assert!(config.create_pool().is_err());
    }

    #[tokio::test]
    async fn test_pool_creation_is_lazy() {
        // Nothing listens here; creating the pool must still succeed.
        let config = DbConfig::default()
            .with_host("127.0.0.1")
            .with_dbname("vercache_unreachable")
            .with_max_size(2);
        let pool = config.create_pool().unwrap();
        assert_eq!(pool.status().max_size, 2);
        assert_eq!(pool.status().size, 0);
    }
}

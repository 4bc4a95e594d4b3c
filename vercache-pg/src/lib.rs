//! vercache PostgreSQL - Durable Store
//!
//! Pooled PostgreSQL implementation of the durable store contract, including
//! the record table, the change-log table and the trigger that fills it.
//!
//! ```ignore
//! let store = PostgresDurableStore::from_config(&DbConfig::from_env())?;
//! store.bootstrap().await?;
//! let strategy = CacheAside::new(volatile, Arc::new(store));
//! ```

pub mod config;
pub mod schema;
pub mod store;

pub use config::DbConfig;
pub use schema::bootstrap;
pub use store::PostgresDurableStore;

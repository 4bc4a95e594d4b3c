use vercache_pg::{DbConfig, PostgresDurableStore};

pub async fn test_store() -> PostgresDurableStore {
    let config = DbConfig::from_env();
    let store = PostgresDurableStore::from_config(&config).expect("Failed to create database pool");
    store.bootstrap().await.expect("Failed to bootstrap schema");
    store
}

/// A key no other test run will touch.
pub fn unique_key(prefix: &str) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("{}:{}", prefix, nanos)
}

//! Table, change-log and trigger definitions.
//!
//! Every statement is idempotent, so [`bootstrap`] can run on each start.

use deadpool_postgres::Pool;
use vercache_core::VercacheResult;

use crate::store::{durable_error, pool_error};

/// Authoritative records. `version` starts at 1 and only ever grows.
pub const CREATE_RECORD_TABLE: &str = "
CREATE TABLE IF NOT EXISTS cacheable_data (
    id          VARCHAR(255) PRIMARY KEY,
    data        JSONB        NOT NULL,
    version     BIGINT       NOT NULL DEFAULT 1,
    created_at  TIMESTAMPTZ  NOT NULL DEFAULT NOW(),
    updated_at  TIMESTAMPTZ  NOT NULL DEFAULT NOW()
)";

/// Append-only change log filled by the row trigger.
pub const CREATE_CHANGE_LOG_TABLE: &str = "
CREATE TABLE IF NOT EXISTS cache_invalidation_log (
    id          BIGSERIAL    PRIMARY KEY,
    operation   VARCHAR(50)  NOT NULL,
    table_name  VARCHAR(100) NOT NULL,
    record_id   VARCHAR(255) NOT NULL,
    old_data    JSONB,
    new_data    JSONB,
    created_at  TIMESTAMPTZ  NOT NULL DEFAULT NOW()
)";

/// Trigger function logging the old and new row images of each change.
pub const CREATE_TRIGGER_FUNCTION: &str = "
CREATE OR REPLACE FUNCTION cache_invalidation_trigger()
RETURNS TRIGGER AS $$
BEGIN
    IF TG_OP = 'DELETE' THEN
        INSERT INTO cache_invalidation_log (operation, table_name, record_id, old_data, new_data)
        VALUES (TG_OP, TG_TABLE_NAME, OLD.id::text, to_jsonb(OLD), NULL);
        RETURN OLD;
    ELSIF TG_OP = 'UPDATE' THEN
        INSERT INTO cache_invalidation_log (operation, table_name, record_id, old_data, new_data)
        VALUES (TG_OP, TG_TABLE_NAME, NEW.id::text, to_jsonb(OLD), to_jsonb(NEW));
        RETURN NEW;
    ELSE
        INSERT INTO cache_invalidation_log (operation, table_name, record_id, old_data, new_data)
        VALUES (TG_OP, TG_TABLE_NAME, NEW.id::text, NULL, to_jsonb(NEW));
        RETURN NEW;
    END IF;
END;
$$ LANGUAGE plpgsql";

pub const CREATE_TRIGGER: &str = "
DROP TRIGGER IF EXISTS cache_data_change_trigger ON cacheable_data;
CREATE TRIGGER cache_data_change_trigger
AFTER INSERT OR UPDATE OR DELETE ON cacheable_data
FOR EACH ROW EXECUTE FUNCTION cache_invalidation_trigger()";

/// Statements in the order [`bootstrap`] runs them.
pub const BOOTSTRAP_STATEMENTS: [&str; 4] = [
    CREATE_RECORD_TABLE,
    CREATE_CHANGE_LOG_TABLE,
    CREATE_TRIGGER_FUNCTION,
    CREATE_TRIGGER,
];

/// Create the tables and trigger if they do not exist.
pub async fn bootstrap(pool: &Pool) -> VercacheResult<()> {
    let conn = pool.get().await.map_err(pool_error)?;
    for statement in BOOTSTRAP_STATEMENTS {
        conn.batch_execute(statement).await.map_err(|e| {
            tracing::error!(error = %e, "Schema bootstrap statement failed");
            durable_error(e)
        })?;
    }
    tracing::info!("Schema bootstrap complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vercache_storage::{CHANGE_LOG_TABLE, RECORD_TABLE};

    #[test]
    fn test_statements_name_the_shared_tables() {
        assert!(CREATE_RECORD_TABLE.contains(RECORD_TABLE));
        assert!(CREATE_CHANGE_LOG_TABLE.contains(CHANGE_LOG_TABLE));
        assert!(CREATE_TRIGGER.contains(RECORD_TABLE));
        assert!(CREATE_TRIGGER_FUNCTION.contains(CHANGE_LOG_TABLE));
    }

    #[test]
    fn test_statements_are_idempotent() {
        assert!(CREATE_RECORD_TABLE.contains("IF NOT EXISTS"));
        assert!(CREATE_CHANGE_LOG_TABLE.contains("IF NOT EXISTS"));
        assert!(CREATE_TRIGGER_FUNCTION.contains("CREATE OR REPLACE"));
        assert!(CREATE_TRIGGER.contains("DROP TRIGGER IF EXISTS"));
    }

    #[test]
    fn test_version_column_is_bigint() {
        assert!(CREATE_RECORD_TABLE.contains("version     BIGINT"));
    }
}

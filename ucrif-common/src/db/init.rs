//! Database initialization
//!
//! Creates the database file on first run and brings the schema up with
//! idempotent `CREATE TABLE IF NOT EXISTS` statements, so a fresh install
//! and an existing installation go through the same path.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Open (or create) the database and prepare the schema
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL allows concurrent readers while one writer holds the lock
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_tables(&pool).await?;

    // Apply configurable busy timeout once the settings table exists
    ensure_setting(&pool, "db_busy_timeout_ms", "5000").await?;
    let timeout_ms: i64 =
        sqlx::query_scalar("SELECT CAST(value AS INTEGER) FROM settings WHERE key = 'db_busy_timeout_ms'")
            .fetch_optional(&pool)
            .await?
            .unwrap_or(5000);
    let pragma_sql = format!("PRAGMA busy_timeout = {}", timeout_ms);
    sqlx::query(&pragma_sql).execute(&pool).await?;

    info!("Database busy timeout set to {} ms", timeout_ms);

    Ok(pool)
}

/// Create all tables and indexes (idempotent). Public so tests can bring
/// up the schema on an in-memory pool.
pub async fn create_tables(pool: &SqlitePool) -> Result<()> {
    create_settings_table(pool).await?;
    create_records_table(pool).await?;
    create_chronology_table(pool).await?;
    create_pending_tasks_table(pool).await?;
    Ok(())
}

/// Create the settings table
///
/// Stores application configuration key-value pairs, including the API
/// shared secret.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_records_table(pool: &SqlitePool) -> Result<()> {
    // grupo, anio, codigo and fecha are extracted from the payload on
    // every save so that filters run on indexed columns instead of JSON
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            guid TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            user_id TEXT,
            collection TEXT NOT NULL,
            grupo TEXT,
            anio INTEGER,
            codigo INTEGER,
            fecha TEXT,
            payload TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_records_scope ON records (tenant_id, user_id, collection)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_records_codes ON records (tenant_id, collection, grupo, anio)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_fecha ON records (tenant_id, fecha)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_chronology_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chronology (
            guid TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            user_id TEXT,
            operation_id TEXT NOT NULL REFERENCES records(guid) ON DELETE CASCADE,
            fecha TEXT,
            hora TEXT,
            payload TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_chronology_operation ON chronology (operation_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_pending_tasks_table(pool: &SqlitePool) -> Result<()> {
    // operation_id NULL marks a global task not tied to any operation
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pending_tasks (
            guid TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            user_id TEXT,
            operation_id TEXT REFERENCES records(guid) ON DELETE CASCADE,
            descripcion TEXT,
            fecha_limite TEXT,
            estado TEXT NOT NULL DEFAULT 'Pendiente'
                CHECK (estado IN ('Pendiente', 'Completado')),
            payload TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_pending_tasks_operation ON pending_tasks (operation_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_pending_tasks_estado ON pending_tasks (tenant_id, estado)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Ensure a setting exists with a default value, resetting NULL to the
/// default
pub async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
        .bind(key)
        .bind(default_value)
        .execute(pool)
        .await?;

    sqlx::query("UPDATE settings SET value = ? WHERE key = ? AND value IS NULL")
        .bind(default_value)
        .bind(key)
        .execute(pool)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_tables_is_idempotent() {
        let pool = memory_pool().await;
        create_tables(&pool).await.unwrap();
        create_tables(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn test_ensure_setting_keeps_existing_value() {
        let pool = memory_pool().await;
        create_tables(&pool).await.unwrap();

        ensure_setting(&pool, "db_busy_timeout_ms", "5000").await.unwrap();
        sqlx::query("UPDATE settings SET value = '250' WHERE key = 'db_busy_timeout_ms'")
            .execute(&pool)
            .await
            .unwrap();
        ensure_setting(&pool, "db_busy_timeout_ms", "5000").await.unwrap();

        let value: (String,) =
            sqlx::query_as("SELECT value FROM settings WHERE key = 'db_busy_timeout_ms'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(value.0, "250");
    }

    #[tokio::test]
    async fn test_ensure_setting_resets_null() {
        let pool = memory_pool().await;
        create_tables(&pool).await.unwrap();

        sqlx::query("INSERT INTO settings (key, value) VALUES ('k', NULL)")
            .execute(&pool)
            .await
            .unwrap();
        ensure_setting(&pool, "k", "fallback").await.unwrap();

        let value: (String,) = sqlx::query_as("SELECT value FROM settings WHERE key = 'k'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(value.0, "fallback");
    }

    #[tokio::test]
    async fn test_init_database_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("data").join("ucrif.db");
        let pool = init_database(&db_path).await.unwrap();
        assert!(db_path.exists());

        // Schema is usable straight away
        sqlx::query("INSERT INTO settings (key, value) VALUES ('probe', '1')")
            .execute(&pool)
            .await
            .unwrap();
    }
}

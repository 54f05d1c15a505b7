//! Database initialization
//!
//! Opens (or creates) the SQLite output database and brings its schema up to
//! date. Safe to call on an existing database.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use tracing::info;

/// Secondary indexes, dropped before a bulk import and rebuilt on commit
pub(crate) const INDEXES: &[(&str, &str)] = &[
    (
        "triples_subject_id",
        "CREATE INDEX IF NOT EXISTS triples_subject_id ON triples (subject_id)",
    ),
    (
        "triples_subject_id_predicate",
        "CREATE INDEX IF NOT EXISTS triples_subject_id_predicate ON triples (subject_id, predicate)",
    ),
    (
        "observations_entity_variable",
        "CREATE INDEX IF NOT EXISTS observations_entity_variable ON observations (entity, variable)",
    ),
    (
        "observations_variable",
        "CREATE INDEX IF NOT EXISTS observations_variable ON observations (variable)",
    ),
];

/// Open the database and create tables if needed
///
/// The pool holds a single connection: the store keeps one transaction open
/// for the whole run, and SQLite allows one writer anyway.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    // Versioned migrations run after CREATE TABLE IF NOT EXISTS so they only
    // have to deal with databases created by older code.
    crate::db::migrations::run_migrations(&pool).await?;

    Ok(pool)
}

/// Create all tables (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_triples_table(pool).await?;
    create_observations_table(pool).await?;
    create_key_value_store_table(pool).await?;
    create_imports_table(pool).await?;
    create_indexes(pool).await?;
    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_triples_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS triples (
            subject_id TEXT NOT NULL,
            predicate TEXT NOT NULL,
            object_id TEXT,
            object_value TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_observations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS observations (
            entity TEXT NOT NULL,
            variable TEXT NOT NULL,
            date TEXT NOT NULL,
            value TEXT NOT NULL,
            provenance TEXT NOT NULL,
            unit TEXT NOT NULL DEFAULT '',
            scaling_factor TEXT NOT NULL DEFAULT '',
            measurement_method TEXT NOT NULL DEFAULT '',
            observation_period TEXT NOT NULL DEFAULT '',
            properties TEXT NOT NULL DEFAULT ''
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_key_value_store_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS key_value_store (
            lookup_key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_imports_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS imports (
            imported_at TEXT NOT NULL,
            status TEXT NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}'
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_indexes(pool: &SqlitePool) -> Result<()> {
    for (_, sql) in INDEXES {
        sqlx::query(sql).execute(pool).await?;
    }
    Ok(())
}

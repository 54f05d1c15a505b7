//! Database initialization and store lifecycle tests
//!
//! Covers schema creation on first open, idempotent re-open, and the
//! clear-before-import contract (import history survives, data does not).

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;
use tempfile::TempDir;

use stats_common::db::init::init_database;
use stats_common::db::migrations::get_schema_version;
use stats_common::db::{SqliteStore, Store};
use stats_common::{ImportStatus, Observation, Triple};

async fn connect(db_path: &Path) -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&format!("sqlite:{}", db_path.display()))
        .await
        .unwrap()
}

async fn count(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn import_once(db_path: &Path, subject: &str) {
    let store = SqliteStore::open(db_path).await.unwrap();
    store.maybe_clear_before_import().await.unwrap();
    store
        .insert_triples(&[Triple::with_id(subject, "typeOf", "StatisticalVariable").unwrap()])
        .await
        .unwrap();
    store
        .insert_observations(&[Observation {
            entity: "country/USA".to_string(),
            variable: subject.to_string(),
            date: "2023".to_string(),
            value: "1".to_string(),
            provenance: "c/p/1".to_string(),
            ..Default::default()
        }])
        .await
        .unwrap();
    store.insert_key_value("StatVarGroups", "e30=").await.unwrap();
    store.insert_import_info(ImportStatus::Success).await.unwrap();
    store.commit_and_close().await.unwrap();
}

#[tokio::test]
async fn test_database_creation_when_missing() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("nested").join("datacommons.db");

    let pool = init_database(&db_path).await.unwrap();
    assert!(db_path.exists(), "Database file was not created");

    let tables: Vec<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .fetch_all(&pool)
            .await
            .unwrap();
    for table in ["imports", "key_value_store", "observations", "schema_version", "triples"] {
        assert!(tables.iter().any(|t| t == table), "missing table {}", table);
    }
    assert_eq!(count(&pool, "imports").await, 0);
}

#[tokio::test]
async fn test_init_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("datacommons.db");

    let pool = init_database(&db_path).await.unwrap();
    let version = get_schema_version(&pool).await.unwrap();
    let version_rows = count(&pool, "schema_version").await;
    pool.close().await;

    let pool = init_database(&db_path).await.unwrap();
    assert_eq!(get_schema_version(&pool).await.unwrap(), version);
    assert_eq!(count(&pool, "schema_version").await, version_rows);
}

#[tokio::test]
async fn test_clear_keeps_import_history() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("datacommons.db");

    import_once(&db_path, "sv1").await;
    import_once(&db_path, "sv2").await;

    let pool = connect(&db_path).await;
    assert_eq!(count(&pool, "imports").await, 2);
    assert_eq!(count(&pool, "triples").await, 1);
    assert_eq!(count(&pool, "observations").await, 1);
    assert_eq!(count(&pool, "key_value_store").await, 1);

    let subject: String = sqlx::query_scalar("SELECT subject_id FROM triples")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(subject, "sv2");

    let status: String = sqlx::query_scalar("SELECT status FROM imports LIMIT 1")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(status, ImportStatus::Success.as_str());
}

#[tokio::test]
async fn test_indexes_rebuilt_on_commit() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("datacommons.db");

    import_once(&db_path, "sv1").await;

    let pool = connect(&db_path).await;
    let indexes: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = 'triples_subject_id'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(indexes, 1);
}

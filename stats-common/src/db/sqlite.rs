//! SQLite implementation of the output store
//!
//! One transaction spans the whole run. Every insert goes through it and
//! `commit_and_close` is the only point where data becomes durable.

use async_trait::async_trait;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool, Transaction};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::db::init::{init_database, INDEXES};
use crate::db::models::{ImportStatus, Observation, Triple};
use crate::db::store::{Store, NAME, TYPE_OF};
use crate::{Error, Result};

/// SQLite allows 32766 bound parameters per statement; stay well below.
const TRIPLE_BATCH_SIZE: usize = 500;
const OBSERVATION_BATCH_SIZE: usize = 200;
const NAME_LOOKUP_BATCH_SIZE: usize = 500;

/// SQLite output store
pub struct SqliteStore {
    pool: SqlitePool,
    tx: Mutex<Option<Transaction<'static, Sqlite>>>,
    num_triples: AtomicUsize,
    num_observations: AtomicUsize,
}

impl SqliteStore {
    /// Open (creating and migrating if needed) the database at `db_path`
    pub async fn open(db_path: &Path) -> Result<Self> {
        let pool = init_database(db_path).await?;
        Self::from_pool(pool).await
    }

    /// Wrap an already initialized pool
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        let tx = pool.begin().await?;
        Ok(Self {
            pool,
            tx: Mutex::new(Some(tx)),
            num_triples: AtomicUsize::new(0),
            num_observations: AtomicUsize::new(0),
        })
    }
}

fn closed() -> Error {
    Error::Internal("Store is already committed and closed".to_string())
}

#[async_trait]
impl Store for SqliteStore {
    async fn maybe_clear_before_import(&self) -> Result<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(closed)?;

        for table in ["triples", "observations", "key_value_store"] {
            sqlx::query(&format!("DELETE FROM {}", table))
                .execute(&mut **tx)
                .await?;
        }
        for (name, _) in INDEXES {
            sqlx::query(&format!("DROP INDEX IF EXISTS {}", name))
                .execute(&mut **tx)
                .await?;
        }

        info!("Cleared previous import data and dropped indexes");
        Ok(())
    }

    async fn insert_triples(&self, triples: &[Triple]) -> Result<()> {
        if triples.is_empty() {
            return Ok(());
        }

        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(closed)?;

        for chunk in triples.chunks(TRIPLE_BATCH_SIZE) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO triples (subject_id, predicate, object_id, object_value) ",
            );
            builder.push_values(chunk, |mut row, triple| {
                row.push_bind(triple.subject_id())
                    .push_bind(triple.predicate())
                    .push_bind(triple.object_id())
                    .push_bind(triple.object_value());
            });
            builder.build().execute(&mut **tx).await?;
        }

        self.num_triples.fetch_add(triples.len(), Ordering::Relaxed);
        debug!(count = triples.len(), "Inserted triples");
        Ok(())
    }

    async fn insert_observations(&self, observations: &[Observation]) -> Result<()> {
        if observations.is_empty() {
            return Ok(());
        }

        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(closed)?;

        for chunk in observations.chunks(OBSERVATION_BATCH_SIZE) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                r#"INSERT INTO observations (
                    entity, variable, date, value, provenance, unit, scaling_factor,
                    measurement_method, observation_period, properties
                ) "#,
            );
            builder.push_values(chunk, |mut row, obs| {
                row.push_bind(&obs.entity)
                    .push_bind(&obs.variable)
                    .push_bind(&obs.date)
                    .push_bind(&obs.value)
                    .push_bind(&obs.provenance)
                    .push_bind(&obs.unit)
                    .push_bind(&obs.scaling_factor)
                    .push_bind(&obs.measurement_method)
                    .push_bind(&obs.observation_period)
                    .push_bind(&obs.properties);
            });
            builder.build().execute(&mut **tx).await?;
        }

        self.num_observations
            .fetch_add(observations.len(), Ordering::Relaxed);
        debug!(count = observations.len(), "Inserted observations");
        Ok(())
    }

    async fn insert_key_value(&self, key: &str, value: &str) -> Result<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(closed)?;

        sqlx::query(
            r#"
            INSERT INTO key_value_store (lookup_key, value) VALUES (?, ?)
            ON CONFLICT(lookup_key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn insert_import_info(&self, status: ImportStatus) -> Result<()> {
        let metadata = serde_json::json!({
            "numTriples": self.num_triples.load(Ordering::Relaxed),
            "numObservations": self.num_observations.load(Ordering::Relaxed),
        });

        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(closed)?;

        sqlx::query("INSERT INTO imports (imported_at, status, metadata) VALUES (?, ?, ?)")
            .bind(chrono::Utc::now().to_rfc3339())
            .bind(status.as_str())
            .bind(metadata.to_string())
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    async fn select_triples_by_subject_type(&self, subject_type: &str) -> Result<Vec<Triple>> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(closed)?;

        let rows = sqlx::query(
            r#"
            SELECT subject_id, predicate, object_id, object_value
            FROM triples
            WHERE subject_id IN (
                SELECT subject_id FROM triples WHERE predicate = ? AND object_id = ?
            )
            ORDER BY rowid
            "#,
        )
        .bind(TYPE_OF)
        .bind(subject_type)
        .fetch_all(&mut **tx)
        .await?;

        rows.into_iter()
            .map(|row| {
                Triple::from_columns(
                    row.get("subject_id"),
                    row.get("predicate"),
                    row.get("object_id"),
                    row.get("object_value"),
                )
            })
            .collect()
    }

    async fn select_entity_names(&self, dcids: &[String]) -> Result<BTreeMap<String, String>> {
        let mut names = BTreeMap::new();
        if dcids.is_empty() {
            return Ok(names);
        }

        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(closed)?;

        for chunk in dcids.chunks(NAME_LOOKUP_BATCH_SIZE) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                "SELECT subject_id, object_value FROM triples WHERE predicate = ",
            );
            builder.push_bind(NAME);
            builder.push(" AND object_value IS NOT NULL AND subject_id IN (");
            let mut separated = builder.separated(", ");
            for dcid in chunk {
                separated.push_bind(dcid);
            }
            separated.push_unseparated(") ORDER BY rowid");

            let rows = builder.build().fetch_all(&mut **tx).await?;
            for row in rows {
                // First name wins when a node has several.
                names
                    .entry(row.get::<String, _>("subject_id"))
                    .or_insert_with(|| row.get::<String, _>("object_value"));
            }
        }

        Ok(names)
    }

    async fn commit_and_close(&self) -> Result<()> {
        let mut guard = self.tx.lock().await;
        let mut tx = guard.take().ok_or_else(closed)?;

        for (_, sql) in INDEXES {
            sqlx::query(sql).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        self.pool.close().await;

        info!(
            triples = self.num_triples.load(Ordering::Relaxed),
            observations = self.num_observations.load(Ordering::Relaxed),
            "Committed and closed database"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_temp_store() -> (TempDir, SqliteStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteStore::open(&temp_dir.path().join("test.db"))
            .await
            .unwrap();
        (temp_dir, store)
    }

    #[tokio::test]
    async fn test_select_triples_by_subject_type() {
        let (_temp_dir, store) = open_temp_store().await;
        store
            .insert_triples(&[
                Triple::with_id("sv1", TYPE_OF, "StatisticalVariable").unwrap(),
                Triple::with_value("sv1", NAME, "Variable 1").unwrap(),
                Triple::with_id("c/p/1", TYPE_OF, "Provenance").unwrap(),
            ])
            .await
            .unwrap();

        let triples = store
            .select_triples_by_subject_type("StatisticalVariable")
            .await
            .unwrap();
        assert_eq!(triples.len(), 2);
        assert!(triples.iter().all(|t| t.subject_id() == "sv1"));
    }

    #[tokio::test]
    async fn test_select_entity_names() {
        let (_temp_dir, store) = open_temp_store().await;
        store
            .insert_triples(&[
                Triple::with_value("Person", NAME, "Person").unwrap(),
                Triple::with_value("gender", NAME, "Gender").unwrap(),
            ])
            .await
            .unwrap();

        let names = store
            .select_entity_names(&["gender".to_string(), "unknown".to_string()])
            .await
            .unwrap();
        assert_eq!(names.len(), 1);
        assert_eq!(names.get("gender").map(String::as_str), Some("Gender"));
    }

    #[tokio::test]
    async fn test_commit_twice_fails() {
        let (_temp_dir, store) = open_temp_store().await;
        store.commit_and_close().await.unwrap();
        assert!(store.commit_and_close().await.is_err());
        assert!(store.insert_triples(&[Triple::with_id("a", "p", "b").unwrap()]).await.is_err());
    }
}

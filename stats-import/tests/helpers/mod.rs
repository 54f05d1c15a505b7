//! Test Helper Utilities
//!
//! Shared utilities for stats-import integration tests: temporary input and
//! output roots, and read-only access to the resulting SQLite database.

#![allow(dead_code)]

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use stats_import::models::ImportReport;
use stats_import::services::runner::{DB_FILE_NAME, PROCESS_DIR_NAME};
use stats_import::RunnerOptions;

/// Input and output directories under one temp dir
///
/// The TempDir must stay alive for the duration of the test.
pub struct TestWorkspace {
    _temp_dir: TempDir,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let input_dir = temp_dir.path().join("input");
        let output_dir = temp_dir.path().join("output");
        std::fs::create_dir_all(&input_dir).unwrap();
        Self {
            _temp_dir: temp_dir,
            input_dir,
            output_dir,
        }
    }

    /// Write a file under the input root, creating subdirectories
    pub fn write_input(&self, relative_path: &str, content: &str) -> PathBuf {
        let path = self.input_dir.join(relative_path);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn write_config(&self, config: serde_json::Value) {
        self.write_input("config.json", &config.to_string());
    }

    /// Options for an input-dir driven run
    pub fn options(&self) -> RunnerOptions {
        let mut options = RunnerOptions::new(&self.output_dir);
        options.input_dir = Some(self.input_dir.clone());
        options
    }

    pub fn db_path(&self) -> PathBuf {
        self.output_dir.join(DB_FILE_NAME)
    }

    pub fn process_dir(&self) -> PathBuf {
        self.output_dir.join(PROCESS_DIR_NAME)
    }

    pub fn report(&self) -> ImportReport {
        let content = std::fs::read_to_string(self.process_dir().join("report.json")).unwrap();
        serde_json::from_str(&content).unwrap()
    }

    /// Contents of the debug-resolve file written for an input file name
    pub fn debug_resolve(&self, file_name: &str) -> String {
        let suffix = format!("_{}", file_name);
        let entry = std::fs::read_dir(self.process_dir())
            .unwrap()
            .map(|e| e.unwrap().path())
            .find(|p| {
                let name = p.file_name().unwrap().to_string_lossy().to_string();
                name.starts_with("debug_resolve_") && name.ends_with(&suffix)
            })
            .unwrap_or_else(|| panic!("no debug resolve file for {}", file_name));
        std::fs::read_to_string(entry).unwrap()
    }

    pub async fn connect(&self) -> SqlitePool {
        connect(&self.db_path()).await
    }
}

/// A stored triple as (subject, predicate, object_id, object_value)
pub type TripleRow = (String, String, Option<String>, Option<String>);

pub async fn connect(db_path: &Path) -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&format!("sqlite:{}", db_path.display()))
        .await
        .unwrap()
}

pub async fn select_triples(pool: &SqlitePool) -> Vec<TripleRow> {
    sqlx::query("SELECT subject_id, predicate, object_id, object_value FROM triples ORDER BY rowid")
        .fetch_all(pool)
        .await
        .unwrap()
        .into_iter()
        .map(|row| {
            (
                row.get("subject_id"),
                row.get("predicate"),
                row.get("object_id"),
                row.get("object_value"),
            )
        })
        .collect()
}

/// Observations as (entity, variable, date, value, provenance)
pub async fn select_observations(pool: &SqlitePool) -> Vec<(String, String, String, String, String)> {
    sqlx::query(
        "SELECT entity, variable, date, value, provenance FROM observations ORDER BY rowid",
    )
    .fetch_all(pool)
    .await
    .unwrap()
    .into_iter()
    .map(|row| {
        (
            row.get("entity"),
            row.get("variable"),
            row.get("date"),
            row.get("value"),
            row.get("provenance"),
        )
    })
    .collect()
}

pub async fn count(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}

pub fn id_triple(subject: &str, predicate: &str, object_id: &str) -> TripleRow {
    (subject.to_string(), predicate.to_string(), Some(object_id.to_string()), None)
}

pub fn value_triple(subject: &str, predicate: &str, value: &str) -> TripleRow {
    (subject.to_string(), predicate.to_string(), None, Some(value.to_string()))
}

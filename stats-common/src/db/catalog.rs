//! Static catalog output store
//!
//! Used in main-catalog mode, where the destination is a set of files for a
//! downstream loader rather than a live database. Everything is buffered in
//! memory and written out on commit, into [`CATALOG_DIR_NAME`] under the
//! output directory.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;

use crate::db::models::{ImportStatus, Object, Observation, Triple};
use crate::db::store::{Store, NAME, TYPE_OF};
use crate::{Error, Result};

/// Subdirectory of the output directory that holds the catalog files
pub const CATALOG_DIR_NAME: &str = "catalog";
pub const SCHEMA_MCF_FILE_NAME: &str = "schema.mcf";
pub const OBSERVATIONS_CSV_FILE_NAME: &str = "observations.csv";
pub const KEY_VALUE_FILE_NAME: &str = "key_value_store.json";
pub const IMPORT_INFO_FILE_NAME: &str = "import_info.json";

#[derive(Default)]
struct CatalogState {
    triples: Vec<Triple>,
    observations: Vec<Observation>,
    key_values: BTreeMap<String, String>,
    status: Option<ImportStatus>,
    closed: bool,
}

/// File-backed store for main-catalog mode
pub struct CatalogStore {
    output_dir: PathBuf,
    state: Mutex<CatalogState>,
}

impl CatalogStore {
    pub fn new(output_dir: &Path) -> Result<Self> {
        let catalog_dir = output_dir.join(CATALOG_DIR_NAME);
        std::fs::create_dir_all(&catalog_dir)?;
        Ok(Self {
            output_dir: catalog_dir,
            state: Mutex::new(CatalogState::default()),
        })
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut CatalogState) -> Result<T>) -> Result<T> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| Error::Internal("Catalog state lock poisoned".to_string()))?;
        if state.closed {
            return Err(Error::Internal(
                "Store is already committed and closed".to_string(),
            ));
        }
        f(&mut state)
    }
}

/// Render triples as MCF nodes, one block per subject in first-seen order
pub fn triples_to_mcf(triples: &[Triple]) -> String {
    let mut order: Vec<&str> = Vec::new();
    let mut by_subject: BTreeMap<&str, Vec<&Triple>> = BTreeMap::new();
    for triple in triples {
        let entry = by_subject.entry(triple.subject_id()).or_default();
        if entry.is_empty() {
            order.push(triple.subject_id());
        }
        entry.push(triple);
    }

    let mut mcf = String::new();
    for subject in order {
        let _ = writeln!(mcf, "Node: dcid:{}", subject);
        for triple in &by_subject[subject] {
            match triple.object() {
                Object::Id(id) => {
                    let _ = writeln!(mcf, "{}: dcid:{}", triple.predicate(), id);
                }
                Object::Value(value) => {
                    let _ = writeln!(
                        mcf,
                        "{}: \"{}\"",
                        triple.predicate(),
                        value.replace('"', "\\\"")
                    );
                }
            }
        }
        mcf.push('\n');
    }
    mcf
}

#[async_trait]
impl Store for CatalogStore {
    async fn maybe_clear_before_import(&self) -> Result<()> {
        // Output files are rewritten in full on commit.
        Ok(())
    }

    async fn insert_triples(&self, triples: &[Triple]) -> Result<()> {
        self.with_state(|state| {
            state.triples.extend_from_slice(triples);
            Ok(())
        })
    }

    async fn insert_observations(&self, observations: &[Observation]) -> Result<()> {
        self.with_state(|state| {
            state.observations.extend_from_slice(observations);
            Ok(())
        })
    }

    async fn insert_key_value(&self, key: &str, value: &str) -> Result<()> {
        self.with_state(|state| {
            state.key_values.insert(key.to_string(), value.to_string());
            Ok(())
        })
    }

    async fn insert_import_info(&self, status: ImportStatus) -> Result<()> {
        self.with_state(|state| {
            state.status = Some(status);
            Ok(())
        })
    }

    async fn select_triples_by_subject_type(&self, subject_type: &str) -> Result<Vec<Triple>> {
        self.with_state(|state| {
            let subjects: std::collections::BTreeSet<&str> = state
                .triples
                .iter()
                .filter(|t| t.predicate() == TYPE_OF && t.object_id() == Some(subject_type))
                .map(|t| t.subject_id())
                .collect();
            Ok(state
                .triples
                .iter()
                .filter(|t| subjects.contains(t.subject_id()))
                .cloned()
                .collect())
        })
    }

    async fn select_entity_names(&self, dcids: &[String]) -> Result<BTreeMap<String, String>> {
        self.with_state(|state| {
            let wanted: HashSet<&str> = dcids.iter().map(String::as_str).collect();
            let mut names = BTreeMap::new();
            for triple in &state.triples {
                if triple.predicate() != NAME || !wanted.contains(triple.subject_id()) {
                    continue;
                }
                if let Some(value) = triple.object_value() {
                    names
                        .entry(triple.subject_id().to_string())
                        .or_insert_with(|| value.to_string());
                }
            }
            Ok(names)
        })
    }

    async fn commit_and_close(&self) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| Error::Internal("Catalog state lock poisoned".to_string()))?;
        if state.closed {
            return Err(Error::Internal(
                "Store is already committed and closed".to_string(),
            ));
        }

        std::fs::write(
            self.output_dir.join(SCHEMA_MCF_FILE_NAME),
            triples_to_mcf(&state.triples),
        )?;

        let mut writer = csv::Writer::from_path(self.output_dir.join(OBSERVATIONS_CSV_FILE_NAME))?;
        for observation in &state.observations {
            writer.serialize(observation)?;
        }
        writer.flush()?;

        std::fs::write(
            self.output_dir.join(KEY_VALUE_FILE_NAME),
            serde_json::to_string_pretty(&state.key_values)?,
        )?;

        let import_info = serde_json::json!({
            "status": state.status.map(|s| s.as_str()),
            "numTriples": state.triples.len(),
            "numObservations": state.observations.len(),
        });
        std::fs::write(
            self.output_dir.join(IMPORT_INFO_FILE_NAME),
            serde_json::to_string_pretty(&import_info)?,
        )?;

        state.closed = true;
        info!(
            output_dir = %self.output_dir.display(),
            triples = state.triples.len(),
            observations = state.observations.len(),
            "Wrote catalog output"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triples_to_mcf_groups_by_subject() {
        let triples = vec![
            Triple::with_id("sv1", TYPE_OF, "StatisticalVariable").unwrap(),
            Triple::with_id("c/p/1", TYPE_OF, "Provenance").unwrap(),
            Triple::with_value("sv1", NAME, "Variable 1").unwrap(),
        ];
        let mcf = triples_to_mcf(&triples);
        assert_eq!(
            mcf,
            "Node: dcid:sv1\ntypeOf: dcid:StatisticalVariable\nname: \"Variable 1\"\n\n\
             Node: dcid:c/p/1\ntypeOf: dcid:Provenance\n\n"
        );
    }

    #[tokio::test]
    async fn test_commit_writes_files() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let store = CatalogStore::new(temp_dir.path()).unwrap();
        store
            .insert_triples(&[Triple::with_id("sv1", TYPE_OF, "StatisticalVariable").unwrap()])
            .await
            .unwrap();
        store.insert_import_info(ImportStatus::Success).await.unwrap();
        store.commit_and_close().await.unwrap();

        let catalog_dir = temp_dir.path().join(CATALOG_DIR_NAME);
        assert!(catalog_dir.join(SCHEMA_MCF_FILE_NAME).exists());
        assert!(catalog_dir.join(OBSERVATIONS_CSV_FILE_NAME).exists());
        assert!(!temp_dir.path().join(SCHEMA_MCF_FILE_NAME).exists());
        let info = std::fs::read_to_string(catalog_dir.join(IMPORT_INFO_FILE_NAME)).unwrap();
        assert!(info.contains("SUCCESS"));
        assert!(store.insert_triples(&[]).await.is_err());
    }

    #[tokio::test]
    async fn test_entity_names() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let store = CatalogStore::new(temp_dir.path()).unwrap();
        store
            .insert_triples(&[
                Triple::with_value("gender", NAME, "Gender").unwrap(),
                Triple::with_value("gender", NAME, "Sex").unwrap(),
                Triple::with_value("age", NAME, "Age").unwrap(),
                Triple::with_id("Female", TYPE_OF, "GenderType").unwrap(),
            ])
            .await
            .unwrap();

        let names = store
            .select_entity_names(&["gender".to_string(), "Female".to_string()])
            .await
            .unwrap();
        assert_eq!(names.len(), 1);
        assert_eq!(names["gender"], "Gender");
    }
}

//! Importer family
//!
//! One importer per input file. CSV files are dispatched on
//! `(import type, format)`; MCF files always go to the MCF importer.
//!
//! | import type  | format                    | importer             |
//! |--------------|---------------------------|----------------------|
//! | observations | variablePerRow            | variable-per-row     |
//! | observations | variablePerColumn / unset | observations         |
//! | events       | any                       | events               |
//! | entities     | any                       | entities             |

pub mod entities;
pub mod events;
pub mod mcf;
pub mod mcf_parser;
pub mod observations;
pub mod variable_per_row;

use std::path::{Path, PathBuf};
use tracing::info;

use stats_common::db::Store;
use stats_common::fs::InputFile;
use stats_common::{Error, Result};

use crate::config::Config;
use crate::models::{ImportType, InputFileFormat};
use crate::nodes::Nodes;
use crate::services::reporter::FileReporter;

pub use entities::EntitiesImporter;
pub use events::EventsImporter;
pub use mcf::McfImporter;
pub use observations::ObservationsImporter;
pub use variable_per_row::VariablePerRowImporter;

/// Rows or triples written per store call by streaming importers
pub const INSERT_BATCH_SIZE: usize = 1000;

const DEBUG_RESOLVE_FILE_NAME_PREFIX: &str = "debug_resolve";

/// Shared state handed to every importer
pub struct ImportContext<'a> {
    pub store: &'a dyn Store,
    pub nodes: &'a mut Nodes,
    /// Root of the output tree (main-catalog copies land under `mcf/`)
    pub output_dir: &'a Path,
    /// Debug artifacts directory
    pub process_dir: &'a Path,
    /// Copy MCF files instead of importing them
    pub main_catalog: bool,
}

impl ImportContext<'_> {
    /// Debug-resolve CSV path for an input file
    pub fn debug_resolve_file(&self, file: &InputFile) -> PathBuf {
        let sanitized = file
            .full_path()
            .display()
            .to_string()
            .replace("://", "_")
            .replace(['/', '\\'], "_");
        self.process_dir
            .join(format!("{}_{}", DEBUG_RESOLVE_FILE_NAME_PREFIX, sanitized))
    }
}

/// Importer for a single input file
pub enum Importer {
    Observations(ObservationsImporter),
    VariablePerRow(VariablePerRowImporter),
    Events(EventsImporter),
    Entities(EntitiesImporter),
    Mcf(McfImporter),
}

impl Importer {
    /// Pick the importer for a file
    ///
    /// Per-file configuration errors surface here, before any data is read.
    pub fn for_file(file: &InputFile, config: &Config) -> Result<Self> {
        if file.has_extension("mcf") {
            return Ok(Importer::Mcf(McfImporter::new(file.clone())));
        }
        if !file.has_extension("csv") {
            let extension = Path::new(file.name())
                .extension()
                .map(|e| e.to_string_lossy().to_string())
                .unwrap_or_default();
            return Err(Error::UnsupportedImportType {
                import_type: extension,
                file: file.full_path().display().to_string(),
            });
        }

        let importer = match config.import_type(file)? {
            ImportType::Observations => match config.format(file)? {
                Some(InputFileFormat::VariablePerRow) => {
                    Importer::VariablePerRow(VariablePerRowImporter::new(file.clone(), config))
                }
                Some(InputFileFormat::VariablePerColumn) | None => {
                    Importer::Observations(ObservationsImporter::new(file.clone(), config))
                }
            },
            ImportType::Events => Importer::Events(EventsImporter::new(file.clone(), config)?),
            ImportType::Entities => {
                Importer::Entities(EntitiesImporter::new(file.clone(), config)?)
            }
        };
        Ok(importer)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Importer::Observations(_) => "observations",
            Importer::VariablePerRow(_) => "variable-per-row",
            Importer::Events(_) => "events",
            Importer::Entities(_) => "entities",
            Importer::Mcf(_) => "mcf",
        }
    }

    pub fn input_file(&self) -> &InputFile {
        match self {
            Importer::Observations(importer) => &importer.input_file,
            Importer::VariablePerRow(importer) => &importer.input_file,
            Importer::Events(importer) => &importer.input_file,
            Importer::Entities(importer) => &importer.input_file,
            Importer::Mcf(importer) => &importer.input_file,
        }
    }

    /// Import the file, reporting started and then success or failure
    ///
    /// Every error, including one from the reporter itself, is reported as
    /// the file's failure before being returned to the caller.
    pub async fn run(&self, ctx: &mut ImportContext<'_>, reporter: &FileReporter) -> Result<()> {
        let result = self.import(ctx, reporter).await;
        if let Err(e) = &result {
            reporter.report_failure(&e.to_string());
        }
        result
    }

    async fn import(&self, ctx: &mut ImportContext<'_>, reporter: &FileReporter) -> Result<()> {
        reporter.report_started()?;
        info!(
            file = %self.input_file().relative_path(),
            importer = self.kind(),
            "Importing file"
        );

        match self {
            Importer::Observations(importer) => importer.do_import(ctx).await?,
            Importer::VariablePerRow(importer) => importer.do_import(ctx).await?,
            Importer::Events(importer) => importer.do_import(ctx).await?,
            Importer::Entities(importer) => importer.do_import(ctx).await?,
            Importer::Mcf(importer) => importer.do_import(ctx).await?,
        }
        reporter.report_success()
    }
}

/// Open a CSV input with trimmed fields
pub(crate) fn open_csv(file: &InputFile) -> Result<csv::Reader<std::fs::File>> {
    let path = file.full_path();
    if !path.exists() {
        return Err(Error::FileNotFound(path));
    }
    Ok(csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)?)
}

/// Header columns left after dropping ignored ones: (index in row, name)
pub(crate) fn kept_columns(headers: &csv::StringRecord, ignore_columns: &[String]) -> Vec<(usize, String)> {
    headers
        .iter()
        .enumerate()
        .filter(|(_, name)| !ignore_columns.iter().any(|ignored| ignored == name))
        .map(|(index, name)| (index, name.to_string()))
        .collect()
}

/// Write the `input, dcid, entityType` resolution log for a file
pub(crate) fn write_debug_resolve(
    path: &Path,
    entity_type: &str,
    entities: impl IntoIterator<Item = String>,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["input", "dcid", "entityType"])?;
    for entity in entities {
        // Entity values are taken to be dcids already.
        writer.write_record([entity.as_str(), entity.as_str(), entity_type])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReportStatus;
    use crate::services::reporter::ImportReporter;
    use serde_json::json;
    use std::sync::Arc;

    fn dispatch(config: serde_json::Value, name: &str) -> Result<Importer> {
        let config = Config::from_value(config).unwrap();
        Importer::for_file(&InputFile::new("/input", name), &config)
    }

    #[test]
    fn test_dispatch_table() {
        let config = json!({
            "inputFiles": {
                "rows.csv": {"format": "variablePerRow"},
                "cols.csv": {"format": "variablePerColumn"},
                "events.csv": {"importType": "events", "eventType": "Fire"},
                "entities.csv": {"importType": "entities", "rowEntityType": "Company"}
            }
        });
        assert_eq!(dispatch(config.clone(), "rows.csv").unwrap().kind(), "variable-per-row");
        assert_eq!(dispatch(config.clone(), "cols.csv").unwrap().kind(), "observations");
        assert_eq!(dispatch(config.clone(), "plain.csv").unwrap().kind(), "observations");
        assert_eq!(dispatch(config.clone(), "events.csv").unwrap().kind(), "events");
        assert_eq!(dispatch(config.clone(), "entities.csv").unwrap().kind(), "entities");
        assert_eq!(dispatch(config, "schema.mcf").unwrap().kind(), "mcf");
    }

    #[test]
    fn test_unsupported_file_type() {
        let err = dispatch(json!({}), "notes.txt").err().unwrap();
        assert!(matches!(err, Error::UnsupportedImportType { .. }));
    }

    #[test]
    fn test_bad_import_type_fails_dispatch() {
        let err = dispatch(json!({"inputFiles": {"a.csv": {"importType": "eVeNtS"}}}), "a.csv")
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_report_write_error_marks_file_failed() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("input");
        std::fs::create_dir_all(&input).unwrap();
        std::fs::write(input.join("a.mcf"), "Node: n\ndcid: \"x/n\"\n").unwrap();
        // A directory where the report file should be: every report write fails.
        let report_path = dir.path().join("report.json");
        std::fs::create_dir_all(&report_path).unwrap();

        let config = Arc::new(Config::empty());
        let file = InputFile::new(&input, "a.mcf");
        let importer = Importer::for_file(&file, &config).unwrap();
        let store = stats_common::db::CatalogStore::new(&dir.path().join("output")).unwrap();
        let mut nodes = Nodes::new(config);
        let mut ctx = ImportContext {
            store: &store,
            nodes: &mut nodes,
            output_dir: dir.path(),
            process_dir: dir.path(),
            main_catalog: false,
        };
        let reporter = ImportReporter::new(&report_path);
        let file_reporter = reporter.file_reporter(&file);

        assert!(importer.run(&mut ctx, &file_reporter).await.is_err());

        let report = reporter.snapshot();
        let entry = report
            .import_files
            .iter()
            .find(|f| f.name == file_reporter.name())
            .unwrap();
        assert_eq!(entry.status, ReportStatus::Failure);
        assert!(entry.error.is_some());
    }

    #[test]
    fn test_kept_columns() {
        let headers = csv::StringRecord::from(vec!["geo", "date", "notes", "var1"]);
        let kept = kept_columns(&headers, &["notes".to_string()]);
        assert_eq!(
            kept,
            vec![
                (0, "geo".to_string()),
                (1, "date".to_string()),
                (3, "var1".to_string())
            ]
        );
    }
}

//! Import orchestrator
//!
//! **Run states:**
//! ```text
//! INIT -> DB_READY -> SCHEMA_UPDATE ----------------------> DONE
//!                  -> IMPORTING -> POST_IMPORT ------------> DONE
//! (any) -> FAILED
//! ```
//!
//! Files are processed strictly in order: CSV files sorted by name, then MCF
//! files sorted by name. The store is committed exactly once, at the end of
//! a successful run.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use stats_common::db::{CatalogStore, SqliteStore, Store};
use stats_common::fs::InputFile;
use stats_common::{Error, ImportStatus, Result, Triple};

use crate::config::{Config, FileDefaults, CONFIG_JSON_FILE_NAME, VERTICAL_SPECS_FILE_TYPE};
use crate::importers::{ImportContext, Importer};
use crate::models::ImportReport;
use crate::nodes::Nodes;
use crate::services::hierarchy::{self, SpecializedNames};
use crate::services::reporter::{ImportReporter, REPORT_JSON_FILE_NAME};
use crate::services::{nl, svg_cache};
use crate::vocab::{TYPE_STATISTICAL_VARIABLE, TYPE_TOPIC};

pub const NL_DIR_NAME: &str = "nl";
pub const PROCESS_DIR_NAME: &str = "process";
pub const DB_FILE_NAME: &str = "datacommons.db";

/// What a run does with its inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum RunMode {
    /// Import into the SQLite store
    #[default]
    #[value(name = "customdc")]
    CustomDc,
    /// Create or migrate the store only
    #[value(name = "schemaupdate")]
    SchemaUpdate,
    /// Write a static catalog instead of a database
    #[value(name = "maindc")]
    MainDc,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self {
            RunMode::CustomDc => "customdc",
            RunMode::SchemaUpdate => "schemaupdate",
            RunMode::MainDc => "maindc",
        };
        write!(f, "{}", mode)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    DbReady,
    SchemaUpdate,
    Importing,
    PostImport,
    Done,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            RunState::Init => "INIT",
            RunState::DbReady => "DB_READY",
            RunState::SchemaUpdate => "SCHEMA_UPDATE",
            RunState::Importing => "IMPORTING",
            RunState::PostImport => "POST_IMPORT",
            RunState::Done => "DONE",
            RunState::Failed => "FAILED",
        };
        write!(f, "{}", state)
    }
}

/// Process-level settings for one run
#[derive(Debug, Clone, Default)]
pub struct RunnerOptions {
    pub config_file: Option<PathBuf>,
    pub input_dir: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub mode: RunMode,
    /// Defaults to `<output_dir>/datacommons.db`
    pub sqlite_path: Option<PathBuf>,
    /// Entity type for files that don't configure one
    pub entity_type: Option<String>,
    /// Ignored columns for files that don't configure their own
    pub ignore_columns: Vec<String>,
    /// Record per-file failures and keep going instead of aborting
    pub continue_on_file_error: bool,
}

impl RunnerOptions {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            ..Default::default()
        }
    }
}

/// Run a full import
///
/// The report file is written whatever the outcome; on failure it carries
/// the error message and the error is returned.
pub async fn run_import(options: RunnerOptions) -> Result<ImportReport> {
    let output_dir = stats_common::fs::open_dir(&options.output_dir)?;
    let process_dir = stats_common::fs::open_dir(&output_dir.join(PROCESS_DIR_NAME))?;
    let reporter = ImportReporter::new(&process_dir.join(REPORT_JSON_FILE_NAME));

    let result = match Runner::new(options, reporter.clone()) {
        Ok(mut runner) => runner.run().await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => Ok(reporter.snapshot()),
        Err(e) => {
            error!("Error updating stats: {}", e);
            if let Err(report_error) = reporter.report_failure(&e.to_string()) {
                warn!("Failed to write failure report: {}", report_error);
            }
            Err(e)
        }
    }
}

pub struct Runner {
    options: RunnerOptions,
    config: Arc<Config>,
    input_roots: Vec<PathBuf>,
    output_dir: PathBuf,
    nl_dir: PathBuf,
    process_dir: PathBuf,
    reporter: ImportReporter,
    nodes: Nodes,
    state: RunState,
    /// Special file type -> first matching input file
    special_files: BTreeMap<String, InputFile>,
    svg_specialized_names: SpecializedNames,
}

impl Runner {
    pub fn new(options: RunnerOptions, reporter: ImportReporter) -> Result<Self> {
        let defaults = FileDefaults {
            entity_type: options.entity_type.clone(),
            ignore_columns: options.ignore_columns.clone(),
        };
        let (config, input_roots) = load_config(&options)?;
        let config = Arc::new(config.with_defaults(defaults));

        let output_dir = stats_common::fs::open_dir(&options.output_dir)?;
        let nl_dir = stats_common::fs::open_dir(&output_dir.join(NL_DIR_NAME))?;
        let process_dir = stats_common::fs::open_dir(&output_dir.join(PROCESS_DIR_NAME))?;

        info!(
            mode = %options.mode,
            output_dir = %output_dir.display(),
            "Runner created with {} input root(s)",
            input_roots.len()
        );

        Ok(Self {
            nodes: Nodes::new(config.clone()),
            config,
            input_roots,
            output_dir,
            nl_dir,
            process_dir,
            reporter,
            state: RunState::Init,
            special_files: BTreeMap::new(),
            svg_specialized_names: SpecializedNames::new(),
            options,
        })
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    fn transition_to(&mut self, new_state: RunState) {
        if self.state.is_terminal() {
            warn!("Ignoring transition {} -> {}", self.state, new_state);
            return;
        }
        info!("Run state: {} -> {}", self.state, new_state);
        self.state = new_state;
    }

    pub async fn run(&mut self) -> Result<()> {
        let result = self.run_stages().await;
        match &result {
            Ok(()) => self.transition_to(RunState::Done),
            Err(_) => self.transition_to(RunState::Failed),
        }
        result
    }

    async fn run_stages(&mut self) -> Result<()> {
        let store = self.open_store().await?;
        self.transition_to(RunState::DbReady);

        if self.options.mode == RunMode::SchemaUpdate {
            self.transition_to(RunState::SchemaUpdate);
            info!("Skipping imports because run mode is schema update");
        } else {
            self.run_imports_and_do_post_import_work(store.as_ref()).await?;
        }

        store.commit_and_close().await?;
        info!("Committed and closed store");

        self.reporter.report_done()
    }

    async fn open_store(&self) -> Result<Box<dyn Store>> {
        if self.options.mode == RunMode::MainDc {
            info!("Using main catalog output in {}", self.output_dir.display());
            return Ok(Box::new(CatalogStore::new(&self.output_dir)?));
        }

        let db_path = self
            .options
            .sqlite_path
            .clone()
            .unwrap_or_else(|| self.output_dir.join(DB_FILE_NAME));
        info!("Using SQLite database: {}", db_path.display());
        Ok(Box::new(SqliteStore::open(&db_path).await?))
    }

    async fn run_imports_and_do_post_import_work(&mut self, store: &dyn Store) -> Result<()> {
        store.maybe_clear_before_import().await?;

        self.transition_to(RunState::Importing);
        self.run_all_data_imports(store).await?;

        self.transition_to(RunState::PostImport);
        let node_triples = self.nodes.triples()?;
        info!("Inserting {} node triples", node_triples.len());
        store.insert_triples(&node_triples).await?;

        self.generate_svg_hierarchy(store, &node_triples).await?;
        svg_cache::generate_svg_cache(store, &self.svg_specialized_names).await?;
        self.generate_nl_sentences(store).await?;

        store.insert_import_info(ImportStatus::Success).await
    }

    async fn run_all_data_imports(&mut self, store: &dyn Store) -> Result<()> {
        let mut input_files = Vec::new();
        for root in &self.input_roots {
            input_files.extend(stats_common::fs::list_files(root)?);
        }

        let mut csv_files = Vec::new();
        let mut mcf_files = Vec::new();
        for file in input_files {
            self.check_if_special_file(&file);
            if file.has_extension("csv") {
                csv_files.push(file);
            } else if file.has_extension("mcf") {
                mcf_files.push(file);
            } else {
                debug!("Not importing {}", file.relative_path());
            }
        }

        let by_name = |a: &InputFile, b: &InputFile| {
            (a.name(), a.relative_path()).cmp(&(b.name(), b.relative_path()))
        };
        csv_files.sort_by(by_name);
        mcf_files.sort_by(by_name);

        let ordered: Vec<InputFile> = csv_files.into_iter().chain(mcf_files).collect();
        info!("Found {} file(s) to import", ordered.len());
        self.reporter.report_started(&ordered)?;

        for file in &ordered {
            self.run_single_import(store, file).await?;
        }
        Ok(())
    }

    async fn run_single_import(&mut self, store: &dyn Store, file: &InputFile) -> Result<()> {
        let file_reporter = self.reporter.file_reporter(file);

        let result = match Importer::for_file(file, &self.config) {
            Ok(importer) => {
                let mut ctx = ImportContext {
                    store,
                    nodes: &mut self.nodes,
                    output_dir: &self.output_dir,
                    process_dir: &self.process_dir,
                    main_catalog: self.options.mode == RunMode::MainDc,
                };
                importer.run(&mut ctx, &file_reporter).await
            }
            Err(e) => {
                file_reporter.report_failure(&e.to_string());
                Err(e)
            }
        };

        match result {
            Err(e) if self.options.continue_on_file_error => {
                warn!(
                    file = %file.relative_path(),
                    "Import failed, continuing with next file: {}",
                    e
                );
                Ok(())
            }
            other => other,
        }
    }

    fn check_if_special_file(&mut self, file: &InputFile) {
        for (file_type, file_name) in self.config.special_files() {
            if self.special_files.contains_key(file_type) {
                continue;
            }
            if file.matches_any(&[file_name.as_str()]) {
                debug!("Special file {}: {}", file_type, file.relative_path());
                self.special_files.insert(file_type.clone(), file.clone());
            }
        }
    }

    async fn generate_svg_hierarchy(&mut self, store: &dyn Store, node_triples: &[Triple]) -> Result<()> {
        if self.options.mode == RunMode::MainDc {
            info!("Hierarchy generation not supported in main catalog mode, skipping");
            return Ok(());
        }
        if !self.config.generate_hierarchy() {
            info!("Hierarchy generation not enabled, skipping");
            return Ok(());
        }

        let sv_triples = store
            .select_triples_by_subject_type(TYPE_STATISTICAL_VARIABLE)
            .await?;
        if sv_triples.is_empty() {
            info!("No statistical variable triples found, skipping hierarchy generation");
            return Ok(());
        }
        info!("Generating hierarchy for {} variable triples", sv_triples.len());

        let vertical_specs = match self.special_files.get(VERTICAL_SPECS_FILE_TYPE) {
            Some(file) => {
                info!("Loading vertical specs from {}", file.relative_path());
                hierarchy::load_vertical_specs(&file.read_to_string()?)?
            }
            None => Vec::new(),
        };

        let dcids = hierarchy::schema_dcids(&sv_triples, &vertical_specs);
        let dcid2name = store.select_entity_names(&dcids).await?;
        let result = hierarchy::generate(&sv_triples, &vertical_specs, &dcid2name)?;

        // Root group triples may already have come from the node registry.
        let existing: BTreeSet<&Triple> = node_triples.iter().collect();
        let new_triples: Vec<Triple> = result
            .svg_triples
            .into_iter()
            .filter(|triple| !existing.contains(triple))
            .collect();
        info!("Inserting {} hierarchy triples", new_triples.len());
        store.insert_triples(&new_triples).await?;

        self.svg_specialized_names = result.svg_specialized_names;
        Ok(())
    }

    async fn generate_nl_sentences(&self, store: &dyn Store) -> Result<()> {
        let subject_type = if self.config.generate_topics() {
            TYPE_TOPIC
        } else {
            TYPE_STATISTICAL_VARIABLE
        };
        let triples = store.select_triples_by_subject_type(subject_type).await?;
        nl::generate_nl_sentences(&triples, &self.nl_dir)?;
        Ok(())
    }
}

/// Resolve the import config and the input roots it applies to
fn load_config(options: &RunnerOptions) -> Result<(Config, Vec<PathBuf>)> {
    if let Some(config_file) = &options.config_file {
        let config = Config::load(config_file)?;
        let mut roots: Vec<PathBuf> = config
            .data_download_urls()?
            .into_iter()
            .map(PathBuf::from)
            .collect();
        if roots.is_empty() {
            match &options.input_dir {
                Some(input_dir) => roots.push(input_dir.clone()),
                None => {
                    return Err(Error::Config(
                        "Data download URLs not found in config".to_string(),
                    ))
                }
            }
        }
        return Ok((config, roots));
    }

    let Some(input_dir) = &options.input_dir else {
        return Err(Error::Config(
            "One of config_file or input_dir must be specified".to_string(),
        ));
    };
    Ok((input_dir_config(input_dir)?, vec![input_dir.clone()]))
}

fn input_dir_config(input_dir: &Path) -> Result<Config> {
    let config_path = input_dir.join(CONFIG_JSON_FILE_NAME);
    if config_path.is_file() {
        return Config::load(&config_path);
    }
    warn!(
        "No {} in {}, using defaults for every file",
        CONFIG_JSON_FILE_NAME,
        input_dir.display()
    );
    Ok(Config::empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_state_is_absorbing() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("input");
        std::fs::create_dir_all(&input).unwrap();
        let mut options = RunnerOptions::new(dir.path().join("output"));
        options.input_dir = Some(input);
        let reporter = ImportReporter::new(&dir.path().join("report.json"));

        let mut runner = Runner::new(options, reporter).unwrap();
        runner.transition_to(RunState::Failed);
        runner.transition_to(RunState::Importing);
        assert_eq!(runner.state(), RunState::Failed);
    }

    #[test]
    fn test_config_or_input_dir_required() {
        let options = RunnerOptions::new("/tmp/out");
        let err = load_config(&options).err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_config_file_without_download_urls() {
        let dir = tempfile::TempDir::new().unwrap();
        let config_file = dir.path().join("config.json");
        std::fs::write(&config_file, "{}").unwrap();
        let mut options = RunnerOptions::new(dir.path().join("output"));
        options.config_file = Some(config_file);

        let err = load_config(&options).err().unwrap();
        assert!(err.to_string().contains("Data download URLs not found"));

        options.input_dir = Some(dir.path().to_path_buf());
        let (_, roots) = load_config(&options).unwrap();
        assert_eq!(roots, vec![dir.path().to_path_buf()]);
    }

    #[test]
    fn test_run_mode_names() {
        use clap::ValueEnum;
        let names: Vec<String> = RunMode::value_variants()
            .iter()
            .map(|mode| mode.to_string())
            .collect();
        assert_eq!(names, vec!["customdc", "schemaupdate", "maindc"]);
        assert_eq!(RunMode::from_str("maindc", false).unwrap(), RunMode::MainDc);
    }
}

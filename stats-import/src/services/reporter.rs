//! Import status reporter
//!
//! One [`ImportReporter`] per run, cloned into whoever needs to report. Every
//! status change rewrites the report file (via a temp file and rename), so a
//! crash mid-run still leaves a complete, parseable report behind.

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

use stats_common::fs::InputFile;
use stats_common::Result;

use crate::models::{ImportFileReport, ImportReport, ReportStatus};

/// Name of the report file inside the process directory
pub const REPORT_JSON_FILE_NAME: &str = "report.json";

struct ReporterState {
    report: ImportReport,
    report_file: PathBuf,
}

/// Run-level reporter
#[derive(Clone)]
pub struct ImportReporter {
    state: Arc<Mutex<ReporterState>>,
}

impl ImportReporter {
    pub fn new(report_file: &Path) -> Self {
        Self {
            state: Arc::new(Mutex::new(ReporterState {
                report: ImportReport::new(),
                report_file: report_file.to_path_buf(),
            })),
        }
    }

    /// Mark the run as started with the full, ordered list of files
    pub fn report_started(&self, import_files: &[InputFile]) -> Result<()> {
        self.update(|report| {
            report.status = ReportStatus::Started;
            report.import_files = import_files
                .iter()
                .map(|f| ImportFileReport::new(report_name(f)))
                .collect();
        })
    }

    pub fn report_done(&self) -> Result<()> {
        self.update(|report| {
            report.status = ReportStatus::Success;
            report.error = None;
        })
    }

    pub fn report_failure(&self, error: &str) -> Result<()> {
        self.update(|report| {
            report.status = ReportStatus::Failure;
            report.error = Some(error.to_string());
        })
    }

    /// Handle for reporting on a single file
    pub fn file_reporter(&self, file: &InputFile) -> FileReporter {
        FileReporter {
            parent: self.clone(),
            name: report_name(file),
        }
    }

    /// Copy of the current report
    pub fn snapshot(&self) -> ImportReport {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .report
            .clone()
    }

    fn update_file(&self, name: &str, status: ReportStatus, error: Option<String>) -> Result<()> {
        self.update(|report| {
            if report.file_mut(name).is_none() {
                report.import_files.push(ImportFileReport::new(name));
            }
            if let Some(file) = report.file_mut(name) {
                file.status = status;
                file.error = error;
            }
        })
    }

    fn update(&self, f: impl FnOnce(&mut ImportReport)) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state.report);
        state.report.last_update = Utc::now();

        let json = serde_json::to_string_pretty(&state.report)?;
        let tmp_file = state.report_file.with_extension("json.tmp");
        stats_common::fs::write_bytes(&tmp_file, json.as_bytes())?;
        std::fs::rename(&tmp_file, &state.report_file)?;

        debug!(status = ?state.report.status, "Report updated");
        Ok(())
    }
}

/// Per-file reporter handle
#[derive(Clone)]
pub struct FileReporter {
    parent: ImportReporter,
    name: String,
}

impl FileReporter {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn report_started(&self) -> Result<()> {
        self.parent.update_file(&self.name, ReportStatus::Started, None)
    }

    pub fn report_success(&self) -> Result<()> {
        self.parent.update_file(&self.name, ReportStatus::Success, None)
    }

    /// Record a failure; never fails itself, since it runs on error paths
    pub fn report_failure(&self, error: &str) {
        if let Err(e) = self
            .parent
            .update_file(&self.name, ReportStatus::Failure, Some(error.to_string()))
        {
            warn!("Failed to record failure for {}: {}", self.name, e);
        }
    }
}

fn report_name(file: &InputFile) -> String {
    file.full_path().display().to_string()
}

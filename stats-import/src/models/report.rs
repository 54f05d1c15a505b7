//! Persisted import report
//!
//! Serialized to `process/report.json` after every status change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of the run or of a single file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportStatus {
    NotStarted,
    Started,
    Success,
    Failure,
}

impl ReportStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReportStatus::Success | ReportStatus::Failure)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportFileReport {
    pub name: String,
    pub status: ReportStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ImportFileReport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: ReportStatus::NotStarted,
            error: None,
        }
    }
}

/// Whole-run report
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub run_id: Uuid,
    pub status: ReportStatus,
    pub started_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub import_files: Vec<ImportFileReport>,
}

impl ImportReport {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            status: ReportStatus::NotStarted,
            started_at: now,
            last_update: now,
            error: None,
            import_files: Vec::new(),
        }
    }

    pub fn file_mut(&mut self, name: &str) -> Option<&mut ImportFileReport> {
        self.import_files.iter_mut().find(|f| f.name == name)
    }
}

impl Default for ImportReport {
    fn default() -> Self {
        Self::new()
    }
}

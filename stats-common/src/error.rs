//! Common error types for the stats import pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Common result type for import operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds shared by the store, the importers and the runner
///
/// None of these are retried anywhere. Whether an error aborts a single file
/// or the whole run is decided by the runner.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parse or serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV tokenizer error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Malformed or unsupported configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Import type that has no importer
    #[error("Unsupported import type: {import_type} ({file})")]
    UnsupportedImportType { import_type: String, file: String },

    /// MCF node referenced as a subject without a dcid
    #[error("dcid not specified for node: {0}")]
    UnresolvedId(String),

    /// Literal value longer than the store accepts
    #[error("Value of property {predicate} in node {subject} too long (got: {len}, max: {max})")]
    ValueTooLong {
        subject: String,
        predicate: String,
        len: usize,
        max: usize,
    },

    /// Required input or config path does not exist
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Invalid input data
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

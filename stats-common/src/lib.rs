//! # Stats Common Library
//!
//! Shared code for the statistics import pipeline including:
//! - Triple and observation data model
//! - Storage collaborator (SQLite store and static catalog store)
//! - Local filesystem access and glob matching
//! - Error types

pub mod db;
pub mod error;
pub mod fs;

pub use db::models::{ImportStatus, Object, Observation, Triple, MAX_VALUE_CHARS};
pub use error::{Error, Result};

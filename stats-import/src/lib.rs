//! stats-import library interface
//!
//! Imports CSV and MCF statistics into a triple store. Exposed as a library
//! so integration tests can drive the runner directly.

pub mod config;
pub mod importers;
pub mod models;
pub mod nodes;
pub mod services;
pub mod vocab;

pub use crate::config::Config;
pub use crate::nodes::Nodes;
pub use crate::services::runner::{run_import, RunMode, RunnerOptions};

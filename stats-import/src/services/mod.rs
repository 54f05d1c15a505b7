//! Run orchestration and post-import services
//!
//! - `runner`: run state machine, file ordering and dispatch
//! - `reporter`: persisted run and per-file status
//! - `hierarchy`: statistical variable groups
//! - `svg_cache`: group tree cache for browsing clients
//! - `nl`: sentences for embedding generation

pub mod hierarchy;
pub mod nl;
pub mod reporter;
pub mod runner;
pub mod svg_cache;

pub use hierarchy::{HierarchyResult, SpecializedNames};
pub use reporter::{FileReporter, ImportReporter};
pub use runner::{run_import, RunMode, RunState, Runner, RunnerOptions};

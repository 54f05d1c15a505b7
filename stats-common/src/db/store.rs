//! Storage collaborator contract
//!
//! Importers and the runner only talk to the output through this trait, so
//! the same pipeline can write a live SQLite database or a static catalog.

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::db::models::{ImportStatus, Observation, Triple};
use crate::Result;

/// Predicate used to find nodes of a given type
pub const TYPE_OF: &str = "typeOf";

/// Predicate holding a node's display name
pub const NAME: &str = "name";

/// Output store for one import run
///
/// Inserts have append semantics and may be called any number of times.
/// Nothing is durable until [`Store::commit_and_close`] returns.
#[async_trait]
pub trait Store: Send + Sync {
    /// Drop data left by a previous run (import history is kept) and drop
    /// secondary indexes ahead of bulk writes
    async fn maybe_clear_before_import(&self) -> Result<()>;

    async fn insert_triples(&self, triples: &[Triple]) -> Result<()>;

    async fn insert_observations(&self, observations: &[Observation]) -> Result<()>;

    /// Insert or replace a key/value entry
    async fn insert_key_value(&self, key: &str, value: &str) -> Result<()>;

    /// Record the outcome of this import in the import history
    async fn insert_import_info(&self, status: ImportStatus) -> Result<()>;

    /// All triples whose subject has `typeOf <subject_type>`, in insertion order
    async fn select_triples_by_subject_type(&self, subject_type: &str) -> Result<Vec<Triple>>;

    /// Display names (`name` values) for the given dcids, where known
    async fn select_entity_names(&self, dcids: &[String]) -> Result<BTreeMap<String, String>>;

    /// Rebuild indexes, make everything durable and release the store
    async fn commit_and_close(&self) -> Result<()>;
}

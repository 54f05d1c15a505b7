//! Storage collaborator: models, schema and store implementations

pub mod catalog;
pub mod init;
pub mod migrations;
pub mod models;
pub mod sqlite;
pub mod store;

pub use catalog::CatalogStore;
pub use init::init_database;
pub use sqlite::SqliteStore;
pub use store::{Store, NAME, TYPE_OF};

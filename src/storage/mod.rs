//! Storage module for durable crawl state
//!
//! The frontier queue and the document id registry each live in their own ordered
//! key-value store. This module provides the store contract and its SQLite backend.

mod schema;
mod sqlite;
mod traits;

pub use schema::{get_schema_version, initialize_schema, SCHEMA_VERSION};
pub use sqlite::SqliteStore;
pub use traits::{OrderedStore, StorageError, StorageResult};

use std::path::Path;

/// Opens or creates an ordered store backed by the SQLite file at `path`
pub fn open_store(path: &Path) -> StorageResult<SqliteStore> {
    SqliteStore::open(path)
}

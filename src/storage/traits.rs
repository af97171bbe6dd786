//! Storage traits and error types
//!
//! This module defines the ordered key-value contract shared by the frontier queue
//! and the document id registry, and the errors it can report.

use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Store is closed")]
    Closed,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Corrupt entry: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// A durable map from byte keys to byte values iterated in ascending key order
///
/// Keys compare as unsigned byte strings. Callers serialize access themselves, so
/// implementations only need to be `Send`.
pub trait OrderedStore: Send {
    /// Inserts or replaces the value under `key`
    fn put(&mut self, key: &[u8], value: &[u8]) -> StorageResult<()>;

    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Removes `key`; removing a missing key is not an error
    fn delete(&mut self, key: &[u8]) -> StorageResult<()>;

    /// Returns up to `limit` entries with the smallest keys, in ascending order
    fn cursor(&self, limit: usize) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>>;

    fn count(&self) -> StorageResult<u64>;

    /// Flushes pending writes to durable storage
    fn sync(&mut self) -> StorageResult<()>;

    /// Releases the underlying resources; later calls fail with [`StorageError::Closed`]
    fn close(&mut self) -> StorageResult<()>;
}

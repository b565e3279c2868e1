//! Persistence collaborator: an opaque async key-value store.
//!
//! Keys are plain strings, values are JSON text (or raw strings for scalar
//! entries such as the auth token). The chat core only ever goes through
//! [`StorageService`], which logs failures instead of propagating them.

pub mod keys;
pub mod memory;
pub mod service;
pub mod sqlite;

pub use memory::MemoryKeyValueStore;
pub use service::StorageService;
pub use sqlite::SqliteKeyValueStore;

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

/// Boxed future type for store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors raised by key-value store backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// `SQLite` storage error (sync).
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// `SQLite` storage error (async).
    #[error("tokio-rusqlite error: {0}")]
    TokioSqlite(#[from] tokio_rusqlite::Error),
    /// Value could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Backend refused the operation.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Convenience result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Async string-to-string store.
pub trait KeyValueStore: Send + Sync {
    /// Read a value.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be read.
    fn get(&self, key: &str) -> StoreFuture<'_, StorageResult<Option<String>>>;

    /// Insert or overwrite a value.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be written.
    fn set(&self, key: &str, value: String) -> StoreFuture<'_, StorageResult<()>>;

    /// Delete a value; deleting a missing key is not an error.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be written.
    fn remove(&self, key: &str) -> StoreFuture<'_, StorageResult<()>>;

    /// Delete every value.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be written.
    fn clear(&self) -> StoreFuture<'_, StorageResult<()>>;
}

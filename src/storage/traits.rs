//! Storage traits and error types
//!
//! This module defines the trait interface for mirror storage backends and
//! associated error types.

use crate::storage::CacheRecord;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid mirror root: {0}")]
    InvalidRoot(String),

    #[error("No live record for {0}")]
    MissingRecord(String),

    #[error("Publishing the new generation failed: {0}")]
    Publish(String),
}

impl StorageError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for mirror storage backends
///
/// A backend holds two generations: the live one published by the previous
/// run, read-only for the whole run, and the staged one being built. Writes
/// only ever target the staged generation; [`Store::publish`] replaces the
/// live generation with it in one step.
pub trait Store: Send + Sync {
    // ===== Live Generation =====

    /// Returns the live record for a path, if one exists
    fn live_record(&self, path: &str) -> StorageResult<Option<CacheRecord>>;

    /// Lists the site paths of every live record
    fn live_paths(&self) -> StorageResult<Vec<String>>;

    // ===== Staged Generation =====

    /// Carries the live record for a path into the staged generation unchanged,
    /// keeping its original fetch timestamp and query sidecar
    fn carry_forward(&self, path: &str) -> StorageResult<()>;

    /// Writes a freshly fetched resource into the staged generation
    ///
    /// # Arguments
    ///
    /// * `path` - The canonical site path
    /// * `bytes` - The (rewritten) resource content
    /// * `fetched_at` - When the resource was fetched
    /// * `query` - The query string to remember, for query-versioned resources
    fn write_staged(
        &self,
        path: &str,
        bytes: &[u8],
        fetched_at: DateTime<Utc>,
        query: Option<&str>,
    ) -> StorageResult<()>;

    // ===== Publishing =====

    /// Promotes the staged generation to be the live one
    fn publish(&self) -> StorageResult<()>;
}

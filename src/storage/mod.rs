//! Storage module for persisting mirror generations
//!
//! This module handles everything written to disk, including:
//! - The file layout of a generation (resource files plus sidecars)
//! - Reading live records from the previous run
//! - Staging the new generation and publishing it atomically
//! - Recovering from a run interrupted mid-publish

mod fs;
pub mod layout;
mod traits;

pub use fs::FsStore;
pub use traits::{Store, StorageError, StorageResult};

use chrono::{DateTime, Utc};

/// A cached resource with its sidecar facts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRecord {
    /// The stored (already rewritten) resource content
    pub bytes: Vec<u8>,

    /// When the resource was last fetched from the remote site
    pub fetched_at: DateTime<Utc>,

    /// The query string last seen for a query-versioned resource
    pub query: Option<String>,
}

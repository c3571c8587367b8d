//! Sumi-Mirror: an incremental static mirror of a content-managed site
//!
//! This crate crawls a remote site, rewrites intra-site links for the chosen
//! serving mode and publishes the result as a new generation of a local file
//! tree, reusing cached resources that did not change since the last run.

pub mod config;
pub mod crawler;
pub mod index;
pub mod output;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Sumi-Mirror operations
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("HTTP status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Malformed listing from {url}: {source}")]
    Json {
        url: String,
        source: serde_json::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Unknown link relation type '{rel}' in {path}; extend rel-allow or rel-deny")]
    UnknownRelation { rel: String, path: String },

    #[error("Listing links to a resource outside the known origins: {link}")]
    UnlistedOrigin { link: String },

    #[error("Failed to process {route}: {source}")]
    RouteFailed {
        route: String,
        source: Box<MirrorError>,
    },

    #[error("Crawl worker panicked: {0}")]
    WorkerPanic(String),
}

impl MirrorError {
    /// Returns true if this error must abort the whole run regardless of mode
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::UnknownRelation { .. } | Self::UnlistedOrigin { .. } => true,
            Self::RouteFailed { source, .. } => source.is_fatal(),
            _ => false,
        }
    }
}

impl From<crawler::RewriteError> for MirrorError {
    fn from(err: crawler::RewriteError) -> Self {
        match err {
            crawler::RewriteError::UnknownRelation { rel, path } => {
                Self::UnknownRelation { rel, path }
            }
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid hostname: {0}")]
    InvalidHostname(String),
}

/// Result type alias for Sumi-Mirror operations
pub type Result<T> = std::result::Result<T, MirrorError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{mirror, Coordinator};
pub use output::RunSummary;
pub use state::RunContext;
pub use url::{normalize_link, NormalizedLink, Route};

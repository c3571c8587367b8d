//! Crawler module for mirroring the remote site
//!
//! This module contains the core mirroring logic, including:
//! - HTTP fetching with retries and a shared request spacing
//! - Reference scanning and link rewriting over document text
//! - Redownload decisions against the previous generation
//! - The frontier and the worker pool draining it
//! - Overall run coordination

mod cache;
mod coordinator;
pub mod extractor;
mod fetcher;
mod frontier;
pub mod policy;
mod rewriter;

pub use cache::{CacheLookup, CacheStore};
pub use coordinator::Coordinator;
pub use extractor::{LinkExtractor, LinkPatterns, Reference, ReferenceKind};
pub use fetcher::{build_http_client, Fetcher, RawResponse};
pub use frontier::Frontier;
pub use policy::{Decision, RedownloadPolicy};
pub use rewriter::{LinkRewriter, RewriteError, RewriteRules};

use crate::config::Config;
use crate::output::RunSummary;
use crate::Result;

/// Runs a complete mirror operation
///
/// This is the main entry point for a run. It will:
/// 1. Open the output root and recover from interrupted runs
/// 2. Build the modification index from the remote listings
/// 3. Crawl from the entry routes, reusing unchanged resources
/// 4. Rewrite fetched documents for the output mode
/// 5. Publish the staged generation
///
/// # Arguments
///
/// * `config` - The validated run configuration
///
/// # Returns
///
/// * `Ok(RunSummary)` - The run completed and was published
/// * `Err(MirrorError)` - The run aborted; the live generation is untouched
pub async fn mirror(config: Config) -> Result<RunSummary> {
    Coordinator::new(config).await?.run().await
}

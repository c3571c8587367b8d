//! Run summary reporting
//!
//! This module collects the totals of a finished run and prints them.

use crate::state::RouteFailure;
use std::time::Duration;

/// Totals of one mirror run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Routes fetched from the remote site (probes included)
    pub fetched: usize,

    /// Routes carried forward from the live generation
    pub reused: usize,

    /// Distinct paths processed
    pub visited: usize,

    /// HTTP requests sent, listings and retries included
    pub requests: usize,

    /// Whether a shared layout change forced every document to refetch
    pub cascade_fired: bool,

    /// Routes that failed; absent from the new generation
    pub failures: Vec<RouteFailure>,

    /// Live paths not carried into the new generation
    pub removed: Vec<String>,

    /// Wall time of the run
    pub elapsed: Duration,
}

impl RunSummary {
    /// Returns true if any route failed
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Prints the summary to stdout in a formatted manner
///
/// # Arguments
///
/// * `summary` - The summary to display
pub fn print_summary(summary: &RunSummary) {
    println!("=== Mirror Summary ===\n");

    println!("Overview:");
    println!("  Paths processed: {}", summary.visited);
    println!("  Fetched: {}", summary.fetched);
    println!("  Reused from cache: {}", summary.reused);
    println!("  HTTP requests: {}", summary.requests);
    println!("  Elapsed: {:.1}s", summary.elapsed.as_secs_f64());
    println!(
        "  Layout cascade: {}",
        if summary.cascade_fired {
            "fired (all documents refetched)"
        } else {
            "not fired"
        }
    );
    println!();

    if !summary.removed.is_empty() {
        println!("Removed Since Last Run ({}):", summary.removed.len());
        for path in &summary.removed {
            println!("  - {}", path);
        }
        println!();
    }

    if summary.has_failures() {
        println!("Failures ({}):", summary.failures.len());
        for failure in &summary.failures {
            println!(
                "  - {} (from '{}', linked from '{}'): {}",
                failure.path, failure.original, failure.referrer, failure.error
            );
        }
    } else {
        println!("No failures.");
    }
}

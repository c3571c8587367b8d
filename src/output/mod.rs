//! Output module for reporting mirror runs
//!
//! This module handles:
//! - Collecting the totals of a run into a [`RunSummary`]
//! - Printing the summary at the end of a run

mod summary;

pub use summary::{print_summary, RunSummary};

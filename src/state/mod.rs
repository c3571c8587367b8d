//! State module for tracking mirror run progress
//!
//! This module provides state management for routes and the run as a whole.
//!
//! # Components
//!
//! - `RouteState`: How each processed route ended up (fetched, reused, probed, failed)
//! - `RunContext`: Run-wide state shared by all workers, including the
//!   layout-change cascade flag and the probe that sets it

mod route_state;
mod run_context;

// Re-export main types
pub use route_state::RouteState;
pub use run_context::{ProbeGuard, ProbeState, RouteFailure, RunContext};

//! Run-wide state shared by every route worker
//!
//! The layout-change cascade flag is the one piece of mutable state that
//! changes the redownload decision for other routes. It is only ever set by
//! the probe, and every worker that is about to decide on a document route
//! waits until an in-flight probe has resolved before reading it.

use crate::state::RouteState;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::watch;

/// Lifecycle of the single layout probe of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    /// No document has been probed yet
    Unclaimed,
    /// A worker is fetching and comparing the probe document
    InProgress,
    /// The probe finished; the cascade flag is final
    Resolved,
}

/// A route that failed, with the context needed to chase it down
#[derive(Debug, Clone)]
pub struct RouteFailure {
    pub path: String,
    pub original: String,
    pub referrer: String,
    pub error: String,
}

/// Shared state of one mirror run
#[derive(Debug)]
pub struct RunContext {
    cascade: AtomicBool,
    probe: watch::Sender<ProbeState>,
    fetched: AtomicUsize,
    reused: AtomicUsize,
    failures: Mutex<Vec<RouteFailure>>,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RunContext {
    pub fn new() -> Self {
        let (probe, _) = watch::channel(ProbeState::Unclaimed);
        Self {
            cascade: AtomicBool::new(false),
            probe,
            fetched: AtomicUsize::new(0),
            reused: AtomicUsize::new(0),
            failures: Mutex::new(Vec::new()),
        }
    }

    // ===== Cascade Flag =====

    /// Returns true once a shared layout change was detected in this run
    pub fn cascade_fired(&self) -> bool {
        self.cascade.load(Ordering::Acquire)
    }

    /// Marks every cached document of this run as stale
    pub fn fire_cascade(&self) {
        self.cascade.store(true, Ordering::Release);
    }

    // ===== Layout Probe =====

    /// Returns the current probe state
    pub fn probe_state(&self) -> ProbeState {
        *self.probe.borrow()
    }

    /// Claims the probe for the calling route, if nobody has claimed it yet
    ///
    /// The returned guard must be resolved with the comparison result; if it
    /// is dropped unresolved (the probe fetch failed), the probe becomes
    /// claimable again for the next eligible document.
    pub fn try_claim_probe(&self) -> Option<ProbeGuard<'_>> {
        let claimed = self.probe.send_if_modified(|state| {
            if *state == ProbeState::Unclaimed {
                *state = ProbeState::InProgress;
                true
            } else {
                false
            }
        });

        // The guard resets the state on drop, so only a winning claim may build one
        claimed.then(|| ProbeGuard {
            context: self,
            resolved: false,
        })
    }

    /// Waits until no probe is in flight
    pub async fn probe_settled(&self) {
        let mut rx = self.probe.subscribe();
        // The sender lives in self, so the channel cannot close while waiting
        let _ = rx.wait_for(|state| *state != ProbeState::InProgress).await;
    }

    // ===== Counters =====

    /// Records the final state of a processed route
    pub fn record(&self, state: RouteState) {
        if state.was_fetched() {
            self.fetched.fetch_add(1, Ordering::Relaxed);
        } else if state == RouteState::Reused {
            self.reused.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records a failed route
    pub fn record_failure(&self, failure: RouteFailure) {
        let mut failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
        failures.push(failure);
    }

    /// Number of resources requested from the remote site
    pub fn fetch_count(&self) -> usize {
        self.fetched.load(Ordering::Relaxed)
    }

    /// Number of live records carried forward without a request
    pub fn reuse_count(&self) -> usize {
        self.reused.load(Ordering::Relaxed)
    }

    /// Returns every failure recorded so far
    pub fn failures(&self) -> Vec<RouteFailure> {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Exclusive right to run the layout probe
#[derive(Debug)]
pub struct ProbeGuard<'a> {
    context: &'a RunContext,
    resolved: bool,
}

impl ProbeGuard<'_> {
    /// Publishes the probe result; a changed layout fires the cascade first
    pub fn resolve(mut self, changed: bool) {
        if changed {
            self.context.fire_cascade();
        }
        self.context.probe.send_replace(ProbeState::Resolved);
        self.resolved = true;
    }
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if !self.resolved {
            tracing::warn!("Layout probe did not complete; the next cached document will probe");
            self.context.probe.send_replace(ProbeState::Unclaimed);
        }
    }
}

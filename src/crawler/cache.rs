//! Fetch-or-reuse for one route
//!
//! Combines the live generation, the redownload policy and the fetcher.
//! Every byte written goes to the staging area; the live generation is only
//! ever read (or hard-linked from) during a run.

use crate::crawler::policy::{Decision, RedownloadPolicy};
use crate::crawler::Fetcher;
use crate::state::{ProbeGuard, ProbeState, RunContext};
use crate::storage::Store;
use crate::url::{ResourceKind, Route};
use crate::Result;
use chrono::Utc;
use std::sync::Arc;

/// Result of [`CacheStore::get`]
#[derive(Debug)]
pub enum CacheLookup<'a> {
    /// The live record was carried into the staging area unchanged
    Reused { bytes: Vec<u8> },

    /// Freshly fetched, not yet rewritten or staged
    Fetched { bytes: Vec<u8> },

    /// The layout probe: freshly fetched bytes to compare, once rewritten,
    /// against the cached bytes
    Probe {
        bytes: Vec<u8>,
        previous: Vec<u8>,
        guard: ProbeGuard<'a>,
    },
}

/// Cache of the previous generation in front of the remote site
pub struct CacheStore {
    store: Arc<dyn Store>,
    fetcher: Arc<Fetcher>,
    policy: RedownloadPolicy,
}

impl CacheStore {
    pub fn new(store: Arc<dyn Store>, fetcher: Arc<Fetcher>, policy: RedownloadPolicy) -> Self {
        Self {
            store,
            fetcher,
            policy,
        }
    }

    /// Returns the bytes for a route, fetching them only when needed
    ///
    /// A reused record is carried forward into the staging area before
    /// returning. Fetched bytes are not staged; the caller rewrites them and
    /// calls [`CacheStore::put`].
    pub async fn get<'c>(&self, route: &Route, context: &'c RunContext) -> Result<CacheLookup<'c>> {
        let Some(record) = self.store.live_record(&route.path)? else {
            tracing::debug!("{} is not cached; fetching", route.path);
            let bytes = self.fetcher.fetch(&route.path).await?;
            return Ok(CacheLookup::Fetched { bytes });
        };

        let is_document = route.kind() == ResourceKind::Document;
        let mut rechecked = false;
        loop {
            // The cascade flag is only final once no probe is in flight
            if is_document && context.probe_state() == ProbeState::InProgress {
                context.probe_settled().await;
            }

            let decision = self.policy.decide(route, &record, context);
            tracing::debug!("{}: {}", route.path, decision);

            match decision {
                Decision::Reuse(reason) if is_document && reason.is_probe_eligible() => {
                    if let Some(guard) = context.try_claim_probe() {
                        tracing::info!("Probing {} for a shared layout change", route.path);
                        let bytes = self.fetcher.fetch(&route.path).await?;
                        return Ok(CacheLookup::Probe {
                            bytes,
                            previous: record.bytes,
                            guard,
                        });
                    }
                    // Another worker claimed the probe first. It may have fired the
                    // cascade since this decision, so decide once more after it resolves.
                    let state = context.probe_state();
                    if state != ProbeState::Resolved || !rechecked {
                        rechecked = state == ProbeState::Resolved;
                        continue;
                    }
                    self.store.carry_forward(&route.path)?;
                    return Ok(CacheLookup::Reused {
                        bytes: record.bytes,
                    });
                }
                Decision::Reuse(_) => {
                    self.store.carry_forward(&route.path)?;
                    return Ok(CacheLookup::Reused {
                        bytes: record.bytes,
                    });
                }
                Decision::Redownload(_) => {
                    let bytes = self.fetcher.fetch(&route.path).await?;
                    return Ok(CacheLookup::Fetched { bytes });
                }
            }
        }
    }

    /// Stages the final bytes of a route
    ///
    /// # Arguments
    ///
    /// * `route` - The route the bytes belong to
    /// * `bytes` - The rewritten (or opaque) resource content
    /// * `fetched` - `true` for fresh bytes, stamped now; `false` carries the
    ///   live record forward with its original stamp instead
    pub fn put(&self, route: &Route, bytes: &[u8], fetched: bool) -> Result<()> {
        if !fetched {
            self.store.carry_forward(&route.path)?;
            return Ok(());
        }

        let query = route
            .kind()
            .is_query_versioned()
            .then_some(route.query.as_str());
        self.store
            .write_staged(&route.path, bytes, Utc::now(), query)?;
        Ok(())
    }
}

//! Redownload decisions for cached resources
//!
//! # Decision Table
//!
//! Evaluated in order for a route with a live record; the first match wins:
//!
//! | # | Condition | Decision |
//! |---|-----------|----------|
//! | 1 | The not-found page | Reuse |
//! | 2 | Under the restricted prefix | Reuse |
//! | 3 | Font | Reuse |
//! | 4 | Script or stylesheet | Redownload iff the query changed |
//! | 5 | In the always-redownload set | Redownload |
//! | 6 | Document, and the cascade fired | Redownload |
//! | 7 | Anything else | Redownload iff unindexed or modified since the fetch |

use crate::config::PolicyConfig;
use crate::index::ModificationIndex;
use crate::state::RunContext;
use crate::storage::CacheRecord;
use crate::url::{ResourceKind, Route};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Why a live record may be carried forward
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReuseReason {
    NotFoundPage,
    Restricted,
    Font,
    SameQuery,
    UpToDate,
}

impl ReuseReason {
    /// Returns true if a document reused for this reason may serve as the
    /// layout probe
    ///
    /// Restricted pages are session dependent, so a byte difference there
    /// says nothing about the shared layout.
    pub fn is_probe_eligible(&self) -> bool {
        matches!(self, Self::NotFoundPage | Self::UpToDate)
    }
}

/// Why a live record must be replaced by a fresh fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedownloadReason {
    QueryChanged,
    AlwaysRedownload,
    Cascade,
    NotIndexed,
    Modified,
}

/// Outcome of the decision table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Reuse(ReuseReason),
    Redownload(RedownloadReason),
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reuse(reason) => write!(f, "reuse ({:?})", reason),
            Self::Redownload(reason) => write!(f, "redownload ({:?})", reason),
        }
    }
}

/// The redownload decision table of one run
#[derive(Debug, Clone)]
pub struct RedownloadPolicy {
    not_found_path: String,
    restricted_prefix: String,
    always: HashSet<String>,
    index: Arc<ModificationIndex>,
}

impl RedownloadPolicy {
    pub fn new(config: &PolicyConfig, index: Arc<ModificationIndex>) -> Self {
        Self {
            not_found_path: config.not_found_path.clone(),
            restricted_prefix: config.restricted_prefix.trim_end_matches('/').to_string(),
            always: config.always_redownload.iter().cloned().collect(),
            index,
        }
    }

    /// Decides whether the live record of `route` can be carried forward
    ///
    /// # Arguments
    ///
    /// * `route` - The route being processed (its query matters for rule 4)
    /// * `record` - The live record of the route's path
    /// * `context` - Run state; rule 6 reads the cascade flag from it
    pub fn decide(&self, route: &Route, record: &CacheRecord, context: &RunContext) -> Decision {
        let path = route.path.as_str();
        let kind = route.kind();

        if path == self.not_found_path {
            return Decision::Reuse(ReuseReason::NotFoundPage);
        }
        if self.is_restricted(path) {
            return Decision::Reuse(ReuseReason::Restricted);
        }
        if kind == ResourceKind::Font {
            return Decision::Reuse(ReuseReason::Font);
        }
        if kind.is_query_versioned() {
            let cached = record.query.as_deref().unwrap_or("");
            return if cached == route.query {
                Decision::Reuse(ReuseReason::SameQuery)
            } else {
                Decision::Redownload(RedownloadReason::QueryChanged)
            };
        }
        if self.always.contains(path) {
            return Decision::Redownload(RedownloadReason::AlwaysRedownload);
        }
        if kind == ResourceKind::Document && context.cascade_fired() {
            return Decision::Redownload(RedownloadReason::Cascade);
        }

        match self.index.get(path) {
            None => {
                tracing::warn!("{} is not in the modification index; redownloading", path);
                Decision::Redownload(RedownloadReason::NotIndexed)
            }
            Some(modified) if modified > record.fetched_at => {
                Decision::Redownload(RedownloadReason::Modified)
            }
            Some(_) => Decision::Reuse(ReuseReason::UpToDate),
        }
    }

    /// Returns true if the route must be fetched again
    pub fn should_redownload(
        &self,
        route: &Route,
        record: &CacheRecord,
        context: &RunContext,
    ) -> bool {
        matches!(self.decide(route, record, context), Decision::Redownload(_))
    }

    fn is_restricted(&self, path: &str) -> bool {
        path.strip_prefix(&self.restricted_prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    }
}

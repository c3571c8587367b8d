/// Route state definitions for tracking what happened to each route
///
/// This module defines the possible results of processing one route.
use std::fmt;

/// Represents how a processed route ended up in the new generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteState {
    // ===== Success States =====
    /// Fetched from the remote site, rewritten and staged
    Fetched,

    /// Live record carried into the new generation unchanged
    Reused,

    /// Probed for a layout change; the fresh copy matched the cached one
    ProbeUnchanged,

    /// Probed for a layout change; the fresh copy differed and was staged
    ProbeChanged,

    // ===== Error States =====
    /// Processing failed; the route is absent from the new generation
    Failed,
}

impl RouteState {
    /// Returns true if the remote site was asked for the resource
    pub fn was_fetched(&self) -> bool {
        matches!(
            self,
            Self::Fetched | Self::ProbeUnchanged | Self::ProbeChanged
        )
    }

    /// Returns a short lowercase label for logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetched => "fetched",
            Self::Reused => "reused",
            Self::ProbeUnchanged => "probe_unchanged",
            Self::ProbeChanged => "probe_changed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RouteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

//! URL handling module for Sumi-Mirror
//!
//! This module provides link normalization against known origins, the
//! [`Route`] unit of crawl work and resource classification by path.

mod normalize;

use std::fmt;
use std::hash::{Hash, Hasher};

// Re-export main functions
pub use normalize::{normalize_link, origin_prefixes, NormalizedLink, PathNormalizer};

/// Name of the index document a directory-style path is stored under
pub const INDEX_DOCUMENT: &str = "index.html";

/// A discovered path to visit, with its provenance
///
/// Two routes are equal iff their paths are equal; the same path found twice
/// with different queries is the same unit of crawl work.
#[derive(Debug, Clone)]
pub struct Route {
    /// Canonical absolute site path
    pub path: String,

    /// The reference text as it appeared in the source document
    pub original: String,

    /// Path of the document that contained the reference
    pub referrer: String,

    /// Query and fragment suffix, e.g. "?ver=6.4"
    pub query: String,
}

impl Route {
    /// Creates a route for a configured entry point
    pub fn seed(path: &str) -> Self {
        Self {
            path: path.to_string(),
            original: path.to_string(),
            referrer: "entry route".to_string(),
            query: String::new(),
        }
    }

    /// Creates a route from a normalized reference found in `referrer`
    pub fn discovered(link: NormalizedLink, original: &str, referrer: &str) -> Self {
        Self {
            path: link.path,
            original: original.to_string(),
            referrer: referrer.to_string(),
            query: link.query,
        }
    }

    /// Returns the kind of resource this route addresses
    pub fn kind(&self) -> ResourceKind {
        ResourceKind::of(&self.path)
    }
}

impl PartialEq for Route {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for Route {}

impl Hash for Route {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' (from '{}'), linked from '{}'",
            self.path, self.original, self.referrer
        )
    }
}

/// Resource classes with distinct caching rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// A rendered page: no extension, or `.html`
    Document,
    /// Version-stamped through its query string
    Script,
    /// Version-stamped through its query string
    Stylesheet,
    /// Immutable by convention
    Font,
    /// Anything else (images, documents, feeds of bytes)
    Other,
}

impl ResourceKind {
    /// Classifies a canonical path by the extension of its last segment
    ///
    /// # Examples
    ///
    /// ```
    /// use sumi_mirror::url::ResourceKind;
    ///
    /// assert_eq!(ResourceKind::of("/about"), ResourceKind::Document);
    /// assert_eq!(ResourceKind::of("/theme/app.js"), ResourceKind::Script);
    /// assert_eq!(ResourceKind::of("/fonts/a.woff2"), ResourceKind::Font);
    /// ```
    pub fn of(path: &str) -> Self {
        match extension(path).map(|ext| ext.to_ascii_lowercase()).as_deref() {
            None | Some("html") | Some("htm") => Self::Document,
            Some("js") | Some("mjs") => Self::Script,
            Some("css") => Self::Stylesheet,
            Some("woff") | Some("woff2") | Some("ttf") | Some("otf") | Some("eot") => Self::Font,
            Some(_) => Self::Other,
        }
    }

    /// Returns true for resources whose version lives in the query string
    pub fn is_query_versioned(&self) -> bool {
        matches!(self, Self::Script | Self::Stylesheet)
    }
}

/// Returns the extension of the last path segment, if any
pub fn extension(path: &str) -> Option<&str> {
    let last = path.rsplit('/').next().unwrap_or(path);
    last.rsplit_once('.').map(|(_, ext)| ext)
}

/// Returns true if the path is stored as a directory with an index document
pub fn is_directory_style(path: &str) -> bool {
    !path.rsplit('/').next().unwrap_or(path).contains('.')
}

use crate::url::INDEX_DOCUMENT;

/// Path segments marking endpoints that are never mirrored
const EXCLUDED_SEGMENTS: &[&str] = &[
    // REST API
    "wp-json",
    // Syndication feeds
    "feed",
];

/// Segment prefix of the XML-RPC endpoint
const XMLRPC_SEGMENT: &str = "xmlrpc";

/// A reference reduced to its canonical site path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedLink {
    /// Canonical absolute path: no query, no fragment, no trailing slash except root
    pub path: String,

    /// Query and fragment split off the reference, e.g. "?ver=2#top"
    pub query: String,
}

/// Normalizes raw references against the site's known origins
///
/// Holds the origin prefixes once so every scanner and the index share the
/// same notion of "internal".
#[derive(Debug, Clone)]
pub struct PathNormalizer {
    prefixes: Vec<String>,
}

impl PathNormalizer {
    /// Creates a normalizer stripping every origin form of the given hostnames
    pub fn new(hostnames: &[String]) -> Self {
        Self {
            prefixes: origin_prefixes(hostnames),
        }
    }

    /// Adds an extra prefix (such as the `file://` root of an offline mirror)
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefixes.push(prefix.into());
        // Longest first so "https://h" wins over "//h" style prefixes
        self.prefixes.sort_by_key(|p| std::cmp::Reverse(p.len()));
        self
    }

    /// Normalizes `raw` as found in the document at `base`
    pub fn normalize(&self, base: &str, raw: &str) -> Option<NormalizedLink> {
        normalize_link(base, raw, &self.prefixes)
    }

    /// Returns true if the absolute link belongs to one of the known origins
    pub fn is_known_origin(&self, link: &str) -> bool {
        strip_prefix(link, &self.prefixes).is_some()
    }
}

/// Builds the strip prefixes for every hostname the site is reachable under
///
/// Longer prefixes come first.
pub fn origin_prefixes(hostnames: &[String]) -> Vec<String> {
    let mut prefixes: Vec<String> = hostnames
        .iter()
        .flat_map(|host| {
            let host = host.to_ascii_lowercase();
            [
                format!("https://{}", host),
                format!("http://{}", host),
                format!("//{}", host),
            ]
        })
        .collect();
    prefixes.sort_by_key(|p| std::cmp::Reverse(p.len()));
    prefixes.dedup();
    prefixes
}

/// Normalizes a raw reference into a canonical site path
///
/// # Normalization Steps
///
/// 1. Reject references that are empty as written
/// 2. Strip a known origin prefix
/// 3. Reject protocol-relative references to other hosts
/// 4. Split off fragment and query into the query suffix
/// 5. Map an origin-only reference to `/`; a query- or fragment-only
///    reference addresses the current document and is rejected
/// 6. Reject external and special references: anything with a `:` left
///    (schemes, `mailto:`, inline SVG markup), XML-RPC, REST and feeds
/// 7. Resolve `.` and `..` against the directory of `base`, never above root
/// 8. Drop a trailing index document
///
/// # Examples
///
/// ```
/// use sumi_mirror::url::{normalize_link, origin_prefixes};
///
/// let prefixes = origin_prefixes(&["example.org".to_string()]);
/// let link = normalize_link("/", "https://example.org/about/?x=1", &prefixes).unwrap();
/// assert_eq!(link.path, "/about");
/// assert_eq!(link.query, "?x=1");
/// ```
pub fn normalize_link(base: &str, raw: &str, prefixes: &[String]) -> Option<NormalizedLink> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let (mut link, stripped) = match strip_prefix(raw, prefixes) {
        Some(rest) => (rest, true),
        None => (raw, false),
    };

    if link.starts_with("//") {
        return None;
    }

    let mut query = String::new();
    if let Some(loc) = link.find('#') {
        query = link[loc..].to_string();
        link = &link[..loc];
    }
    if let Some(loc) = link.find('?') {
        query = format!("{}{}", &link[loc..], query);
        link = &link[..loc];
    }

    if link.is_empty() {
        if !stripped {
            return None;
        }
        link = "/";
    }

    if link.contains(':') {
        return None;
    }

    let path = if link.starts_with('/') {
        resolve_segments(&[], link)
    } else {
        resolve_segments(&base_directory(base), link)
    };

    if is_excluded(&path) {
        return None;
    }

    Some(NormalizedLink { path, query })
}

/// Strips the first matching prefix, requiring it to end at a path boundary
fn strip_prefix<'a>(link: &'a str, prefixes: &[String]) -> Option<&'a str> {
    prefixes.iter().find_map(|prefix| {
        let head = link.get(..prefix.len())?;
        if !head.eq_ignore_ascii_case(prefix) {
            return None;
        }
        let rest = &link[prefix.len()..];
        match rest.chars().next() {
            None | Some('/') | Some('?') | Some('#') => Some(rest),
            _ => None,
        }
    })
}

/// Returns the directory segments relative references in `base` resolve against
///
/// Document paths are stored as `<path>/index.html`, so they are directories
/// themselves; files resolve against their parent.
fn base_directory(base: &str) -> Vec<&str> {
    let mut segments: Vec<&str> = base.split('/').filter(|s| !s.is_empty()).collect();
    if segments.last().is_some_and(|last| last.contains('.')) {
        segments.pop();
    }
    segments
}

/// Resolves `path` against `base` segments, removing dot segments
fn resolve_segments(base: &[&str], path: &str) -> String {
    let mut normalized_segments: Vec<&str> = base.to_vec();

    for segment in path.split('/') {
        match segment {
            // Skip empty segments (from multiple slashes) and current directory markers
            "" | "." => continue,
            // Parent directory - never climbs above the root
            ".." => {
                normalized_segments.pop();
            }
            _ => normalized_segments.push(segment),
        }
    }

    if normalized_segments.last() == Some(&INDEX_DOCUMENT) {
        normalized_segments.pop();
    }

    if normalized_segments.is_empty() {
        return "/".to_string();
    }

    format!("/{}", normalized_segments.join("/"))
}

fn is_excluded(path: &str) -> bool {
    path.split('/').any(|segment| {
        EXCLUDED_SEGMENTS.contains(&segment) || segment.starts_with(XMLRPC_SEGMENT)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefixes() -> Vec<String> {
        origin_prefixes(&["dev.example.org".to_string(), "example.org".to_string()])
    }

    fn norm(base: &str, raw: &str) -> Option<NormalizedLink> {
        normalize_link(base, raw, &prefixes())
    }

    fn path(base: &str, raw: &str) -> Option<String> {
        norm(base, raw).map(|l| l.path)
    }

    #[test]
    fn test_strip_every_known_origin() {
        assert_eq!(path("/", "https://dev.example.org/a/b/"), Some("/a/b".into()));
        assert_eq!(path("/", "http://example.org/a"), Some("/a".into()));
        assert_eq!(path("/", "//example.org/a"), Some("/a".into()));
        assert_eq!(path("/", "HTTPS://Example.org/a"), Some("/a".into()));
    }

    #[test]
    fn test_origin_only_becomes_root() {
        assert_eq!(path("/x", "https://example.org"), Some("/".into()));
        assert_eq!(path("/x", "https://example.org/"), Some("/".into()));
        let link = norm("/x", "https://example.org?p=1").unwrap();
        assert_eq!(link.path, "/");
        assert_eq!(link.query, "?p=1");
    }

    #[test]
    fn test_prefix_must_end_at_boundary() {
        // example.org.evil.com is not example.org
        assert_eq!(path("/", "https://example.org.evil.com/a"), None);
    }

    #[test]
    fn test_empty_reference_rejected() {
        assert_eq!(norm("/", ""), None);
        assert_eq!(norm("/", "   "), None);
    }

    #[test]
    fn test_fragment_and_query_only_rejected() {
        assert_eq!(norm("/about", "#top"), None);
        assert_eq!(norm("/about", "?page=2"), None);
    }

    #[test]
    fn test_query_and_fragment_split() {
        let link = norm("/", "/style.css?ver=6.4#x").unwrap();
        assert_eq!(link.path, "/style.css");
        assert_eq!(link.query, "?ver=6.4#x");

        let link = norm("/", "/page#frag").unwrap();
        assert_eq!(link.path, "/page");
        assert_eq!(link.query, "#frag");
    }

    #[test]
    fn test_reject_external_and_special() {
        assert_eq!(norm("/", "https://other.com/page"), None);
        assert_eq!(norm("/", "mailto:board@example.org"), None);
        assert_eq!(norm("/", "tel:+31123"), None);
        assert_eq!(norm("/", "data:image/svg+xml;utf8,<svg></svg>"), None);
        assert_eq!(norm("/", "//cdn.other.com/lib.js"), None);
        assert_eq!(norm("/", "/xmlrpc.php?rsd"), None);
        assert_eq!(norm("/", "https://example.org/wp-json/wp/v2/pages"), None);
        assert_eq!(norm("/", "/news/feed/"), None);
        assert_eq!(norm("/", "/comments/feed"), None);
    }

    #[test]
    fn test_relative_resolution_from_document() {
        assert_eq!(path("/news", "item"), Some("/news/item".into()));
        assert_eq!(path("/news/item", "../other"), Some("/news/other".into()));
        assert_eq!(path("/news", "./a/./b"), Some("/news/a/b".into()));
    }

    #[test]
    fn test_relative_resolution_from_file() {
        assert_eq!(
            path("/wp-content/themes/t/style.css", "../fonts/a.woff2"),
            Some("/wp-content/themes/fonts/a.woff2".into())
        );
        assert_eq!(
            path("/wp-content/themes/t/style.css", "img/bg.png"),
            Some("/wp-content/themes/t/img/bg.png".into())
        );
    }

    #[test]
    fn test_traversal_stays_under_root() {
        assert_eq!(
            path("/restricted/documents", "../../../../etc/passwd"),
            Some("/etc/passwd".into())
        );
        assert_eq!(path("/", "/../../x"), Some("/x".into()));
        assert_eq!(path("/a", "../../.."), Some("/".into()));
    }

    #[test]
    fn test_canonical_paths_are_fixed_points() {
        for p in ["/", "/about", "/a/b/c", "/404.html", "/wp-content/x.css"] {
            for base in ["/", "/deep/nested/page", "/file.css"] {
                assert_eq!(path(base, p), Some(p.to_string()), "{} from {}", p, base);
            }
        }
    }

    #[test]
    fn test_trailing_slash_and_duplicate_slashes() {
        assert_eq!(path("/", "/about/"), Some("/about".into()));
        assert_eq!(path("/", "/a//b///c/"), Some("/a/b/c".into()));
    }

    #[test]
    fn test_index_document_dropped() {
        assert_eq!(path("/", "/about/index.html"), Some("/about".into()));
        assert_eq!(path("/", "/index.html"), Some("/".into()));
    }

    #[test]
    fn test_extra_prefix_maps_local_mirror_back() {
        let normalizer = PathNormalizer::new(&["example.org".to_string()])
            .with_prefix("file:///srv/mirror");
        let link = normalizer
            .normalize("/", "file:///srv/mirror/about/index.html#x")
            .unwrap();
        assert_eq!(link.path, "/about");
        assert_eq!(link.query, "#x");
    }

    #[test]
    fn test_known_origin() {
        let normalizer = PathNormalizer::new(&["example.org".to_string()]);
        assert!(normalizer.is_known_origin("https://example.org/a.png"));
        assert!(!normalizer.is_known_origin("https://cdn.example.org/a.png"));
    }
}

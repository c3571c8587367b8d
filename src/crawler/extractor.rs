//! Reference scanning over document text
//!
//! Documents are scanned once per reference kind with an independent
//! pattern. The scanners tolerate malformed markup: they never parse the
//! document structure, so kinds can overlap and a stray quote only affects
//! the one match it sits in.

use crate::url::{PathNormalizer, Route};
use crate::ConfigError;
use regex::Regex;

/// The kinds of reference the scanners recognize
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    /// `href="…"` or `src="…"`
    Attribute,
    /// `href^="…"`: a selector pattern, never resolved as a route
    Template,
    /// `url(…)` inside style text
    StyleUrl,
    /// One candidate of a `srcset="a 1x, b 2x"` list
    Candidate,
    /// An escaped absolute authoring-origin URL inside a string literal
    EmbeddedLiteral,
}

/// A raw reference found in a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// The reference text; embedded literals are already unescaped
    pub raw: String,
    pub kind: ReferenceKind,
}

/// Compiled scanners shared by the extractor and the rewriter
#[derive(Debug)]
pub struct LinkPatterns {
    /// Groups: 1 attribute, 2 space, 3 caret, 4 space, 5 open quote, 6 value, 7 close quote
    pub(crate) attribute: Regex,
    /// Groups: 1 open delimiter, 2 value, 3 close delimiter
    pub(crate) style_url: Regex,
    /// Groups: 1 space, 2 space, 3 open quote, 4 list, 5 close quote
    pub(crate) candidate_set: Regex,
    /// Group 1: the path, possibly with `\/` escapes
    pub(crate) literal: Regex,
    /// A whole `<link …>` element
    pub(crate) head_link: Regex,
    /// Groups 1-3: the rel value, double-quoted, single-quoted or bare
    pub(crate) rel: Regex,
    /// A restricted-area path carrying an access token
    pub(crate) access_token: Regex,
    /// Embedded literal paths that are neither followed nor rewritten
    pub(crate) passthrough: Vec<String>,
}

impl LinkPatterns {
    /// Compiles the scanners for one site
    ///
    /// # Arguments
    ///
    /// * `authoring_hostname` - Host whose absolute URLs leak into inline script data
    /// * `restricted_prefix` - Path prefix of the access-restricted area
    /// * `passthrough` - Embedded literal paths to leave alone
    pub fn new(
        authoring_hostname: &str,
        restricted_prefix: &str,
        passthrough: &[String],
    ) -> Result<Self, ConfigError> {
        let host = regex::escape(authoring_hostname);
        let restricted = regex::escape(restricted_prefix.trim_end_matches('/'));

        Ok(Self {
            attribute: compile(r#"(href|src)(\s*)(\^)?=(\s*)("|')(.*?)("|')"#)?,
            style_url: compile(r#"url\(("|'|&#039;)?(.*?)("|'|&#039;)?\)"#)?,
            candidate_set: compile(r#"srcset(\s*)=(\s*)("|')(.*?)("|')"#)?,
            literal: compile(&format!(r#""https:\\?/\\?/{}(\\?/[^"]*)""#, host))?,
            head_link: compile(r"(?i)<link\b[^>]*>")?,
            rel: compile(r#"(?i)\brel\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)?,
            access_token: compile(&format!(
                r#"{}(?:/[^"'\s<>?#]*)?[?#][^"'\s<>]*token=[^"'\s<>]*"#,
                restricted
            ))?,
            passthrough: passthrough.to_vec(),
        })
    }

    /// Returns true if an embedded literal path must be left alone
    pub(crate) fn is_passthrough(&self, path: &str) -> bool {
        self.passthrough.iter().any(|p| p == path)
    }
}

fn compile(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern)
        .map_err(|e| ConfigError::Validation(format!("invalid link pattern: {}", e)))
}

/// Undoes the `\/` escaping of serialized string literals
pub(crate) fn unescape_literal(raw: &str) -> String {
    raw.replace("\\/", "/")
}

/// Splits a `srcset` value into `(reference, descriptor)` candidates
pub(crate) fn split_candidates(list: &str) -> impl Iterator<Item = (&str, &str)> {
    list.split(',').filter_map(|candidate| {
        let candidate = candidate.trim();
        if candidate.is_empty() {
            return None;
        }
        match candidate.split_once(char::is_whitespace) {
            Some((reference, descriptor)) => Some((reference, descriptor.trim())),
            None => Some((candidate, "")),
        }
    })
}

/// Finds references in documents
#[derive(Debug, Clone)]
pub struct LinkExtractor {
    patterns: std::sync::Arc<LinkPatterns>,
}

impl LinkExtractor {
    pub fn new(patterns: std::sync::Arc<LinkPatterns>) -> Self {
        Self { patterns }
    }

    /// Scans a document once per reference kind
    ///
    /// References are returned in kind order and, within a kind, in
    /// document order. Nothing is deduplicated here.
    pub fn extract(&self, document: &str) -> Vec<Reference> {
        let mut references = Vec::new();

        for caps in self.patterns.attribute.captures_iter(document) {
            let kind = if caps.get(3).is_some() {
                ReferenceKind::Template
            } else {
                ReferenceKind::Attribute
            };
            references.push(Reference {
                raw: caps[6].to_string(),
                kind,
            });
        }

        for caps in self.patterns.style_url.captures_iter(document) {
            references.push(Reference {
                raw: caps[2].to_string(),
                kind: ReferenceKind::StyleUrl,
            });
        }

        for caps in self.patterns.candidate_set.captures_iter(document) {
            for (reference, _) in split_candidates(&caps[4]) {
                references.push(Reference {
                    raw: reference.to_string(),
                    kind: ReferenceKind::Candidate,
                });
            }
        }

        for caps in self.patterns.literal.captures_iter(document) {
            references.push(Reference {
                raw: unescape_literal(&caps[1]),
                kind: ReferenceKind::EmbeddedLiteral,
            });
        }

        references
    }

    /// Turns the references of the document at `current` into candidate routes
    ///
    /// Templates, unresolvable references and passthrough literals are
    /// skipped.
    pub fn discover_routes(
        &self,
        document: &str,
        current: &str,
        normalizer: &PathNormalizer,
    ) -> Vec<Route> {
        self.extract(document)
            .into_iter()
            .filter(|reference| reference.kind != ReferenceKind::Template)
            .filter_map(|reference| {
                let link = normalizer.normalize(current, &reference.raw)?;
                if reference.kind == ReferenceKind::EmbeddedLiteral
                    && self.patterns.is_passthrough(&link.path)
                {
                    return None;
                }
                Some(Route::discovered(link, &reference.raw, current))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn create_test_extractor() -> LinkExtractor {
        let patterns = LinkPatterns::new(
            "dev.example.org",
            "/restricted",
            &["/wp-admin/admin-ajax.php".to_string()],
        )
        .unwrap();
        LinkExtractor::new(Arc::new(patterns))
    }

    fn normalizer() -> PathNormalizer {
        PathNormalizer::new(&["example.org".to_string(), "dev.example.org".to_string()])
    }

    fn raws(references: &[Reference], kind: ReferenceKind) -> Vec<&str> {
        references
            .iter()
            .filter(|r| r.kind == kind)
            .map(|r| r.raw.as_str())
            .collect()
    }

    #[test]
    fn test_attribute_references() {
        let extractor = create_test_extractor();
        let refs = extractor.extract(r#"<a href="/about">x</a><img src = 'logo.png'>"#);
        assert_eq!(raws(&refs, ReferenceKind::Attribute), vec!["/about", "logo.png"]);
    }

    #[test]
    fn test_template_attribute_flagged() {
        let extractor = create_test_extractor();
        let refs = extractor.extract(r#"a[href^="/events"] { color: red }"#);
        assert_eq!(raws(&refs, ReferenceKind::Template), vec!["/events"]);
        assert!(raws(&refs, ReferenceKind::Attribute).is_empty());
    }

    #[test]
    fn test_style_urls() {
        let extractor = create_test_extractor();
        let refs = extractor.extract(
            r#"body { background: url("/bg.png") } .a { background: url(/a.png) } .b { background: url(&#039;/b.png&#039;) }"#,
        );
        assert_eq!(
            raws(&refs, ReferenceKind::StyleUrl),
            vec!["/bg.png", "/a.png", "/b.png"]
        );
    }

    #[test]
    fn test_candidate_sets() {
        let extractor = create_test_extractor();
        let refs = extractor.extract(r#"<img srcset="/a-300.jpg 300w, /a-600.jpg 600w,/a.jpg">"#);
        assert_eq!(
            raws(&refs, ReferenceKind::Candidate),
            vec!["/a-300.jpg", "/a-600.jpg", "/a.jpg"]
        );
    }

    #[test]
    fn test_embedded_literals_are_unescaped() {
        let extractor = create_test_extractor();
        let refs = extractor.extract(
            r#"<script>var d = {"url":"https:\/\/dev.example.org\/wp-content\/x.json","other":"https://example.org/y"};</script>"#,
        );
        assert_eq!(
            raws(&refs, ReferenceKind::EmbeddedLiteral),
            vec!["/wp-content/x.json"]
        );
    }

    #[test]
    fn test_split_candidates_keeps_descriptors() {
        let candidates: Vec<_> = split_candidates(" /a.jpg 1x,  /b.jpg   2x , ,/c.jpg").collect();
        assert_eq!(
            candidates,
            vec![("/a.jpg", "1x"), ("/b.jpg", "2x"), ("/c.jpg", "")]
        );
    }

    #[test]
    fn test_discover_routes_filters() {
        let extractor = create_test_extractor();
        let document = r##"
            <a href="https://example.org/news/">News</a>
            <a href="https://elsewhere.net/">Away</a>
            <a href="mailto:info@example.org">Mail</a>
            <a href="#top">Top</a>
            <a href^="/pattern">Template</a>
            <script>ajax = "https:\/\/dev.example.org\/wp-admin\/admin-ajax.php";</script>
            <img src="img/a.png">
        "##;
        let routes = extractor.discover_routes(document, "/blog", &normalizer());
        let paths: Vec<&str> = routes.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["/news", "/blog/img/a.png"]);
        assert_eq!(routes[0].referrer, "/blog");
        assert_eq!(routes[0].original, "https://example.org/news/");
    }

    #[test]
    fn test_overlapping_kinds_both_reported() {
        let extractor = create_test_extractor();
        let refs = extractor.extract(r#"<a href="https://dev.example.org/x">x</a>"#);
        assert_eq!(refs.len(), 2);
    }
}

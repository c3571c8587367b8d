//! Link rewriting for freshly fetched documents
//!
//! # Rewrite Steps
//!
//! Applied in this order over the whole document text:
//!
//! 1. Collapse restricted-area paths carrying access tokens to the bare prefix
//! 2. Replace every internal reference with its destination form
//! 3. Keep or drop head `<link>` elements by relation type
//! 4. Replace the authoring hostname with the public hostname
//!
//! Running the rewriter over its own output changes nothing.

use crate::config::OutputMode;
use crate::crawler::extractor::{split_candidates, unescape_literal, LinkPatterns};
use crate::url::{is_directory_style, PathNormalizer, INDEX_DOCUMENT};
use regex::Captures;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

/// Rewriting errors
#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("unknown link relation type '{rel}' in {path}")]
    UnknownRelation { rel: String, path: String },
}

/// Outcome for one head `<link>` element
#[derive(Debug, Clone, PartialEq, Eq)]
enum Relation {
    Keep,
    Drop,
    Unknown(String),
}

/// Rewrites documents for one output mode
#[derive(Debug, Clone)]
pub struct LinkRewriter {
    patterns: Arc<LinkPatterns>,
    normalizer: PathNormalizer,
    mode: OutputMode,
    /// `file://` URL of the live root, used in offline mode
    file_root: String,
    restricted_prefix: String,
    rel_allow: HashSet<String>,
    rel_deny: HashSet<String>,
    authoring_hostname: String,
    public_hostname: String,
}

/// Output settings for [`LinkRewriter`]
#[derive(Debug, Clone)]
pub struct RewriteRules {
    pub mode: OutputMode,
    pub file_root: String,
    pub restricted_prefix: String,
    pub rel_allow: Vec<String>,
    pub rel_deny: Vec<String>,
    pub authoring_hostname: String,
    pub public_hostname: String,
}

impl LinkRewriter {
    pub fn new(patterns: Arc<LinkPatterns>, normalizer: PathNormalizer, rules: RewriteRules) -> Self {
        let lower = |list: Vec<String>| -> HashSet<String> {
            list.into_iter().map(|r| r.to_ascii_lowercase()).collect()
        };

        Self {
            patterns,
            normalizer,
            mode: rules.mode,
            file_root: rules.file_root.trim_end_matches('/').to_string(),
            restricted_prefix: rules.restricted_prefix.trim_end_matches('/').to_string(),
            rel_allow: lower(rules.rel_allow),
            rel_deny: lower(rules.rel_deny),
            authoring_hostname: rules.authoring_hostname,
            public_hostname: rules.public_hostname,
        }
    }

    /// Rewrites the document found at `current`
    ///
    /// # Errors
    ///
    /// Returns `RewriteError::UnknownRelation` when a head link element has
    /// a relation type on neither the allow list nor the deny list.
    pub fn rewrite(&self, document: &str, current: &str) -> Result<String, RewriteError> {
        let document = self.strip_access_tokens(document);
        let document = self.rewrite_references(&document, current);
        let document = self.filter_head_links(&document, current)?;
        Ok(self.replace_authoring_host(document))
    }

    /// Returns the destination form of a canonical path
    ///
    /// Serve mode keeps the site path; the web server resolves directories.
    /// Offline mode addresses files under the live root and spells out the
    /// index document, unless the reference is a selector template.
    pub fn destination(&self, path: &str, template: bool) -> String {
        match self.mode {
            OutputMode::Serve => path.to_string(),
            OutputMode::Offline if template || !is_directory_style(path) => {
                format!("{}{}", self.file_root, path)
            }
            OutputMode::Offline => {
                let directory = path.trim_end_matches('/');
                format!("{}{}/{}", self.file_root, directory, INDEX_DOCUMENT)
            }
        }
    }

    fn strip_access_tokens(&self, document: &str) -> String {
        self.patterns
            .access_token
            .replace_all(document, self.restricted_prefix.as_str())
            .into_owned()
    }

    fn rewrite_references(&self, document: &str, current: &str) -> String {
        let patterns = &self.patterns;

        let document = patterns.attribute.replace_all(document, |caps: &Captures| {
            let template = caps.get(3).is_some();
            match self.normalizer.normalize(current, &caps[6]) {
                Some(link) => format!(
                    "{}{}{}={}{}{}{}{}",
                    &caps[1],
                    &caps[2],
                    if template { "^" } else { "" },
                    &caps[4],
                    &caps[5],
                    self.destination(&link.path, template),
                    link.query,
                    &caps[7]
                ),
                None => caps[0].to_string(),
            }
        });

        let document = patterns.style_url.replace_all(&document, |caps: &Captures| {
            match self.normalizer.normalize(current, &caps[2]) {
                Some(link) => format!(
                    "url({}{}{}{})",
                    caps.get(1).map_or("", |m| m.as_str()),
                    self.destination(&link.path, false),
                    link.query,
                    caps.get(3).map_or("", |m| m.as_str()),
                ),
                None => caps[0].to_string(),
            }
        });

        let document = patterns.candidate_set.replace_all(&document, |caps: &Captures| {
            let candidates: Vec<String> = split_candidates(&caps[4])
                .map(|(reference, descriptor)| {
                    let target = match self.normalizer.normalize(current, reference) {
                        Some(link) => {
                            format!("{}{}", self.destination(&link.path, false), link.query)
                        }
                        None => reference.to_string(),
                    };
                    if descriptor.is_empty() {
                        target
                    } else {
                        format!("{} {}", target, descriptor)
                    }
                })
                .collect();
            format!(
                "srcset{}={}{}{}{}",
                &caps[1],
                &caps[2],
                &caps[3],
                candidates.join(", "),
                &caps[5]
            )
        });

        let document = patterns.literal.replace_all(&document, |caps: &Captures| {
            let raw = unescape_literal(&caps[1]);
            match self.normalizer.normalize(current, &raw) {
                Some(link) if !patterns.is_passthrough(&link.path) => format!(
                    "\"{}{}\"",
                    self.destination(&link.path, false),
                    link.query
                ),
                _ => caps[0].to_string(),
            }
        });

        document.into_owned()
    }

    fn filter_head_links(&self, document: &str, current: &str) -> Result<String, RewriteError> {
        let mut output = String::with_capacity(document.len());
        let mut last = 0;

        for element in self.patterns.head_link.find_iter(document) {
            output.push_str(&document[last..element.start()]);
            match self.classify(element.as_str()) {
                Relation::Keep => output.push_str(element.as_str()),
                Relation::Drop => {
                    tracing::trace!("Dropping {} from {}", element.as_str(), current);
                }
                Relation::Unknown(rel) => {
                    return Err(RewriteError::UnknownRelation {
                        rel,
                        path: current.to_string(),
                    });
                }
            }
            last = element.end();
        }
        output.push_str(&document[last..]);

        Ok(output)
    }

    /// Keeps an element if any relation is allowed, drops it if all are denied
    fn classify(&self, element: &str) -> Relation {
        let Some(caps) = self.patterns.rel.captures(element) else {
            return Relation::Keep;
        };
        let value = caps
            .get(1)
            .or_else(|| caps.get(2))
            .or_else(|| caps.get(3))
            .map_or("", |m| m.as_str());

        let tokens: Vec<String> = value
            .split_whitespace()
            .map(|t| t.to_ascii_lowercase())
            .collect();
        if tokens.is_empty() {
            return Relation::Keep;
        }

        if tokens.iter().any(|t| self.rel_allow.contains(t)) {
            Relation::Keep
        } else if tokens.iter().all(|t| self.rel_deny.contains(t)) {
            Relation::Drop
        } else {
            Relation::Unknown(value.to_string())
        }
    }

    fn replace_authoring_host(&self, document: String) -> String {
        if self.authoring_hostname == self.public_hostname {
            return document;
        }
        document.replace(&self.authoring_hostname, &self.public_hostname)
    }
}

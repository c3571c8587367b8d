use serde::Deserialize;

/// Main configuration structure for Sumi-Mirror
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub site: SiteConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub rewrite: RewriteConfig,
}

/// The remote site and the identity used to reach it
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SiteConfig {
    /// Base URL every fetch is sent to (e.g. "https://dev.example.org")
    pub origin: String,

    /// Every hostname the site is reachable under
    pub hostnames: Vec<String>,

    /// Hostname of the editing environment, which leaks into inline script data
    pub authoring_hostname: String,

    /// Hostname that replaces the authoring hostname in the published mirror
    pub public_hostname: String,

    /// Basic authentication user
    #[serde(default)]
    pub username: Option<String>,

    /// Basic authentication password
    #[serde(default)]
    pub password: Option<String>,

    /// Fixed query appended to every resource fetch (without the leading '?')
    #[serde(default)]
    pub query_marker: Option<String>,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Routes the frontier is seeded with, processed in this order
    #[serde(default = "default_entry_routes")]
    pub entry_routes: Vec<String>,

    /// Number of concurrent route workers
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// Minimum time between two requests, shared by all workers (milliseconds)
    #[serde(default)]
    pub request_delay_ms: u64,

    /// Per-request timeout (seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries after a connection-level failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff before the first retry, doubled per attempt (milliseconds)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Abort the run on the first route failure
    #[serde(default)]
    pub strict: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            entry_routes: default_entry_routes(),
            workers: default_workers(),
            request_delay_ms: 0,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            strict: false,
        }
    }
}

/// How links in the mirror address each other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputMode {
    /// Served by a web server mapping `/x` to `x/index.html`
    Serve,
    /// Browsed straight from disk through `file://` links
    Offline,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Directory holding the live mirror generation
    pub root: String,

    /// Addressing scheme of rewritten links
    #[serde(default = "default_mode")]
    pub mode: OutputMode,
}

/// Paths with fixed redownload behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PolicyConfig {
    /// The custom not-found page; never redownloaded once cached
    #[serde(default = "default_not_found_path")]
    pub not_found_path: String,

    /// Session-dependent subtree; never redownloaded once cached
    #[serde(default = "default_restricted_prefix")]
    pub restricted_prefix: String,

    /// High-churn entry points fetched on every run
    #[serde(default = "default_always_redownload")]
    pub always_redownload: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            not_found_path: default_not_found_path(),
            restricted_prefix: default_restricted_prefix(),
            always_redownload: default_always_redownload(),
        }
    }
}

/// Sources of the modification index
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct IndexConfig {
    /// Paginated listing collections, fetched in order for every page number
    #[serde(default = "default_collections")]
    pub collections: Vec<String>,

    /// Records requested per listing page
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Origin of the unauthenticated event listing; skipped when absent
    #[serde(default)]
    pub events_origin: Option<String>,

    /// Path prefix events are mapped under
    #[serde(default = "default_events_prefix")]
    pub events_prefix: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            collections: default_collections(),
            page_size: default_page_size(),
            events_origin: None,
            events_prefix: default_events_prefix(),
        }
    }
}

/// Head link relation lists and literal passthroughs
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RewriteConfig {
    /// Relation types whose `<link>` elements are kept
    #[serde(default = "default_rel_allow")]
    pub rel_allow: Vec<String>,

    /// Relation types whose `<link>` elements are dropped
    #[serde(default = "default_rel_deny")]
    pub rel_deny: Vec<String>,

    /// Paths inside embedded literals that are neither followed nor rewritten
    #[serde(default = "default_literal_passthrough")]
    pub literal_passthrough: Vec<String>,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            rel_allow: default_rel_allow(),
            rel_deny: default_rel_deny(),
            literal_passthrough: default_literal_passthrough(),
        }
    }
}

fn default_entry_routes() -> Vec<String> {
    vec!["/".to_string(), "/404.html".to_string()]
}

fn default_workers() -> u32 {
    1
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_mode() -> OutputMode {
    OutputMode::Serve
}

fn default_not_found_path() -> String {
    "/404.html".to_string()
}

fn default_restricted_prefix() -> String {
    "/restricted".to_string()
}

fn default_always_redownload() -> Vec<String> {
    vec!["/".to_string(), "/activities".to_string()]
}

fn default_collections() -> Vec<String> {
    vec![
        "/wp-json/wp/v2/pages".to_string(),
        "/wp-json/wp/v2/media".to_string(),
    ]
}

fn default_page_size() -> u32 {
    100
}

fn default_events_prefix() -> String {
    "/activities".to_string()
}

fn default_rel_allow() -> Vec<String> {
    ["stylesheet", "icon", "modulepreload", "dns-prefetch", "canonical"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_rel_deny() -> Vec<String> {
    [
        "alternate",
        "shortlink",
        "pingback",
        "edituri",
        "wlwmanifest",
        "preconnect",
        "prefetch",
        "preload",
        "profile",
        "https://api.w.org/",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_literal_passthrough() -> Vec<String> {
    vec!["/wp-admin/admin-ajax.php".to_string()]
}

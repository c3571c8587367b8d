//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests of a run, including:
//! - Building the HTTP client with the run's timeout and user agent
//! - Basic authentication and the fixed query marker
//! - A minimum spacing between requests shared by every worker
//! - Bounded retries with exponential backoff for connection-level failures
//! - The not-found page exception to status handling

use crate::config::{Config, CrawlerConfig};
use crate::{MirrorError, Result};
use reqwest::{Client, StatusCode};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

/// User agent sent with every request
const USER_AGENT: &str = concat!("sumi-mirror/", env!("CARGO_PKG_VERSION"));

/// A response whose status has not been judged yet
#[derive(Debug)]
pub struct RawResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The crawler configuration (timeout)
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &CrawlerConfig) -> std::result::Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.timeout_secs.min(10)))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches resources and listings from the remote site
///
/// One fetcher is shared by all workers, so the request spacing is a budget
/// for the whole run rather than per worker.
#[derive(Debug)]
pub struct Fetcher {
    client: Client,
    origin: String,
    username: Option<String>,
    password: Option<String>,
    query_marker: Option<String>,
    not_found_path: String,
    max_retries: u32,
    backoff: Duration,
    spacing: Duration,
    next_slot: Mutex<Instant>,
    requests: AtomicUsize,
}

impl Fetcher {
    /// Creates a fetcher from the run configuration
    pub fn new(config: &Config) -> Result<Self> {
        let client = build_http_client(&config.crawler).map_err(|source| MirrorError::Http {
            url: config.site.origin.clone(),
            source,
        })?;

        Ok(Self {
            client,
            origin: config.site.origin.trim_end_matches('/').to_string(),
            username: config.site.username.clone(),
            password: config.site.password.clone(),
            query_marker: config.site.query_marker.clone(),
            not_found_path: config.policy.not_found_path.clone(),
            max_retries: config.crawler.max_retries,
            backoff: Duration::from_millis(config.crawler.retry_backoff_ms),
            spacing: Duration::from_millis(config.crawler.request_delay_ms),
            next_slot: Mutex::new(Instant::now()),
            requests: AtomicUsize::new(0),
        })
    }

    /// Base URL every resource and listing path is appended to
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Number of requests sent so far, retries included
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }

    /// Returns the URL a site path is fetched from
    pub fn resource_url(&self, path: &str) -> String {
        match &self.query_marker {
            Some(marker) => format!("{}{}?{}", self.origin, path, marker),
            None => format!("{}{}", self.origin, path),
        }
    }

    /// Fetches the resource at a canonical site path
    ///
    /// A `404` for the not-found page is a success: its body is the custom
    /// not-found page. Any other non-2xx status fails without a retry.
    pub async fn fetch(&self, path: &str) -> Result<Vec<u8>> {
        let url = self.resource_url(path);
        let response = self.get(&url, true).await?;

        let expected_miss = response.status == StatusCode::NOT_FOUND && path == self.not_found_path;
        if !response.status.is_success() && !expected_miss {
            return Err(MirrorError::Status {
                url,
                status: response.status.as_u16(),
            });
        }

        tracing::debug!(
            "Fetched {} ({} bytes, status {})",
            path,
            response.body.len(),
            response.status.as_u16()
        );
        Ok(response.body)
    }

    /// Sends a GET request, retrying connection-level failures
    ///
    /// # Arguments
    ///
    /// * `url` - Absolute URL to request
    /// * `authenticated` - Whether to send the configured basic credentials
    ///
    /// # Returns
    ///
    /// The response status and body; the status is left to the caller.
    pub async fn get(&self, url: &str, authenticated: bool) -> Result<RawResponse> {
        let mut attempt = 0;
        loop {
            self.wait_for_slot().await;
            self.requests.fetch_add(1, Ordering::Relaxed);

            match self.send(url, authenticated).await {
                Ok(response) => return Ok(response),
                Err(e) if attempt < self.max_retries && is_transient(&e) => {
                    let delay = self.backoff.saturating_mul(2u32.saturating_pow(attempt));
                    attempt += 1;
                    tracing::warn!(
                        "Request to {} failed (attempt {}/{}): {}; retrying in {:?}",
                        url,
                        attempt,
                        self.max_retries + 1,
                        e,
                        delay
                    );
                    sleep(delay).await;
                }
                Err(source) => {
                    return Err(MirrorError::Http {
                        url: url.to_string(),
                        source,
                    })
                }
            }
        }
    }

    async fn send(
        &self,
        url: &str,
        authenticated: bool,
    ) -> std::result::Result<RawResponse, reqwest::Error> {
        let mut request = self.client.get(url);
        if authenticated {
            if let Some(username) = &self.username {
                request = request.basic_auth(username, self.password.as_deref());
            }
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?.to_vec();
        Ok(RawResponse { status, body })
    }

    /// Reserves the next request slot and sleeps until it opens
    ///
    /// The lock only guards the slot arithmetic; nobody sleeps while holding it.
    async fn wait_for_slot(&self) {
        if self.spacing.is_zero() {
            return;
        }

        let wait = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = (*next).max(now);
            *next = slot + self.spacing;
            slot - now
        };

        if !wait.is_zero() {
            sleep(wait).await;
        }
    }
}

/// Connection-level failures worth another attempt
fn is_transient(error: &reqwest::Error) -> bool {
    error.is_connect() || error.is_timeout() || error.is_request() || error.is_body()
}

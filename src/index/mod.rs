//! Modification index built from the remote metadata listings
//!
//! The index maps canonical paths to the time the remote site last changed
//! them. It is built once at the start of a run and only read afterwards.
//!
//! # Sources
//!
//! - The paginated listing collections: for every page number, each
//!   collection still in range is fetched in order until the server reports
//!   an out-of-range page or returns an empty page
//! - The optional, unauthenticated event listing, mapped under a path prefix

pub mod listing;

use crate::config::IndexConfig;
use crate::crawler::Fetcher;
use crate::url::PathNormalizer;
use crate::{MirrorError, Result};
use chrono::{DateTime, Utc};
use listing::{EventRecord, ListingRecord};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::collections::HashMap;

/// Remote modification times by canonical path
#[derive(Debug, Clone, Default)]
pub struct ModificationIndex {
    entries: HashMap<String, DateTime<Utc>>,
}

impl ModificationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the remote modification time of a canonical path
    pub fn get(&self, path: &str) -> Option<DateTime<Utc>> {
        self.entries.get(path).copied()
    }

    /// Records a modification time, keeping the newest one per path
    pub fn insert(&mut self, path: String, modified: DateTime<Utc>) {
        self.entries
            .entry(path)
            .and_modify(|t| *t = (*t).max(modified))
            .or_insert(modified);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, DateTime<Utc>)> for ModificationIndex {
    fn from_iter<I: IntoIterator<Item = (String, DateTime<Utc>)>>(iter: I) -> Self {
        let mut index = Self::new();
        for (path, modified) in iter {
            index.insert(path, modified);
        }
        index
    }
}

/// Builds the modification index from every configured source
///
/// # Arguments
///
/// * `fetcher` - The run's fetcher (listings share its rate budget)
/// * `config` - The listing sources
/// * `normalizer` - Maps record links to canonical paths
/// * `strict` - Whether a listing failure or a link to an unknown origin aborts
///
/// # Errors
///
/// `UnlistedOrigin` for a foreign link in strict mode, and any listing
/// failure in strict mode. Outside strict mode both are warnings and the
/// affected paths stay unindexed, which makes them redownload.
pub async fn build_index(
    fetcher: &Fetcher,
    config: &IndexConfig,
    normalizer: &PathNormalizer,
    strict: bool,
) -> Result<ModificationIndex> {
    let mut builder = IndexBuilder {
        index: ModificationIndex::new(),
        normalizer,
        strict,
    };

    let mut active: Vec<&str> = config.collections.iter().map(String::as_str).collect();
    let mut page = 1u32;
    while !active.is_empty() {
        let mut in_range = Vec::with_capacity(active.len());
        for collection in active {
            let url = format!(
                "{}{}?page={}&per_page={}",
                fetcher.origin(),
                collection,
                page,
                config.page_size
            );
            let records: Option<Vec<ListingRecord>> =
                match fetch_listing(fetcher, &url, true).await {
                    Ok(records) => records,
                    Err(e) if !strict => {
                        tracing::warn!("Giving up on listing {}: {}", collection, e);
                        None
                    }
                    Err(e) => return Err(e),
                };

            match records {
                Some(records) if !records.is_empty() => {
                    for record in &records {
                        builder.add_record(record)?;
                    }
                    in_range.push(collection);
                }
                _ => tracing::debug!("Listing {} ends before page {}", collection, page),
            }
        }
        active = in_range;
        page += 1;
    }

    if let Some(origin) = &config.events_origin {
        let url = format!("{}/v2/events", origin.trim_end_matches('/'));
        match fetch_listing::<EventRecord>(fetcher, &url, false).await {
            Ok(events) => {
                for event in events.unwrap_or_default() {
                    builder.add_event(&config.events_prefix, &event);
                }
            }
            Err(e) if !strict => tracing::warn!("Skipping event listing: {}", e),
            Err(e) => return Err(e),
        }
    }

    tracing::info!("Modification index holds {} paths", builder.index.len());
    Ok(builder.index)
}

struct IndexBuilder<'a> {
    index: ModificationIndex,
    normalizer: &'a PathNormalizer,
    strict: bool,
}

impl IndexBuilder<'_> {
    fn add_record(&mut self, record: &ListingRecord) -> Result<()> {
        let Some(modified) = record.modified_at() else {
            tracing::warn!("Listing record without a readable timestamp: {:?}", record.link);
            return Ok(());
        };

        for link in record.links() {
            if !self.normalizer.is_known_origin(link) {
                if self.strict {
                    return Err(MirrorError::UnlistedOrigin {
                        link: link.to_string(),
                    });
                }
                tracing::warn!("Dropping listing link outside the known origins: {}", link);
                continue;
            }

            match self.normalizer.normalize("/", link) {
                Some(normalized) => self.index.insert(normalized.path, modified),
                None => tracing::debug!("Listing link is not a mirrored path: {}", link),
            }
        }
        Ok(())
    }

    fn add_event(&mut self, prefix: &str, event: &EventRecord) {
        match (event.key(), event.modified_at()) {
            (Some(key), Some(modified)) => {
                let path = format!("{}/{}", prefix.trim_end_matches('/'), key);
                self.index.insert(path, modified);
            }
            _ => tracing::warn!("Skipping unreadable event record {:?}", event.id),
        }
    }
}

/// Fetches one listing page
///
/// Returns `None` when the server reports the page as out of range.
async fn fetch_listing<T: DeserializeOwned>(
    fetcher: &Fetcher,
    url: &str,
    authenticated: bool,
) -> Result<Option<Vec<T>>> {
    let response = fetcher.get(url, authenticated).await?;

    if response.status == StatusCode::BAD_REQUEST {
        return Ok(None);
    }
    if !response.status.is_success() {
        return Err(MirrorError::Status {
            url: url.to_string(),
            status: response.status.as_u16(),
        });
    }

    serde_json::from_slice(&response.body)
        .map(Some)
        .map_err(|source| MirrorError::Json {
            url: url.to_string(),
            source,
        })
}

//! Records of the remote metadata listings

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;

/// One record of a paginated content listing
///
/// Pages expose only `link`; media records add `source_url` and one
/// `source_url` per rendition under `media_details.sizes`.
#[derive(Debug, Clone, Deserialize)]
pub struct ListingRecord {
    #[serde(default)]
    pub link: Option<String>,

    /// Modification time in UTC, without an offset
    #[serde(default)]
    pub modified_gmt: Option<String>,

    /// Modification time in site-local time; used when the UTC field is absent
    #[serde(default)]
    pub modified: Option<String>,

    #[serde(default)]
    pub source_url: Option<String>,

    /// An object for images, but some servers send `[]` for other media
    #[serde(default)]
    pub media_details: Option<Value>,
}

impl ListingRecord {
    /// Returns every link the record's timestamp applies to
    pub fn links(&self) -> Vec<&str> {
        let mut links: Vec<&str> = Vec::new();
        links.extend(self.link.as_deref());
        links.extend(self.source_url.as_deref());

        let sizes = self
            .media_details
            .as_ref()
            .and_then(|details| details.get("sizes"))
            .and_then(Value::as_object);
        if let Some(sizes) = sizes {
            for size in sizes.values() {
                if let Some(url) = size.get("source_url").and_then(Value::as_str) {
                    links.push(url);
                }
            }
        }

        links.dedup();
        links
    }

    /// Returns the record's modification time
    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        self.modified_gmt
            .as_deref()
            .or(self.modified.as_deref())
            .and_then(parse_timestamp)
    }
}

/// One record of the event listing
#[derive(Debug, Clone, Deserialize)]
pub struct EventRecord {
    /// Numeric or string identifier
    pub id: Value,

    #[serde(alias = "updated_at", alias = "modified_at")]
    pub modified: String,
}

impl EventRecord {
    /// Returns the identifier as it appears in the event's path
    pub fn key(&self) -> Option<String> {
        match &self.id {
            Value::String(id) if !id.is_empty() => Some(id.clone()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        }
    }

    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.modified)
    }
}

/// Parses RFC 3339 timestamps and offset-less timestamps taken as UTC
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Some(t.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

//! Data models for the URL shortener
//!
//! `Entry` is the only persisted entity. The remaining types are the
//! mirror file record and the HTTP request/response payloads.

use serde::{Deserialize, Serialize};

/// A code-to-destination mapping held by the record store
///
/// Entries are immutable once created. The display short URL is never
/// stored here; it is always derived from the code and the configured
/// base URL via [`Entry::short_url`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// 7-character alphanumeric short code, primary key
    pub code: String,

    /// Normalized absolute destination (`http://` or `https://`)
    pub destination_url: String,
}

impl Entry {
    pub fn new(code: impl Into<String>, destination_url: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            destination_url: destination_url.into(),
        }
    }

    /// Fully-qualified short link, e.g. `https://sho.rt/Ab3dE9x`
    pub fn short_url(&self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self.code)
    }
}

/// One record of the mirror file
///
/// ```json
/// {
///     "id": "Ab3dE9x",
///     "original_url": "https://example.com/path",
///     "short_id": "https://sho.rt/Ab3dE9x"
/// }
/// ```
///
/// `short_id` is written for readers of the file but ignored on load.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MirrorRecord {
    pub id: String,
    pub original_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_id: Option<String>,
}

impl MirrorRecord {
    pub fn from_entry(entry: &Entry, base_url: &str) -> Self {
        Self {
            id: entry.code.clone(),
            original_url: entry.destination_url.clone(),
            short_id: Some(entry.short_url(base_url)),
        }
    }

    pub fn into_entry(self) -> Entry {
        Entry::new(self.id, self.original_url)
    }
}

/// Request payload for `POST /api/shorten`
///
/// `url` is optional at the serde level so a missing field can be
/// answered with a 400 and a readable message.
#[derive(Deserialize, Debug)]
pub struct ShortenRequest {
    pub url: Option<String>,
}

/// Response returned by `POST /api/shorten`
#[derive(Serialize, Deserialize, Debug)]
pub struct ShortenResponse {
    pub short_code: String,
    pub original_url: String,
    pub short_url: String,
}

#[derive(Serialize, Debug)]
pub struct StatsEntry {
    pub code: String,
    pub original_url: String,
    pub short_url: String,
}

/// Response returned by `GET /api/stats`
#[derive(Serialize, Debug)]
pub struct StatsResponse {
    pub total_urls: usize,
    pub urls: Vec<StatsEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_url_joins_without_double_slash() {
        let entry = Entry::new("Ab3dE9x", "https://example.com");
        assert_eq!(entry.short_url("https://sho.rt/"), "https://sho.rt/Ab3dE9x");
        assert_eq!(entry.short_url("https://sho.rt"), "https://sho.rt/Ab3dE9x");
    }

    #[test]
    fn mirror_record_without_short_id_deserializes() {
        let record: MirrorRecord =
            serde_json::from_str(r#"{"id":"Ab3dE9x","original_url":"https://example.com"}"#)
                .unwrap();
        assert!(record.short_id.is_none());
        assert_eq!(
            record.into_entry(),
            Entry::new("Ab3dE9x", "https://example.com")
        );
    }
}

//! Shortening service: the only write path for new entries
//!
//! `shorten` is idempotent by destination. A URL that was already
//! shortened returns its existing code; otherwise a fresh code is
//! allocated with a bounded number of collision retries.
//!
//! Two concurrent calls for the same new destination can both miss the
//! existing-entry lookup and create two entries. Both codes stay valid
//! and later calls return whichever one the store finds first.

use std::sync::Arc;

use tracing::{debug, info, warn};
use url::{Host, Url};

use crate::error::{Error, Result};
use crate::generator::{Generator, RandomGenerator};
use crate::model::Entry;
use crate::store::RecordStore;

/// Upper bound on codes tried before giving up with `CodeExhaustion`.
pub const MAX_ALLOCATION_ATTEMPTS: usize = 10;

/// Outcome of [`ShortenerService::shorten`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortened {
    pub entry: Entry,
    /// `false` when the destination already had an entry.
    pub created: bool,
}

#[derive(Clone)]
pub struct ShortenerService {
    store: Arc<dyn RecordStore>,
    generator: Arc<dyn Generator>,
    base_url: String,
}

impl ShortenerService {
    pub fn new(store: Arc<dyn RecordStore>, base_url: impl Into<String>) -> Self {
        Self::with_generator(store, Arc::new(RandomGenerator), base_url)
    }

    pub fn with_generator(
        store: Arc<dyn RecordStore>,
        generator: Arc<dyn Generator>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            generator,
            base_url: base_url.into(),
        }
    }

    pub fn short_url(&self, entry: &Entry) -> String {
        entry.short_url(&self.base_url)
    }

    pub async fn shorten(&self, raw_url: &str) -> Result<Shortened> {
        let destination_url = normalize_url(raw_url)?;

        if let Some(entry) = self.store.find_by_destination(&destination_url).await? {
            debug!("Found existing code {} for {}", entry.code, destination_url);
            return Ok(Shortened {
                entry,
                created: false,
            });
        }

        let code = self.allocate_code().await?;
        let entry = Entry::new(code, destination_url);
        self.store.put(entry.clone()).await?;

        info!("Shortened {} -> {}", entry.code, entry.destination_url);
        Ok(Shortened {
            entry,
            created: true,
        })
    }

    /// All entries sorted by code, for the stats surface.
    pub async fn entries(&self) -> Result<Vec<Entry>> {
        let mut entries = self.store.enumerate().await?;
        entries.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(entries)
    }

    async fn allocate_code(&self) -> Result<String> {
        for attempt in 1..=MAX_ALLOCATION_ATTEMPTS {
            let code = self.generator.generate();
            if self.store.get(&code).await?.is_none() {
                return Ok(code);
            }
            warn!("Code collision on {} (attempt {})", code, attempt);
        }
        Err(Error::CodeExhaustion(MAX_ALLOCATION_ATTEMPTS))
    }
}

/// Trims the input, lowercases an explicit scheme and defaults a missing
/// one to `https://`, then validates.
pub fn normalize_url(raw_url: &str) -> Result<String> {
    let trimmed = raw_url.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidUrl("URL cannot be empty".to_string()));
    }

    let scheme = ["https://", "http://"].into_iter().find(|scheme| {
        trimmed
            .get(..scheme.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
    });
    let normalized = match scheme {
        Some(scheme) => format!("{}{}", scheme, &trimmed[scheme.len()..]),
        None => format!("https://{}", trimmed),
    };

    validate_url(&normalized)?;
    Ok(normalized)
}

/// Accepts `http(s)://host[:port][/path]` where host is a dotted domain,
/// `localhost`, or an IP literal.
pub fn validate_url(url: &str) -> Result<()> {
    let invalid = || Error::InvalidUrl("Invalid URL format".to_string());

    if url.chars().any(char::is_whitespace) {
        return Err(invalid());
    }

    let parsed = Url::parse(url).map_err(|_| invalid())?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid());
    }

    match parsed.host() {
        Some(Host::Domain(domain)) if is_valid_domain(domain) => Ok(()),
        Some(Host::Ipv4(_)) | Some(Host::Ipv6(_)) => Ok(()),
        _ => Err(invalid()),
    }
}

fn is_valid_domain(domain: &str) -> bool {
    let domain = domain.trim_end_matches('.');
    if domain == "localhost" {
        return true;
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return false;
    }

    let label_ok = |label: &&str| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    };

    let tld = labels[labels.len() - 1];
    labels.iter().all(label_ok)
        && tld.len() >= 2
        && tld.starts_with(|c: char| c.is_ascii_alphabetic())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    /// Always hands out the same code.
    struct FixedGenerator(&'static str);

    impl Generator for FixedGenerator {
        fn generate(&self) -> String {
            self.0.to_string()
        }
    }

    fn test_service() -> ShortenerService {
        ShortenerService::new(Arc::new(MemoryStore::new()), "https://sho.rt")
    }

    #[test]
    fn normalize_adds_scheme_and_trims() {
        assert_eq!(
            normalize_url("  example.com/path ").unwrap(),
            "https://example.com/path"
        );
        assert_eq!(
            normalize_url("http://example.com").unwrap(),
            "http://example.com"
        );
        assert_eq!(
            normalize_url("https://localhost:8080/x").unwrap(),
            "https://localhost:8080/x"
        );
        assert_eq!(
            normalize_url("192.168.1.10/admin").unwrap(),
            "https://192.168.1.10/admin"
        );
    }

    #[test]
    fn normalize_lowercases_the_scheme() {
        assert_eq!(
            normalize_url("HTTPS://example.com/x").unwrap(),
            "https://example.com/x"
        );
        assert_eq!(
            normalize_url("Http://example.com/Path").unwrap(),
            "http://example.com/Path"
        );
    }

    #[tokio::test]
    async fn upper_case_scheme_reuses_the_existing_entry() {
        let service = test_service();

        let first = service.shorten("https://example.com/x").await.unwrap();
        let second = service.shorten("HTTPS://example.com/x").await.unwrap();
        assert!(!second.created);
        assert_eq!(second.entry.code, first.entry.code);
    }

    #[test]
    fn normalize_rejects_garbage() {
        for raw in ["", "   ", "not a url", "https://", "https://nodot", "ftp://x.com"] {
            assert!(
                matches!(normalize_url(raw), Err(Error::InvalidUrl(_))),
                "{raw:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn shorten_creates_then_reuses() {
        let service = test_service();

        let first = service.shorten("example.com/path").await.unwrap();
        assert!(first.created);
        assert_eq!(first.entry.destination_url, "https://example.com/path");
        assert_eq!(first.entry.code.len(), 7);

        let second = service.shorten("https://example.com/path").await.unwrap();
        assert!(!second.created);
        assert_eq!(second.entry.code, first.entry.code);
    }

    #[tokio::test]
    async fn distinct_destinations_get_distinct_codes() {
        let service = test_service();

        let a = service.shorten("https://a.example.com").await.unwrap();
        let b = service.shorten("https://b.example.com").await.unwrap();
        assert_ne!(a.entry.code, b.entry.code);
    }

    #[tokio::test]
    async fn exhaustion_when_every_candidate_collides() {
        let store = Arc::new(MemoryStore::with_entries([Entry::new(
            "Ab3dE9x",
            "https://taken.example.com",
        )]));
        let service =
            ShortenerService::with_generator(store, Arc::new(FixedGenerator("Ab3dE9x")), "");

        let err = service.shorten("https://new.example.com").await.unwrap_err();
        assert!(matches!(err, Error::CodeExhaustion(MAX_ALLOCATION_ATTEMPTS)));
    }

    #[tokio::test]
    async fn entries_are_sorted_by_code() {
        let store = Arc::new(MemoryStore::with_entries([
            Entry::new("ccccccc", "https://c.example.com"),
            Entry::new("aaaaaaa", "https://a.example.com"),
            Entry::new("bbbbbbb", "https://b.example.com"),
        ]));
        let service = ShortenerService::new(store, "https://sho.rt");

        let codes: Vec<String> = service
            .entries()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.code)
            .collect();
        assert_eq!(codes, vec!["aaaaaaa", "bbbbbbb", "ccccccc"]);
    }
}

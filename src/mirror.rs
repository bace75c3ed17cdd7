//! Flat-file mirror of the record store
//!
//! The mirror is a JSON array of [`MirrorRecord`]s rewritten wholesale on
//! every sync. It is a point-in-time copy, never the source of truth.
//! All file access goes through one async mutex so a rewrite is never
//! observed half-written by a reader in this process.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::generator::is_well_formed;
use crate::model::{Entry, MirrorRecord};

/// Cheap change signal for the mirror file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint {
    pub modified: Option<SystemTime>,
    pub size: u64,
}

/// Last fingerprint the file-to-store direction has accounted for.
///
/// Shared between both sync directions: a rewrite by the store-to-file
/// direction records its own fingerprint here so it is not mistaken for
/// an external edit.
#[derive(Debug, Default)]
pub struct FingerprintTracker {
    last: Mutex<Option<Fingerprint>>,
}

impl FingerprintTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<Fingerprint> {
        *self.last.lock()
    }

    pub fn record(&self, fingerprint: Option<Fingerprint>) {
        *self.last.lock() = fingerprint;
    }

    /// Records `next` only if nobody recorded anything since `expected`
    /// was read. A concurrent mirror rewrite keeps its newer fingerprint.
    pub fn advance(&self, expected: Option<Fingerprint>, next: Option<Fingerprint>) -> bool {
        let mut last = self.last.lock();
        if *last == expected {
            *last = next;
            true
        } else {
            false
        }
    }
}

#[derive(Debug)]
pub struct FileMirror {
    path: PathBuf,
    base_url: String,
    lock: tokio::sync::Mutex<()>,
}

impl FileMirror {
    pub fn new(path: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            base_url: base_url.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current fingerprint, `None` when the file does not exist.
    pub async fn fingerprint(&self) -> Result<Option<Fingerprint>> {
        let _guard = self.lock.lock().await;
        read_fingerprint(&self.path).await
    }

    pub async fn load(&self) -> Result<Vec<Entry>> {
        let _guard = self.lock.lock().await;
        read_entries(&self.path).await
    }

    /// Loads entries together with the fingerprint of the exact bytes read.
    pub async fn load_with_fingerprint(&self) -> Result<(Option<Fingerprint>, Vec<Entry>)> {
        let _guard = self.lock.lock().await;
        let fingerprint = read_fingerprint(&self.path).await?;
        let entries = read_entries(&self.path).await?;
        Ok((fingerprint, entries))
    }

    /// Rewrites the whole file with `entries`.
    ///
    /// The new fingerprint is recorded into `tracker` before the lock is
    /// released, so no reader can see the new file without the tracker
    /// already knowing about it.
    pub async fn save(&self, entries: &[Entry], tracker: &FingerprintTracker) -> Result<()> {
        let records: Vec<MirrorRecord> = entries
            .iter()
            .map(|entry| MirrorRecord::from_entry(entry, &self.base_url))
            .collect();
        let bytes = encode(&records)?;

        let _guard = self.lock.lock().await;
        write_atomically(&self.path, &bytes).await?;
        tracker.record(read_fingerprint(&self.path).await?);

        debug!("Saved {} entries to {}", entries.len(), self.path.display());
        Ok(())
    }
}

fn mirror_io(err: impl std::fmt::Display) -> Error {
    Error::MirrorIo(err.to_string())
}

async fn read_fingerprint(path: &Path) -> Result<Option<Fingerprint>> {
    match fs::metadata(path).await {
        Ok(meta) => Ok(Some(Fingerprint {
            modified: meta.modified().ok(),
            size: meta.len(),
        })),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(mirror_io(e)),
    }
}

async fn read_entries(path: &Path) -> Result<Vec<Entry>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(mirror_io(e)),
    };
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }

    let records: Vec<MirrorRecord> = serde_json::from_slice(&bytes).map_err(mirror_io)?;

    // Later duplicates win, matching what a bulk upsert would leave behind.
    let mut seen = HashSet::new();
    let mut entries: Vec<Entry> = records
        .into_iter()
        .rev()
        .filter(|record| {
            let valid = is_well_formed(&record.id)
                && (record.original_url.starts_with("http://")
                    || record.original_url.starts_with("https://"));
            if !valid {
                warn!(
                    "Skipping invalid mirror record {:?} -> {:?}",
                    record.id, record.original_url
                );
            }
            valid
        })
        .filter(|record| seen.insert(record.id.clone()))
        .map(MirrorRecord::into_entry)
        .collect();
    entries.reverse();

    Ok(entries)
}

fn encode(records: &[MirrorRecord]) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut bytes, formatter);
    records.serialize(&mut serializer).map_err(mirror_io)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Writes to a sibling temp file and renames it over the target.
async fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(mirror_io)?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, bytes).await.map_err(mirror_io)?;
    fs::rename(&tmp, path).await.map_err(mirror_io)?;
    Ok(())
}

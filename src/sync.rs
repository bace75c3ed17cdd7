//! Bidirectional synchronization between the record store and the mirror file
//!
//! Two loops run on independent timers:
//!
//! - **file -> store** watches the mirror fingerprint and, when it moves,
//!   bulk-upserts the file's entries if they differ from the store. Three
//!   consecutive failures disable it for the rest of the process.
//! - **store -> file** watches the store's entry count and rewrites the
//!   mirror when it moves, or on every tick while file -> store is disabled.
//!
//! Neither loop is on a request path. Both are owned by a
//! [`SyncSupervisor`] which stops them between iterations.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::mirror::{FileMirror, FingerprintTracker};
use crate::model::Entry;
use crate::store::RecordStore;

/// Consecutive file -> store failures after which that loop gives up.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 3;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Idle = 0,
    Running = 1,
    Disabled = 2,
    Stopped = 3,
}

impl LoopState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => LoopState::Running,
            2 => LoopState::Disabled,
            3 => LoopState::Stopped,
            _ => LoopState::Idle,
        }
    }
}

/// Lifecycle and health of both loops, shared by reference with the
/// loops themselves and with the health endpoint.
#[derive(Debug, Default)]
pub struct SyncStatus {
    file_to_store: AtomicU8,
    store_to_file: AtomicU8,
    consecutive_failures: AtomicU32,
    last_error: Mutex<Option<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncSnapshot {
    pub file_to_store: LoopState,
    pub store_to_file: LoopState,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

impl SyncStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file_to_store(&self) -> LoopState {
        LoopState::from_u8(self.file_to_store.load(Ordering::Acquire))
    }

    pub fn store_to_file(&self) -> LoopState {
        LoopState::from_u8(self.store_to_file.load(Ordering::Acquire))
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Acquire)
    }

    fn set_file_to_store(&self, state: LoopState) {
        self.file_to_store.store(state as u8, Ordering::Release);
    }

    fn set_store_to_file(&self, state: LoopState) {
        self.store_to_file.store(state as u8, Ordering::Release);
    }

    fn record_error(&self, message: String) {
        *self.last_error.lock() = Some(message);
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        SyncSnapshot {
            file_to_store: self.file_to_store(),
            store_to_file: self.store_to_file(),
            consecutive_failures: self.consecutive_failures(),
            last_error: self.last_error.lock().clone(),
        }
    }
}

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Change signal did not move; nothing was read.
    Unchanged,
    /// Change signal moved but both sides already agree.
    InSync,
    /// File entries were bulk-upserted into the store.
    Pushed(usize),
    /// The mirror was rewritten from a store snapshot.
    Written(usize),
}

/// File -> store direction
pub struct FileToStore {
    store: Arc<dyn RecordStore>,
    mirror: Arc<FileMirror>,
    tracker: Arc<FingerprintTracker>,
    status: Arc<SyncStatus>,
    failures: u32,
}

impl FileToStore {
    /// Pushes external edits of the mirror into the store
    ///
    /// Each tick:
    /// 1. Compares the mirror's fingerprint with the last one acknowledged
    /// 2. Returns `Unchanged` without reading the file when they match
    /// 3. Otherwise loads the file and bulk-upserts it when the entry
    ///    counts differ or any code maps to a different destination
    /// 4. Acknowledges the new fingerprint only after the store caught up
    ///
    /// # Returns
    ///
    /// - `Unchanged` - the file was not touched since the last tick
    /// - `InSync` - the file changed but already matches the store
    /// - `Pushed(n)` - `n` file entries were upserted into the store
    ///
    /// # Errors
    ///
    /// `MirrorIo` when the file cannot be read or parsed, `StorageUnavailable`
    /// when the store rejects the read or the upsert. The fingerprint is
    /// left unacknowledged so the next tick retries.
    pub async fn tick(&mut self) -> Result<SyncOutcome> {
        let seen = self.tracker.last();
        if self.mirror.fingerprint().await? == seen {
            return Ok(SyncOutcome::Unchanged);
        }

        let (fingerprint, file_entries) = self.mirror.load_with_fingerprint().await?;
        let outcome = self.reconcile(file_entries).await?;

        // Only acknowledge the file once the store has caught up, so a
        // failed push is retried on the next tick.
        self.tracker.advance(seen, fingerprint);
        Ok(outcome)
    }

    async fn reconcile(&self, file_entries: Vec<Entry>) -> Result<SyncOutcome> {
        if file_entries.is_empty() {
            debug!("Mirror is empty, nothing to push");
            return Ok(SyncOutcome::InSync);
        }

        let store_entries = self.store.enumerate().await?;
        if file_entries.len() != store_entries.len() {
            info!(
                "Entry count differs (file={}, store={}), pushing mirror",
                file_entries.len(),
                store_entries.len()
            );
            let written = self.store.put_many(file_entries).await?;
            return Ok(SyncOutcome::Pushed(written));
        }

        let stored: HashMap<&str, &str> = store_entries
            .iter()
            .map(|e| (e.code.as_str(), e.destination_url.as_str()))
            .collect();
        let differs = file_entries
            .iter()
            .any(|e| stored.get(e.code.as_str()) != Some(&e.destination_url.as_str()));

        if differs {
            info!("Mirror differs from store, pushing mirror");
            let written = self.store.put_many(file_entries).await?;
            Ok(SyncOutcome::Pushed(written))
        } else {
            debug!("Mirror changed on disk but matches store");
            Ok(SyncOutcome::InSync)
        }
    }

    /// Runs one tick with failure accounting.
    ///
    /// Returns `false` once the loop has disabled itself.
    pub async fn run_once(&mut self) -> bool {
        match self.tick().await {
            Ok(outcome) => {
                if outcome != SyncOutcome::Unchanged {
                    debug!("File->store tick: {:?}", outcome);
                }
                self.failures = 0;
                self.status.consecutive_failures.store(0, Ordering::Release);
                true
            }
            Err(e) => {
                self.failures += 1;
                self.status
                    .consecutive_failures
                    .store(self.failures, Ordering::Release);
                self.status.record_error(e.to_string());
                warn!(
                    "File->store sync failed ({}/{}): {}",
                    self.failures, MAX_CONSECUTIVE_FAILURES, e
                );

                if self.failures >= MAX_CONSECUTIVE_FAILURES {
                    error!(
                        "File->store sync disabled after {} consecutive failures; \
                         store->file will rewrite the mirror on every tick",
                        self.failures
                    );
                    self.status.set_file_to_store(LoopState::Disabled);
                    return false;
                }
                true
            }
        }
    }

    /// Ticks every `interval` until shutdown or until the loop disables itself.
    pub async fn run(mut self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        self.status.set_file_to_store(LoopState::Running);
        info!("File->store sync started ({:?} interval)", interval);

        loop {
            if !self.run_once().await {
                return;
            }
            if sleep_or_shutdown(interval, &mut shutdown).await {
                break;
            }
        }

        self.status.set_file_to_store(LoopState::Stopped);
        info!("File->store sync stopped");
    }
}

/// Store -> file direction
pub struct StoreToFile {
    store: Arc<dyn RecordStore>,
    mirror: Arc<FileMirror>,
    tracker: Arc<FingerprintTracker>,
    status: Arc<SyncStatus>,
    last_count: usize,
}

impl StoreToFile {
    /// Rewrites the mirror from a store snapshot when the store grew
    ///
    /// Each tick:
    /// 1. Reads the store's entry count
    /// 2. Skips the tick when the count is unchanged, unless the
    ///    file -> store loop is disabled (then every tick rewrites)
    /// 3. Writes all entries sorted by code and records the new file's
    ///    fingerprint so the file -> store loop ignores the rewrite
    ///
    /// # Returns
    ///
    /// - `Unchanged` - nothing to write
    /// - `Written(n)` - the mirror now holds `n` entries
    pub async fn tick(&mut self) -> Result<SyncOutcome> {
        let count = self.store.count().await?;
        let fallback = self.status.file_to_store() == LoopState::Disabled;

        if count == self.last_count && !fallback {
            return Ok(SyncOutcome::Unchanged);
        }
        if count != self.last_count {
            info!("Store count changed: {} -> {}", self.last_count, count);
        }

        let mut entries = self.store.enumerate().await?;
        entries.sort_by(|a, b| a.code.cmp(&b.code));
        self.mirror.save(&entries, &self.tracker).await?;
        self.last_count = count;

        Ok(SyncOutcome::Written(entries.len()))
    }

    /// Ticks every `interval` until shutdown. Failures are logged and retried.
    pub async fn run(mut self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        self.status.set_store_to_file(LoopState::Running);
        info!("Store->file sync started ({:?} interval)", interval);

        loop {
            match self.tick().await {
                Ok(SyncOutcome::Written(n)) => {
                    info!("Synced {} entries to {}", n, self.mirror.path().display())
                }
                Ok(_) => {}
                Err(e) => {
                    self.status.record_error(e.to_string());
                    warn!("Store->file sync failed: {}", e);
                }
            }
            if sleep_or_shutdown(interval, &mut shutdown).await {
                break;
            }
        }

        self.status.set_store_to_file(LoopState::Stopped);
        info!("Store->file sync stopped");
    }
}

/// Sleeps for `interval`; returns `true` if shutdown was requested.
async fn sleep_or_shutdown(interval: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(interval) => false,
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

/// Wires both directions to one store, one mirror and shared state.
pub struct Synchronizer {
    store: Arc<dyn RecordStore>,
    mirror: Arc<FileMirror>,
    tracker: Arc<FingerprintTracker>,
    status: Arc<SyncStatus>,
}

impl Synchronizer {
    pub fn new(store: Arc<dyn RecordStore>, mirror: Arc<FileMirror>) -> Self {
        Self {
            store,
            mirror,
            tracker: Arc::new(FingerprintTracker::new()),
            status: Arc::new(SyncStatus::new()),
        }
    }

    pub fn status(&self) -> Arc<SyncStatus> {
        Arc::clone(&self.status)
    }

    pub fn file_to_store(&self) -> FileToStore {
        FileToStore {
            store: Arc::clone(&self.store),
            mirror: Arc::clone(&self.mirror),
            tracker: Arc::clone(&self.tracker),
            status: Arc::clone(&self.status),
            failures: 0,
        }
    }

    pub fn store_to_file(&self) -> StoreToFile {
        StoreToFile {
            store: Arc::clone(&self.store),
            mirror: Arc::clone(&self.mirror),
            tracker: Arc::clone(&self.tracker),
            status: Arc::clone(&self.status),
            last_count: 0,
        }
    }

    /// Loads the mirror into the store before serving starts
    ///
    /// The loaded fingerprint is recorded so the first file -> store tick
    /// does not push the same file again. A missing or empty mirror loads
    /// nothing.
    ///
    /// # Returns
    ///
    /// The number of entries upserted into the store.
    pub async fn bootstrap(&self) -> Result<usize> {
        let (fingerprint, entries) = self.mirror.load_with_fingerprint().await?;
        let loaded = if entries.is_empty() {
            0
        } else {
            self.store.put_many(entries).await?
        };
        self.tracker.record(fingerprint);

        info!(
            "Loaded {} entries from {} into the store",
            loaded,
            self.mirror.path().display()
        );
        Ok(loaded)
    }

    /// Spawns both loops on the current runtime
    ///
    /// # Arguments
    ///
    /// * `file_interval` - Period of the file -> store loop
    /// * `store_interval` - Period of the store -> file loop
    ///
    /// # Returns
    ///
    /// A [`SyncSupervisor`] that reports loop state and stops both loops.
    /// Loop state moves from `Idle` to `Running` once each task starts.
    pub fn start(&self, file_interval: Duration, store_interval: Duration) -> SyncSupervisor {
        let (shutdown, rx) = watch::channel(false);

        let handles = vec![
            tokio::spawn(self.file_to_store().run(file_interval, rx.clone())),
            tokio::spawn(self.store_to_file().run(store_interval, rx)),
        ];

        SyncSupervisor {
            shutdown,
            handles,
            status: self.status(),
        }
    }
}

/// Owns the running sync loops.
pub struct SyncSupervisor {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
    status: Arc<SyncStatus>,
}

impl SyncSupervisor {
    pub fn status(&self) -> Arc<SyncStatus> {
        Arc::clone(&self.status)
    }

    /// Signals both loops and waits for their current iteration to finish
    ///
    /// A loop that is sleeping wakes immediately; one that is mid-tick
    /// finishes the tick first, so no mirror write is cut short. Both
    /// loops end in `Stopped`, except a file -> store loop that had
    /// already disabled itself, which stays `Disabled`.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!("Sync task ended abnormally: {}", e);
            }
        }
        info!("Synchronizer shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use tempfile::TempDir;

    fn setup(store: MemoryStore) -> (Synchronizer, Arc<MemoryStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let mirror = Arc::new(FileMirror::new(
            dir.path().join("urls.json"),
            "https://sho.rt",
        ));
        let store = Arc::new(store);
        (Synchronizer::new(store.clone(), mirror), store, dir)
    }

    fn entries(n: usize) -> Vec<Entry> {
        (0..n)
            .map(|i| Entry::new(format!("code{:03}", i), format!("https://example.com/{}", i)))
            .collect()
    }

    #[tokio::test]
    async fn unchanged_file_is_not_read_twice() {
        let (sync, _store, dir) = setup(MemoryStore::new());
        std::fs::write(
            dir.path().join("urls.json"),
            r#"[{"id": "Ab3dE9x", "original_url": "https://example.com"}]"#,
        )
        .unwrap();

        let mut f2s = sync.file_to_store();
        assert_eq!(f2s.tick().await.unwrap(), SyncOutcome::Pushed(1));
        assert_eq!(f2s.tick().await.unwrap(), SyncOutcome::Unchanged);
    }

    #[tokio::test]
    async fn matching_contents_are_not_pushed() {
        let (sync, store, dir) = setup(MemoryStore::with_entries(entries(2)));
        std::fs::write(
            dir.path().join("urls.json"),
            r#"[
                {"id": "code000", "original_url": "https://example.com/0"},
                {"id": "code001", "original_url": "https://example.com/1"}
            ]"#,
        )
        .unwrap();

        let mut f2s = sync.file_to_store();
        assert_eq!(f2s.tick().await.unwrap(), SyncOutcome::InSync);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn same_count_different_destination_is_pushed() {
        let (sync, store, dir) = setup(MemoryStore::with_entries(entries(2)));
        std::fs::write(
            dir.path().join("urls.json"),
            r#"[
                {"id": "code000", "original_url": "https://example.com/0"},
                {"id": "code001", "original_url": "https://edited.example.com"}
            ]"#,
        )
        .unwrap();

        let mut f2s = sync.file_to_store();
        assert_eq!(f2s.tick().await.unwrap(), SyncOutcome::Pushed(2));
        assert_eq!(
            store.get("code001").await.unwrap().unwrap().destination_url,
            "https://edited.example.com"
        );
    }

    #[tokio::test]
    async fn store_rewrite_is_not_seen_as_external_edit() {
        let (sync, _store, _dir) = setup(MemoryStore::with_entries(entries(4)));

        let mut s2f = sync.store_to_file();
        let mut f2s = sync.file_to_store();

        assert_eq!(s2f.tick().await.unwrap(), SyncOutcome::Written(4));
        assert_eq!(f2s.tick().await.unwrap(), SyncOutcome::Unchanged);
        assert_eq!(s2f.tick().await.unwrap(), SyncOutcome::Unchanged);
    }

    #[tokio::test]
    async fn failed_push_is_retried() {
        let (sync, _store, dir) = setup(MemoryStore::new());
        let path = dir.path().join("urls.json");
        std::fs::write(&path, "[ broken").unwrap();

        let mut f2s = sync.file_to_store();
        assert!(f2s.tick().await.is_err());
        assert!(f2s.tick().await.is_err());
    }

    #[tokio::test]
    async fn three_failures_disable_and_store_takes_over() {
        let (sync, _store, dir) = setup(MemoryStore::with_entries(entries(1)));
        std::fs::write(dir.path().join("urls.json"), "[ broken").unwrap();

        let mut f2s = sync.file_to_store();
        assert!(f2s.run_once().await);
        assert!(f2s.run_once().await);
        assert_eq!(sync.status().consecutive_failures(), 2);
        assert!(!f2s.run_once().await);
        assert_eq!(sync.status().file_to_store(), LoopState::Disabled);
        assert!(sync.status().snapshot().last_error.is_some());

        // Count is unchanged after the first write, but the fallback keeps rewriting.
        let mut s2f = sync.store_to_file();
        assert_eq!(s2f.tick().await.unwrap(), SyncOutcome::Written(1));
        assert_eq!(s2f.tick().await.unwrap(), SyncOutcome::Written(1));
    }

    #[tokio::test]
    async fn success_resets_failure_count() {
        let (sync, _store, dir) = setup(MemoryStore::new());
        let path = dir.path().join("urls.json");
        std::fs::write(&path, "[ broken").unwrap();

        let mut f2s = sync.file_to_store();
        assert!(f2s.run_once().await);
        assert_eq!(sync.status().consecutive_failures(), 1);

        std::fs::write(
            &path,
            r#"[{"id": "Ab3dE9x", "original_url": "https://example.com"}]"#,
        )
        .unwrap();
        assert!(f2s.run_once().await);
        assert_eq!(sync.status().consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn bootstrap_loads_file_and_silences_first_tick() {
        let (sync, store, dir) = setup(MemoryStore::new());
        std::fs::write(
            dir.path().join("urls.json"),
            r#"[
                {"id": "Ab3dE9x", "original_url": "https://example.com/a"},
                {"id": "Qq1wW2e", "original_url": "https://example.com/b"}
            ]"#,
        )
        .unwrap();

        assert_eq!(sync.bootstrap().await.unwrap(), 2);
        assert_eq!(store.count().await.unwrap(), 2);
        assert_eq!(
            sync.file_to_store().tick().await.unwrap(),
            SyncOutcome::Unchanged
        );
    }

    #[tokio::test]
    async fn supervisor_starts_and_stops_both_loops() {
        let (sync, _store, dir) = setup(MemoryStore::with_entries(entries(3)));

        let supervisor = sync.start(Duration::from_secs(3600), Duration::from_secs(3600));
        let status = supervisor.status();

        // The store->file loop writes on its first iteration.
        for _ in 0..100 {
            if dir.path().join("urls.json").exists()
                && status.store_to_file() == LoopState::Running
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(dir.path().join("urls.json").exists());

        supervisor.shutdown().await;
        assert_eq!(status.file_to_store(), LoopState::Stopped);
        assert_eq!(status.store_to_file(), LoopState::Stopped);
    }
}

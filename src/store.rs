//! Record store abstraction
//!
//! The store is the authoritative home of every [`Entry`]. Request paths
//! and the synchronizer talk to it only through [`RecordStore`], so the
//! backend can be swapped without touching either.

pub mod memory;
pub mod redb;

pub use self::memory::MemoryStore;
pub use self::redb::RedbStore;

use crate::error::Result;
use crate::model::Entry;
use async_trait::async_trait;

#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    /// Retrieves the entry for a code. Returns `None` if the code does not exist.
    async fn get(&self, code: &str) -> Result<Option<Entry>>;

    /// Upserts a single entry keyed by its code.
    async fn put(&self, entry: Entry) -> Result<()>;

    /// Upserts many entries and returns how many were written.
    ///
    /// Not atomic across the batch: on failure, entries applied before
    /// the error stay applied.
    async fn put_many(&self, entries: Vec<Entry>) -> Result<usize>;

    /// Snapshot of every entry, in no particular order.
    async fn enumerate(&self) -> Result<Vec<Entry>>;

    async fn count(&self) -> Result<usize>;

    /// Finds an entry whose destination equals `destination_url`.
    ///
    /// Backends with a reverse index override this; the default scans
    /// a full snapshot.
    async fn find_by_destination(&self, destination_url: &str) -> Result<Option<Entry>> {
        Ok(self
            .enumerate()
            .await?
            .into_iter()
            .find(|entry| entry.destination_url == destination_url))
    }

    /// Short backend name reported by the health endpoint.
    fn backend_name(&self) -> &'static str;
}

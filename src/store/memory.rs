use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::Result;
use crate::model::Entry;
use crate::store::RecordStore;

/// In-memory record store using DashMap.
///
/// Nothing survives a restart; the mirror file is the only durable copy
/// when this backend is selected.
#[derive(Debug, Default)]
pub struct MemoryStore {
    storage: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: impl IntoIterator<Item = Entry>) -> Self {
        Self {
            storage: entries
                .into_iter()
                .map(|entry| (entry.code, entry.destination_url))
                .collect(),
        }
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get(&self, code: &str) -> Result<Option<Entry>> {
        Ok(self
            .storage
            .get(code)
            .map(|destination| Entry::new(code, destination.value().clone())))
    }

    async fn put(&self, entry: Entry) -> Result<()> {
        self.storage.insert(entry.code, entry.destination_url);
        Ok(())
    }

    async fn put_many(&self, entries: Vec<Entry>) -> Result<usize> {
        let written = entries.len();
        for entry in entries {
            self.storage.insert(entry.code, entry.destination_url);
        }
        Ok(written)
    }

    async fn enumerate(&self) -> Result<Vec<Entry>> {
        Ok(self
            .storage
            .iter()
            .map(|item| Entry::new(item.key().clone(), item.value().clone()))
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.storage.len())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

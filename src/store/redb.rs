use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata};
use tracing::{debug, warn};

use crate::database::{init_db, TABLE_DESTINATION_INDEX, TABLE_ENTRIES};
use crate::error::{Error, Result};
use crate::model::Entry;
use crate::store::RecordStore;

/// Entries written per write transaction by `put_many`.
const BATCH_SIZE: usize = 512;

/// Record store backed by the embedded redb database
///
/// redb calls are blocking, so every operation runs on the blocking
/// thread pool and only suspends the calling task.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    pub fn new(db: Database) -> Self {
        Self { db: Arc::new(db) }
    }

    /// Opens (or creates) the database file at `path`.
    pub fn open(path: &str) -> Result<Self> {
        Ok(Self::new(init_db(path)?))
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || f(&db)).await?
    }
}

fn decode(value: &str) -> Result<Entry> {
    serde_json::from_str(value).map_err(|e| Error::StorageUnavailable(e.to_string()))
}

/// Finds an entry other than `except` whose destination is `destination_url`.
///
/// Full scan, only reached when a code is re-pointed away from a
/// destination the index attributes to it.
fn other_code_for<T>(table: &T, destination_url: &str, except: &str) -> Result<Option<String>>
where
    T: ReadableTable<&'static str, &'static str>,
{
    for row in table.iter()? {
        let (key, value) = row?;
        if key.value() == except {
            continue;
        }
        match decode(value.value()) {
            Ok(entry) if entry.destination_url == destination_url => return Ok(Some(entry.code)),
            Ok(_) => {}
            Err(e) => warn!("Skipping unreadable entry {}: {}", key.value(), e),
        }
    }
    Ok(None)
}

/// Writes `entries` and their index rows in one transaction.
fn write_entries(db: &Database, entries: &[Entry]) -> Result<()> {
    let write_txn = db.begin_write()?;
    {
        let mut table = write_txn.open_table(TABLE_ENTRIES)?;
        let mut index = write_txn.open_table(TABLE_DESTINATION_INDEX)?;

        for entry in entries {
            let json =
                serde_json::to_string(entry).map_err(|e| Error::StorageUnavailable(e.to_string()))?;

            let old_destination = table
                .insert(entry.code.as_str(), json.as_str())?
                .and_then(|guard| serde_json::from_str::<Entry>(guard.value()).ok())
                .map(|old| old.destination_url);

            // This code used to point elsewhere: hand the old destination's
            // index row to another entry that still has it, or drop it.
            if let Some(old) = old_destination.filter(|old| *old != entry.destination_url) {
                let points_here = index
                    .get(old.as_str())?
                    .is_some_and(|guard| guard.value() == entry.code);
                if points_here {
                    match other_code_for(&table, &old, &entry.code)? {
                        Some(code) => index.insert(old.as_str(), code.as_str())?,
                        None => index.remove(old.as_str())?,
                    };
                }
            }

            index.insert(entry.destination_url.as_str(), entry.code.as_str())?;
        }
    }
    write_txn.commit()?;
    Ok(())
}

#[async_trait]
impl RecordStore for RedbStore {
    async fn get(&self, code: &str) -> Result<Option<Entry>> {
        let code = code.to_owned();
        self.blocking(move |db| {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(TABLE_ENTRIES)?;
            let value = table
                .get(code.as_str())?
                .map(|guard| guard.value().to_owned());
            value.as_deref().map(decode).transpose()
        })
        .await
    }

    async fn put(&self, entry: Entry) -> Result<()> {
        self.blocking(move |db| write_entries(db, std::slice::from_ref(&entry)))
            .await
    }

    async fn put_many(&self, entries: Vec<Entry>) -> Result<usize> {
        self.blocking(move |db| {
            let mut written = 0;
            for chunk in entries.chunks(BATCH_SIZE) {
                write_entries(db, chunk)?;
                written += chunk.len();
            }
            debug!("Upserted {} entries into redb", written);
            Ok(written)
        })
        .await
    }

    async fn enumerate(&self) -> Result<Vec<Entry>> {
        self.blocking(|db| {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(TABLE_ENTRIES)?;

            let mut entries = Vec::with_capacity(table.len()? as usize);
            for row in table.iter()? {
                let (key, value) = row?;
                match decode(value.value()) {
                    Ok(entry) => entries.push(entry),
                    Err(e) => warn!("Skipping unreadable entry {}: {}", key.value(), e),
                }
            }
            Ok(entries)
        })
        .await
    }

    async fn count(&self) -> Result<usize> {
        self.blocking(|db| {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(TABLE_ENTRIES)?;
            Ok(table.len()? as usize)
        })
        .await
    }

    async fn find_by_destination(&self, destination_url: &str) -> Result<Option<Entry>> {
        let destination_url = destination_url.to_owned();
        self.blocking(move |db| {
            let read_txn = db.begin_read()?;
            let index = read_txn.open_table(TABLE_DESTINATION_INDEX)?;
            let Some(code) = index
                .get(destination_url.as_str())?
                .map(|guard| guard.value().to_owned())
            else {
                return Ok(None);
            };

            let table = read_txn.open_table(TABLE_ENTRIES)?;
            let entry = match table.get(code.as_str())? {
                Some(guard) => decode(guard.value())?,
                None => return Ok(None),
            };
            Ok((entry.destination_url == destination_url).then_some(entry))
        })
        .await
    }

    fn backend_name(&self) -> &'static str {
        "redb"
    }
}

//! Database initialization and table definitions
//!
//! This module handles the setup of the embedded redb database that
//! backs [`crate::store::RedbStore`].

use redb::{Database, TableDefinition};

/// Main table for storing entries
///
/// Key: short code
/// Value: JSON-serialized `Entry`
///
/// Example:
/// - Key: "Ab3dE9x"
/// - Value: '{"code":"Ab3dE9x","destination_url":"https://example.com"}'
pub const TABLE_ENTRIES: TableDefinition<&str, &str> = TableDefinition::new("entries_v1");

/// Reverse index from destination URL to short code
///
/// Lets the shortening service answer "was this URL already shortened?"
/// without scanning every entry. Maintained in the same write
/// transaction as `TABLE_ENTRIES`.
///
/// Key: normalized destination URL
/// Value: short code
pub const TABLE_DESTINATION_INDEX: TableDefinition<&str, &str> =
    TableDefinition::new("destination_index_v1");

/// Creates or opens the database file and makes sure both tables exist
///
/// ```no_run
/// # use shortmirror::database::init_db;
/// let db = init_db("data.db").expect("Failed to initialize database");
/// ```
pub fn init_db(db_path: &str) -> Result<Database, redb::Error> {
    let db = Database::create(db_path)?;

    let write_txn = db.begin_write()?;
    {
        write_txn.open_table(TABLE_ENTRIES)?;
        write_txn.open_table(TABLE_DESTINATION_INDEX)?;
    }
    write_txn.commit()?;

    Ok(db)
}

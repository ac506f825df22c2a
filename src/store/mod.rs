//! SQLite persistence layer
//!
//! A single connection guarded by a mutex, shared through `Arc<Database>`.
//! Repository operations are split per table family into submodules, all as
//! inherent methods on [`Database`].

pub mod schema;
pub mod settings;
pub mod prices;
pub mod silver;
pub mod banks;
pub mod sources;
pub mod content;
pub mod users;

use log::info;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Store operations fail only on SQLite errors; absence is modelled with `Option`
pub type StoreResult<T> = rusqlite::Result<T>;

/// Handle to the price database
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (creating if needed) the database file and apply pragmas and schema
    pub fn open(path: &Path, busy_timeout: Duration) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        info!("Opened SQLite database at {}", path.display());
        Self::from_connection(conn)
    }

    /// In-memory database, used by tests
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        let db = Self { conn: Mutex::new(conn) };
        db.init_schema()?;
        Ok(db)
    }

    /// Create missing tables and indexes; safe to run repeatedly
    pub fn init_schema(&self) -> StoreResult<()> {
        self.conn().execute_batch(schema::SCHEMA)
    }

    /// Lock the connection. A poisoned lock still holds a usable connection
    /// because every write runs inside its own statement or transaction.
    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Names of all user tables, sorted
    pub fn table_names(&self) -> StoreResult<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.init_schema().unwrap();
        db.init_schema().unwrap();

        let tables = db.table_names().unwrap();
        for expected in [
            "articles",
            "bank_display_settings",
            "bank_rates",
            "price_history",
            "qa_items",
            "settings",
            "silver_prices",
            "source_settings",
            "unified_prices",
            "users",
        ] {
            assert!(tables.contains(&expected.to_string()), "missing table {}", expected);
        }
    }

    #[test]
    fn test_open_file_database_twice() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prices.db");
        {
            let db = Database::open(&path, Duration::from_secs(1)).unwrap();
            db.set_setting("scrape_interval", "90").unwrap();
        }
        let db = Database::open(&path, Duration::from_secs(1)).unwrap();
        assert_eq!(db.get_setting("scrape_interval").unwrap().as_deref(), Some("90"));
    }
}

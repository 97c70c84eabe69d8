// src/db/mod.rs

//! SQLite persistence for repositories and their indexed packages
//!
//! - [`init`] / [`open`] manage the database file and connection pragmas
//! - [`schema`] holds the versioned schema and migrations
//! - [`models`] maps rows to repository and package records
//! - [`store`] implements the transactional store the updater writes through

pub mod models;
pub mod paths;
pub mod schema;
pub mod store;

pub use store::{IndexStore, SqliteStore, StoreTransaction};

use crate::error::{Error, Result};
use rusqlite::{Connection, Transaction};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// How long a writer waits for another connection's lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Create the database (and parent directories) and apply migrations
pub fn init(db_path: &str) -> Result<()> {
    info!("Initializing database at {}", db_path);

    let dir = paths::db_dir(db_path);
    if !dir.as_os_str().is_empty() && !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| {
            Error::InitError(format!("Failed to create {}: {e}", dir.display()))
        })?;
    }

    let conn = open(db_path)?;
    schema::migrate(&conn)?;
    Ok(())
}

/// Open a connection with the pragmas every caller expects
pub fn open(db_path: &str) -> Result<Connection> {
    if !Path::new(db_path).exists() {
        // Connection::open would silently create an empty database
        let dir = paths::db_dir(db_path);
        if !dir.as_os_str().is_empty() && !dir.exists() {
            return Err(Error::InitError(format!(
                "Database directory does not exist: {}",
                dir.display()
            )));
        }
    }

    let conn = Connection::open(db_path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    let mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    debug!("Opened {} (journal_mode={})", db_path, mode);
    Ok(conn)
}

/// Open a database, applying pending migrations first
pub fn open_and_migrate(db_path: &str) -> Result<Connection> {
    let conn = open(db_path)?;
    schema::migrate(&conn)?;
    Ok(conn)
}

/// Run `f` inside a transaction, committing on success
pub fn transaction<T, F>(conn: &mut Connection, f: F) -> Result<T>
where
    F: FnOnce(&Transaction) -> Result<T>,
{
    let tx = conn.transaction()?;
    let value = f(&tx)?;
    tx.commit()?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_and_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/reposync.db");
        let path = path.to_str().unwrap();

        init(path).unwrap();
        let conn = open(path).unwrap();
        let fk: i32 = conn.query_row("PRAGMA foreign_keys", [], |r| r.get(0)).unwrap();
        assert_eq!(fk, 1);
        let mode: String = conn.query_row("PRAGMA journal_mode", [], |r| r.get(0)).unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reposync.db");
        let path = path.to_str().unwrap();
        init(path).unwrap();
        let mut conn = open(path).unwrap();

        let result: Result<()> = transaction(&mut conn, |tx| {
            tx.execute(
                "INSERT INTO repositories (name, address) VALUES ('a', 'https://a')",
                [],
            )?;
            Err(Error::ParseError("boom".to_string()))
        });
        assert!(result.is_err());

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM repositories", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}

// src/db/store.rs

//! Transactional store the index updater commits through
//!
//! The updater never touches SQL. It opens a [`StoreTransaction`], applies a
//! whole index (or diff) and commits once. Dropping the transaction without
//! committing rolls everything back, so an aborted update leaves no trace.

use super::models::{IndexState, PackageRecord, Repository, VersionRecord};
use crate::error::{Error, Result};
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Persistence collaborator used by the updater
pub trait IndexStore: Send + Sync + 'static {
    /// Fresh copy of a repository record
    fn repository(&self, id: i64) -> Result<Option<Repository>>;

    /// Enabled repositories, heaviest first
    fn enabled_repositories(&self) -> Result<Vec<Repository>>;

    /// Start an isolated write transaction
    fn begin(&self) -> Result<Box<dyn StoreTransaction>>;
}

/// One all-or-nothing unit of work
pub trait StoreTransaction: Send {
    /// Record a verified index on the repository row
    ///
    /// Touches only what [`IndexState`] names, so management changes made
    /// while the update ran survive the commit.
    fn record_index(&mut self, repo_id: i64, state: &IndexState) -> Result<()>;

    /// Stored unified `repo` document (dictionaries, localized text)
    fn repo_document(&mut self, repo_id: i64) -> Result<Option<Value>>;
    fn store_repo_document(&mut self, repo_id: i64, document: &Value) -> Result<()>;

    /// Remove every package of a repository
    fn clear_packages(&mut self, repo_id: i64) -> Result<()>;
    fn upsert_package(&mut self, repo_id: i64, package_id: &str, metadata: &Value) -> Result<()>;
    fn package_metadata(&mut self, repo_id: i64, package_id: &str) -> Result<Option<Value>>;
    fn remove_package(&mut self, repo_id: i64, package_id: &str) -> Result<()>;

    fn upsert_version(
        &mut self,
        repo_id: i64,
        package_id: &str,
        version_id: &str,
        version: &Value,
    ) -> Result<()>;
    fn version(&mut self, repo_id: i64, package_id: &str, version_id: &str) -> Result<Option<Value>>;
    fn remove_version(&mut self, repo_id: i64, package_id: &str, version_id: &str) -> Result<()>;

    fn commit(self: Box<Self>) -> Result<()>;
    fn rollback(self: Box<Self>) -> Result<()>;
}

/// SQLite-backed store
///
/// Each transaction opens its own connection, so concurrent updates of
/// different repositories never share one.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db_path: PathBuf,
}

impl SqliteStore {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Open a plain connection for reads and management commands
    pub fn connect(&self) -> Result<Connection> {
        super::open(&self.path_str()?)
    }

    fn path_str(&self) -> Result<String> {
        self.db_path
            .to_str()
            .map(str::to_string)
            .ok_or_else(|| Error::InitError(format!("Non UTF-8 database path: {}", self.db_path.display())))
    }
}

impl IndexStore for SqliteStore {
    fn repository(&self, id: i64) -> Result<Option<Repository>> {
        let conn = self.connect()?;
        Repository::find_by_id(&conn, id)
    }

    fn enabled_repositories(&self) -> Result<Vec<Repository>> {
        let conn = self.connect()?;
        Repository::list_enabled(&conn)
    }

    fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let conn = self.connect()?;
        // IMMEDIATE takes the write lock up front instead of failing at first write
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(Box::new(SqliteTransaction {
            conn,
            finished: false,
        }))
    }
}

struct SqliteTransaction {
    conn: Connection,
    finished: bool,
}

impl StoreTransaction for SqliteTransaction {
    fn record_index(&mut self, repo_id: i64, state: &IndexState) -> Result<()> {
        Repository::record_index(&self.conn, repo_id, state)
    }

    fn repo_document(&mut self, repo_id: i64) -> Result<Option<Value>> {
        let raw: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT repo_json FROM repositories WHERE id = ?1",
                [repo_id],
                |row| row.get(0),
            )
            .optional()?;
        raw.flatten()
            .map(|json| serde_json::from_str(&json).map_err(Error::from))
            .transpose()
    }

    fn store_repo_document(&mut self, repo_id: i64, document: &Value) -> Result<()> {
        self.conn.execute(
            "UPDATE repositories SET repo_json = ?1 WHERE id = ?2",
            rusqlite::params![serde_json::to_string(document)?, repo_id],
        )?;
        Ok(())
    }

    fn clear_packages(&mut self, repo_id: i64) -> Result<()> {
        PackageRecord::delete_by_repository(&self.conn, repo_id)
    }

    fn upsert_package(&mut self, repo_id: i64, package_id: &str, metadata: &Value) -> Result<()> {
        PackageRecord::upsert(&self.conn, repo_id, package_id, metadata)
    }

    fn package_metadata(&mut self, repo_id: i64, package_id: &str) -> Result<Option<Value>> {
        Ok(PackageRecord::find(&self.conn, repo_id, package_id)?.map(|p| p.metadata))
    }

    fn remove_package(&mut self, repo_id: i64, package_id: &str) -> Result<()> {
        PackageRecord::delete(&self.conn, repo_id, package_id)
    }

    fn upsert_version(
        &mut self,
        repo_id: i64,
        package_id: &str,
        version_id: &str,
        version: &Value,
    ) -> Result<()> {
        VersionRecord::from_document(repo_id, package_id, version_id, version.clone())
            .upsert(&self.conn)
    }

    fn version(&mut self, repo_id: i64, package_id: &str, version_id: &str) -> Result<Option<Value>> {
        Ok(VersionRecord::find(&self.conn, repo_id, package_id, version_id)?.map(|v| v.data))
    }

    fn remove_version(&mut self, repo_id: i64, package_id: &str, version_id: &str) -> Result<()> {
        VersionRecord::delete(&self.conn, repo_id, package_id, version_id)
    }

    fn commit(mut self: Box<Self>) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        self.finished = true;
        debug!("Store transaction committed");
        Ok(())
    }

    fn rollback(mut self: Box<Self>) -> Result<()> {
        self.finished = true;
        self.conn.execute_batch("ROLLBACK")?;
        debug!("Store transaction rolled back");
        Ok(())
    }
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                warn!("Failed to roll back abandoned transaction: {}", e);
            }
        }
    }
}

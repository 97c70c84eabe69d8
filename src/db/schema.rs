// src/db/schema.rs

//! Database schema definitions and migrations
//!
//! The schema is versioned through `schema_version`; each migration runs
//! once, in order.

use crate::error::{Error, Result};
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

fn init_schema_version(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    init_schema_version(conn)?;

    let version = conn
        .query_row(
            "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?
        .unwrap_or(0);

    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Apply all pending migrations to bring the database up to date
pub fn migrate(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;
    debug!("Current schema version: {}", current_version);

    if current_version >= SCHEMA_VERSION {
        return Ok(());
    }

    for version in (current_version + 1)..=SCHEMA_VERSION {
        info!("Applying migration to version {}", version);
        apply_migration(conn, version)?;
        set_schema_version(conn, version)?;
    }

    info!("Schema migration complete. Now at version {}", SCHEMA_VERSION);
    Ok(())
}

fn apply_migration(conn: &Connection, version: i32) -> Result<()> {
    match version {
        1 => migrate_v1(conn),
        _ => Err(Error::InitError(format!(
            "Unknown migration version: {version}"
        ))),
    }
}

/// Initial schema - Version 1
///
/// - repositories: index sources, trust state and the stored repo document
/// - repository_mirrors: official, user-added and disabled mirrors
/// - packages: per-repository package metadata documents
/// - package_versions: version documents keyed by file hash
fn migrate_v1(conn: &Connection) -> Result<()> {
    debug!("Creating schema version 1");

    conn.execute_batch(
        "
        CREATE TABLE repositories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            address TEXT NOT NULL,
            description TEXT,
            certificate TEXT,
            format_version INTEGER,
            timestamp INTEGER NOT NULL DEFAULT 0,
            weight INTEGER NOT NULL DEFAULT 0,
            enabled INTEGER NOT NULL DEFAULT 1,
            last_updated TEXT,
            etag TEXT,
            repo_json TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE INDEX idx_repositories_enabled ON repositories(enabled);

        CREATE TABLE repository_mirrors (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            repository_id INTEGER NOT NULL,
            url TEXT NOT NULL,
            kind TEXT NOT NULL CHECK(kind IN ('official', 'user', 'disabled')),
            is_ipfs INTEGER NOT NULL DEFAULT 0,
            location TEXT,
            position INTEGER NOT NULL,
            UNIQUE(repository_id, kind, url),
            FOREIGN KEY (repository_id) REFERENCES repositories(id) ON DELETE CASCADE
        );

        CREATE INDEX idx_repository_mirrors_repo ON repository_mirrors(repository_id, kind, position);

        CREATE TABLE packages (
            repository_id INTEGER NOT NULL,
            package_id TEXT NOT NULL,
            metadata TEXT NOT NULL,
            PRIMARY KEY (repository_id, package_id),
            FOREIGN KEY (repository_id) REFERENCES repositories(id) ON DELETE CASCADE
        );

        CREATE TABLE package_versions (
            repository_id INTEGER NOT NULL,
            package_id TEXT NOT NULL,
            version_id TEXT NOT NULL,
            version_code INTEGER NOT NULL DEFAULT 0,
            channels TEXT,
            data TEXT NOT NULL,
            PRIMARY KEY (repository_id, package_id, version_id),
            FOREIGN KEY (repository_id, package_id)
                REFERENCES packages(repository_id, package_id) ON DELETE CASCADE
        );

        CREATE INDEX idx_package_versions_code ON package_versions(repository_id, package_id, version_code);
        ",
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_fresh_and_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_mirror_kind_constrained() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        conn.execute(
            "INSERT INTO repositories (name, address) VALUES ('r', 'https://r')",
            [],
        )
        .unwrap();
        let bad = conn.execute(
            "INSERT INTO repository_mirrors (repository_id, url, kind, position)
             VALUES (1, 'https://m', 'bogus', 0)",
            [],
        );
        assert!(bad.is_err());
    }
}

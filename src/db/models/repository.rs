// src/db/models/repository.rs

//! Repository model - a remote signed index source and its trust state

use crate::error::{Error, Result};
use crate::index::IndexFormat;
use crate::repository::{Mirror, same_base};
use crate::signing::Certificate;
use rusqlite::{Connection, OptionalExtension, Row, params};

/// Which list a mirror row belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorKind {
    /// Announced by the repository's own index
    Official,
    /// Added locally
    User,
    /// Excluded from the effective list (URL only)
    Disabled,
}

impl MirrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MirrorKind::Official => "official",
            MirrorKind::User => "user",
            MirrorKind::Disabled => "disabled",
        }
    }
}

/// Repository represents a remote index source
#[derive(Debug, Clone)]
pub struct Repository {
    pub id: Option<i64>,
    pub name: String,
    /// Canonical base URL
    pub address: String,
    pub description: Option<String>,
    /// Hex-encoded signing certificate; `None` until trust is established
    pub certificate: Option<String>,
    /// Format of the last applied index
    pub format_version: Option<IndexFormat>,
    /// Timestamp of the last applied index (0 when never updated)
    pub timestamp: i64,
    /// Update priority; heavier repositories update first
    pub weight: i32,
    pub enabled: bool,
    pub last_updated: Option<String>,
    /// Validator of the last downloaded legacy index
    pub etag: Option<String>,
    pub official_mirrors: Vec<Mirror>,
    pub user_mirrors: Vec<Mirror>,
    pub disabled_mirrors: Vec<String>,
    pub created_at: Option<String>,
}

/// Columns a verified index update owns
///
/// Name, weight, the enabled flag and the user and disabled mirror lists
/// belong to repository management; an update never writes them.
#[derive(Debug, Clone)]
pub struct IndexState {
    pub certificate: String,
    pub format_version: IndexFormat,
    pub timestamp: i64,
    pub etag: Option<String>,
    pub last_updated: String,
    /// Replaces the stored description when set
    pub description: Option<String>,
    /// Mirrors announced by the index
    pub official_mirrors: Vec<Mirror>,
}

const COLUMNS: &str = "id, name, address, description, certificate, format_version, timestamp,
                       weight, enabled, last_updated, etag, created_at";

impl Repository {
    /// Create a new, untrusted Repository
    pub fn new(name: String, address: String) -> Self {
        Self {
            id: None,
            name,
            address,
            description: None,
            certificate: None,
            format_version: None,
            timestamp: 0,
            weight: 0,
            enabled: true,
            last_updated: None,
            etag: None,
            official_mirrors: Vec::new(),
            user_mirrors: Vec::new(),
            disabled_mirrors: Vec::new(),
            created_at: None,
        }
    }

    /// Database ID, or an error for records that were never inserted
    pub fn require_id(&self) -> Result<i64> {
        self.id.ok_or_else(|| {
            Error::PreconditionError(format!("Repository {} has not been saved", self.name))
        })
    }

    /// Decoded signing certificate, if trust has been established
    pub fn certificate(&self) -> Result<Option<Certificate>> {
        self.certificate.as_deref().map(Certificate::from_hex).transpose()
    }

    /// Insert this repository (and its mirrors) into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO repositories (name, address, description, certificate, format_version,
                                       timestamp, weight, enabled, last_updated, etag)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                &self.name,
                &self.address,
                &self.description,
                &self.certificate,
                self.format_version.map(IndexFormat::as_i32),
                self.timestamp,
                self.weight,
                self.enabled as i32,
                &self.last_updated,
                &self.etag,
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        self.save_mirrors(conn)?;
        Ok(id)
    }

    /// Find a repository by ID
    pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM repositories WHERE id = ?1"))?;
        let repo = stmt.query_row([id], Self::from_row).optional()?;
        repo.map(|r| r.with_mirrors(conn)).transpose()
    }

    /// Find a repository by name
    pub fn find_by_name(conn: &Connection, name: &str) -> Result<Option<Self>> {
        let mut stmt =
            conn.prepare(&format!("SELECT {COLUMNS} FROM repositories WHERE name = ?1"))?;
        let repo = stmt.query_row([name], Self::from_row).optional()?;
        repo.map(|r| r.with_mirrors(conn)).transpose()
    }

    /// List all repositories, heaviest first
    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        Self::list_where(conn, "")
    }

    /// List enabled repositories, heaviest first
    pub fn list_enabled(conn: &Connection) -> Result<Vec<Self>> {
        Self::list_where(conn, "WHERE enabled = 1")
    }

    fn list_where(conn: &Connection, filter: &str) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM repositories {filter} ORDER BY weight DESC, name"
        ))?;
        let repos = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        repos.into_iter().map(|r| r.with_mirrors(conn)).collect()
    }

    /// Number of stored repositories
    pub fn count(conn: &Connection) -> Result<i64> {
        Ok(conn.query_row("SELECT COUNT(*) FROM repositories", [], |row| row.get(0))?)
    }

    /// Enable or disable a repository
    pub fn set_enabled(conn: &Connection, id: i64, enabled: bool) -> Result<()> {
        conn.execute(
            "UPDATE repositories SET enabled = ?1 WHERE id = ?2",
            params![enabled as i32, id],
        )?;
        Ok(())
    }

    /// Record a verified index
    ///
    /// Writes only the columns in [`IndexState`] and the official mirror
    /// list. Content-addressed gateways already among the official mirrors
    /// are kept after the announced ones; indexes never announce them.
    pub fn record_index(conn: &Connection, id: i64, state: &IndexState) -> Result<()> {
        let changed = conn.execute(
            "UPDATE repositories SET certificate = ?1, format_version = ?2, timestamp = ?3,
             etag = ?4, last_updated = ?5, description = COALESCE(?6, description)
             WHERE id = ?7",
            params![
                &state.certificate,
                state.format_version.as_i32(),
                state.timestamp,
                &state.etag,
                &state.last_updated,
                &state.description,
                id,
            ],
        )?;
        if changed == 0 {
            return Err(Error::PreconditionError(format!(
                "Repository {id} no longer exists"
            )));
        }

        let mut official = state.official_mirrors.clone();
        for stored in Self::load_mirrors(conn, id, MirrorKind::Official)? {
            if stored.is_ipfs && !official.iter().any(|m| same_base(&m.url, &stored.url)) {
                official.push(stored);
            }
        }
        Self::replace_mirrors(conn, id, MirrorKind::Official, &official)
    }

    /// Delete a repository by ID (mirrors and packages cascade)
    pub fn delete(conn: &Connection, id: i64) -> Result<()> {
        conn.execute("DELETE FROM repositories WHERE id = ?1", [id])?;
        Ok(())
    }

    /// Replace one of a repository's mirror lists
    ///
    /// Disabled entries only keep their URL.
    pub fn replace_mirrors(conn: &Connection, id: i64, kind: MirrorKind, mirrors: &[Mirror]) -> Result<()> {
        conn.execute(
            "DELETE FROM repository_mirrors WHERE repository_id = ?1 AND kind = ?2",
            params![id, kind.as_str()],
        )?;

        let mut stmt = conn.prepare(
            "INSERT OR IGNORE INTO repository_mirrors (repository_id, url, kind, is_ipfs, location, position)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        let keep_details = kind != MirrorKind::Disabled;
        for (position, mirror) in mirrors.iter().enumerate() {
            stmt.execute(params![
                id,
                &mirror.url,
                kind.as_str(),
                (keep_details && mirror.is_ipfs) as i32,
                mirror.location.as_ref().filter(|_| keep_details),
                position as i64,
            ])?;
        }
        Ok(())
    }

    fn load_mirrors(conn: &Connection, id: i64, kind: MirrorKind) -> Result<Vec<Mirror>> {
        let mut stmt = conn.prepare(
            "SELECT url, is_ipfs, location FROM repository_mirrors
             WHERE repository_id = ?1 AND kind = ?2 ORDER BY position",
        )?;
        let mirrors = stmt
            .query_map(params![id, kind.as_str()], |row| {
                Ok(Mirror {
                    url: row.get(0)?,
                    is_ipfs: row.get::<_, i32>(1)? != 0,
                    location: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(mirrors)
    }

    fn save_mirrors(&self, conn: &Connection) -> Result<()> {
        let id = self.require_id()?;
        let disabled: Vec<Mirror> = self.disabled_mirrors.iter().map(Mirror::new).collect();
        Self::replace_mirrors(conn, id, MirrorKind::Official, &self.official_mirrors)?;
        Self::replace_mirrors(conn, id, MirrorKind::User, &self.user_mirrors)?;
        Self::replace_mirrors(conn, id, MirrorKind::Disabled, &disabled)
    }

    fn with_mirrors(mut self, conn: &Connection) -> Result<Self> {
        let id = self.require_id()?;
        self.official_mirrors = Self::load_mirrors(conn, id, MirrorKind::Official)?;
        self.user_mirrors = Self::load_mirrors(conn, id, MirrorKind::User)?;
        self.disabled_mirrors = Self::load_mirrors(conn, id, MirrorKind::Disabled)?
            .into_iter()
            .map(|m| m.url)
            .collect();
        Ok(self)
    }

    /// Convert a database row to a Repository (mirrors loaded separately)
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            name: row.get(1)?,
            address: row.get(2)?,
            description: row.get(3)?,
            certificate: row.get(4)?,
            format_version: row
                .get::<_, Option<i32>>(5)?
                .and_then(IndexFormat::from_i32),
            timestamp: row.get(6)?,
            weight: row.get(7)?,
            enabled: row.get::<_, i32>(8)? != 0,
            last_updated: row.get(9)?,
            etag: row.get(10)?,
            official_mirrors: Vec::new(),
            user_mirrors: Vec::new(),
            disabled_mirrors: Vec::new(),
            created_at: row.get(11)?,
        })
    }
}

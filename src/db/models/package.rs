// src/db/models/package.rs

//! Package and version records indexed from a repository
//!
//! Both are stored as unified-format JSON documents. A few fields are lifted
//! into columns for ordering and filtering.

use crate::error::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde_json::Value;

/// Package metadata document
#[derive(Debug, Clone, PartialEq)]
pub struct PackageRecord {
    pub repository_id: i64,
    pub package_id: String,
    pub metadata: Value,
}

/// One version of a package, keyed by file hash
#[derive(Debug, Clone, PartialEq)]
pub struct VersionRecord {
    pub repository_id: i64,
    pub package_id: String,
    pub version_id: String,
    pub version_code: i64,
    pub release_channels: Vec<String>,
    pub data: Value,
}

impl PackageRecord {
    /// Insert or replace package metadata
    pub fn upsert(conn: &Connection, repository_id: i64, package_id: &str, metadata: &Value) -> Result<()> {
        conn.execute(
            "INSERT INTO packages (repository_id, package_id, metadata) VALUES (?1, ?2, ?3)
             ON CONFLICT(repository_id, package_id) DO UPDATE SET metadata = excluded.metadata",
            params![repository_id, package_id, serde_json::to_string(metadata)?],
        )?;
        Ok(())
    }

    pub fn find(conn: &Connection, repository_id: i64, package_id: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT repository_id, package_id, metadata FROM packages
             WHERE repository_id = ?1 AND package_id = ?2",
        )?;
        stmt.query_row(params![repository_id, package_id], Self::from_row)
            .optional()?
            .map(Self::decode)
            .transpose()
    }

    /// List a repository's packages ordered by identifier
    pub fn find_by_repository(conn: &Connection, repository_id: i64) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT repository_id, package_id, metadata FROM packages
             WHERE repository_id = ?1 ORDER BY package_id",
        )?;
        let rows = stmt
            .query_map([repository_id], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter().map(Self::decode).collect()
    }

    pub fn count_by_repository(conn: &Connection, repository_id: i64) -> Result<i64> {
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM packages WHERE repository_id = ?1",
            [repository_id],
            |row| row.get(0),
        )?)
    }

    /// Delete a package and its versions
    pub fn delete(conn: &Connection, repository_id: i64, package_id: &str) -> Result<()> {
        conn.execute(
            "DELETE FROM package_versions WHERE repository_id = ?1 AND package_id = ?2",
            params![repository_id, package_id],
        )?;
        conn.execute(
            "DELETE FROM packages WHERE repository_id = ?1 AND package_id = ?2",
            params![repository_id, package_id],
        )?;
        Ok(())
    }

    /// Delete all packages for a repository (full index replacement)
    pub fn delete_by_repository(conn: &Connection, repository_id: i64) -> Result<()> {
        conn.execute(
            "DELETE FROM package_versions WHERE repository_id = ?1",
            [repository_id],
        )?;
        conn.execute("DELETE FROM packages WHERE repository_id = ?1", [repository_id])?;
        Ok(())
    }

    fn from_row(row: &Row) -> rusqlite::Result<(i64, String, String)> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
    }

    fn decode((repository_id, package_id, metadata): (i64, String, String)) -> Result<Self> {
        Ok(Self {
            repository_id,
            package_id,
            metadata: serde_json::from_str(&metadata)?,
        })
    }
}

impl VersionRecord {
    /// Build a record from a unified version document
    pub fn from_document(repository_id: i64, package_id: &str, version_id: &str, data: Value) -> Self {
        let version_code = data
            .pointer("/manifest/versionCode")
            .and_then(Value::as_i64)
            .unwrap_or(0);
        let release_channels = data
            .get("releaseChannels")
            .and_then(Value::as_array)
            .map(|channels| {
                channels
                    .iter()
                    .filter_map(|c| c.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            repository_id,
            package_id: package_id.to_string(),
            version_id: version_id.to_string(),
            version_code,
            release_channels,
            data,
        }
    }

    /// Insert or replace a version
    pub fn upsert(&self, conn: &Connection) -> Result<()> {
        let channels = if self.release_channels.is_empty() {
            None
        } else {
            Some(self.release_channels.join(","))
        };
        conn.execute(
            "INSERT INTO package_versions (repository_id, package_id, version_id, version_code, channels, data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(repository_id, package_id, version_id) DO UPDATE SET
                version_code = excluded.version_code,
                channels = excluded.channels,
                data = excluded.data",
            params![
                self.repository_id,
                &self.package_id,
                &self.version_id,
                self.version_code,
                channels,
                serde_json::to_string(&self.data)?,
            ],
        )?;
        Ok(())
    }

    pub fn find(
        conn: &Connection,
        repository_id: i64,
        package_id: &str,
        version_id: &str,
    ) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT repository_id, package_id, version_id, version_code, channels, data
             FROM package_versions
             WHERE repository_id = ?1 AND package_id = ?2 AND version_id = ?3",
        )?;
        stmt.query_row(params![repository_id, package_id, version_id], Self::from_row)
            .optional()?
            .map(Self::decode)
            .transpose()
    }

    /// Versions of a package, newest version code first
    pub fn find_by_package(conn: &Connection, repository_id: i64, package_id: &str) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT repository_id, package_id, version_id, version_code, channels, data
             FROM package_versions
             WHERE repository_id = ?1 AND package_id = ?2
             ORDER BY version_code DESC, version_id",
        )?;
        let rows = stmt
            .query_map(params![repository_id, package_id], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter().map(Self::decode).collect()
    }

    pub fn delete(conn: &Connection, repository_id: i64, package_id: &str, version_id: &str) -> Result<()> {
        conn.execute(
            "DELETE FROM package_versions
             WHERE repository_id = ?1 AND package_id = ?2 AND version_id = ?3",
            params![repository_id, package_id, version_id],
        )?;
        Ok(())
    }

    /// Whether this version is on the stable channel
    pub fn is_stable(&self) -> bool {
        self.release_channels.is_empty()
    }

    #[allow(clippy::type_complexity)]
    fn from_row(row: &Row) -> rusqlite::Result<(i64, String, String, i64, Option<String>, String)> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
        ))
    }

    fn decode(
        (repository_id, package_id, version_id, version_code, channels, data): (
            i64,
            String,
            String,
            i64,
            Option<String>,
            String,
        ),
    ) -> Result<Self> {
        Ok(Self {
            repository_id,
            package_id,
            version_id,
            version_code,
            release_channels: channels
                .map(|c| c.split(',').map(str::to_string).collect())
                .unwrap_or_default(),
            data: serde_json::from_str(&data)?,
        })
    }
}

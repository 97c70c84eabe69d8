// src/repository/bootstrap.rs

//! First-run seeding of default repositories

use super::mirror::Mirror;
use crate::db::models::Repository;
use crate::error::{Error, Result};
use crate::signing::Certificate;
use rusqlite::Connection;
use serde::Deserialize;
use tracing::{debug, info};

/// Repository list shipped with the binary
pub const DEFAULT_REPOSITORIES: &str = include_str!("../../data/default_repos.json");

/// One entry of a bootstrap list
#[derive(Debug, Clone, Deserialize)]
pub struct DefaultRepository {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub mirrors: Vec<MirrorSeed>,
    #[serde(default)]
    pub description: Option<String>,
    /// Hex-encoded certificate; pins the repository from the start
    #[serde(default)]
    pub certificate: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub weight: i32,
}

/// Mirrors may be bare URLs or full descriptors
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MirrorSeed {
    Url(String),
    Full(Mirror),
}

fn default_enabled() -> bool {
    true
}

impl From<MirrorSeed> for Mirror {
    fn from(seed: MirrorSeed) -> Self {
        match seed {
            MirrorSeed::Url(url) => Mirror::new(url),
            MirrorSeed::Full(mirror) => mirror,
        }
    }
}

/// Parse a bootstrap list
pub fn parse_default_repositories(json: &str) -> Result<Vec<DefaultRepository>> {
    let repos: Vec<DefaultRepository> = serde_json::from_str(json)
        .map_err(|e| Error::ParseError(format!("Invalid repository list: {e}")))?;

    for repo in &repos {
        if let Some(cert) = &repo.certificate {
            Certificate::from_hex(cert).map_err(|e| {
                Error::ParseError(format!("Repository '{}' has a bad certificate: {e}", repo.name))
            })?;
        }
    }
    Ok(repos)
}

/// Insert `defaults` into an empty store
///
/// Returns how many repositories were added; zero when the store already
/// holds any repository.
pub fn seed_default_repositories(conn: &Connection, defaults: Vec<DefaultRepository>) -> Result<usize> {
    if Repository::count(conn)? > 0 {
        debug!("Repositories already present; skipping bootstrap");
        return Ok(0);
    }

    let count = defaults.len();
    for default in defaults {
        let mut repo = Repository::new(default.name, default.address);
        repo.description = default.description;
        repo.certificate = default.certificate.map(|c| c.to_ascii_lowercase());
        repo.enabled = default.enabled;
        repo.weight = default.weight;
        repo.official_mirrors = default.mirrors.into_iter().map(Mirror::from).collect();
        repo.insert(conn)?;
        info!("Seeded repository: {} ({})", repo.name, repo.address);
    }
    Ok(count)
}

/// Seed the bundled default list
pub fn seed_bundled_repositories(conn: &Connection) -> Result<usize> {
    seed_default_repositories(conn, parse_default_repositories(DEFAULT_REPOSITORIES)?)
}

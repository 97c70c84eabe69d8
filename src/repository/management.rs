// src/repository/management.rs

//! Repository management operations
//!
//! Functions for adding, removing, enabling/disabling repositories and
//! editing their mirror lists.

use super::mirror::{Mirror, same_base};
use crate::db::models::{MirrorKind, Repository};
use crate::error::{Error, Result};
use crate::hash::normalize_fingerprint;
use rusqlite::Connection;
use tracing::info;
use url::Url;

fn find(conn: &Connection, name: &str) -> Result<Repository> {
    Repository::find_by_name(conn, name)?
        .ok_or_else(|| Error::NotFoundError(format!("Repository '{name}' not found")))
}

fn validate_url(url: &str) -> Result<()> {
    let parsed =
        Url::parse(url).map_err(|e| Error::ParseError(format!("Invalid URL '{url}': {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::ParseError(format!(
            "Unsupported URL scheme '{}' in {url}",
            parsed.scheme()
        )));
    }
    Ok(())
}

/// Add a new repository to the database
pub fn add_repository(
    conn: &Connection,
    name: String,
    address: String,
    enabled: bool,
    weight: i32,
) -> Result<Repository> {
    validate_url(&address)?;

    if Repository::find_by_name(conn, &name)?.is_some() {
        return Err(Error::ConflictError(format!(
            "Repository '{name}' already exists"
        )));
    }
    if let Some(existing) = Repository::list_all(conn)?
        .into_iter()
        .find(|r| same_base(&r.address, &address))
    {
        return Err(Error::ConflictError(format!(
            "Address {address} is already used by repository '{}'",
            existing.name
        )));
    }

    let mut repo = Repository::new(name, address);
    repo.enabled = enabled;
    repo.weight = weight;
    repo.insert(conn)?;

    info!("Added repository: {} ({})", repo.name, repo.address);
    Ok(repo)
}

/// Remove a repository and everything indexed from it
pub fn remove_repository(conn: &Connection, name: &str) -> Result<()> {
    let repo = find(conn, name)?;
    Repository::delete(conn, repo.require_id()?)?;
    info!("Removed repository: {}", name);
    Ok(())
}

/// Enable or disable a repository
pub fn set_repository_enabled(conn: &Connection, name: &str, enabled: bool) -> Result<()> {
    let repo = find(conn, name)?;
    Repository::set_enabled(conn, repo.require_id()?, enabled)?;

    info!(
        "Repository '{}' {}",
        name,
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}

/// Add a user mirror
pub fn add_user_mirror(conn: &Connection, name: &str, mirror: Mirror) -> Result<()> {
    validate_url(&mirror.url)?;
    let mut repo = find(conn, name)?;
    if repo.user_mirrors.iter().any(|m| same_base(&m.url, &mirror.url)) {
        return Err(Error::ConflictError(format!(
            "Mirror {} already added to '{name}'",
            mirror.url
        )));
    }
    info!("Adding mirror {} to repository '{}'", mirror.url, name);
    repo.user_mirrors.push(mirror);
    Repository::replace_mirrors(conn, repo.require_id()?, MirrorKind::User, &repo.user_mirrors)
}

/// Remove a user mirror
pub fn remove_user_mirror(conn: &Connection, name: &str, url: &str) -> Result<()> {
    let mut repo = find(conn, name)?;
    let before = repo.user_mirrors.len();
    repo.user_mirrors.retain(|m| !same_base(&m.url, url));
    if repo.user_mirrors.len() == before {
        return Err(Error::NotFoundError(format!(
            "Mirror {url} is not a user mirror of '{name}'"
        )));
    }
    info!("Removed mirror {} from repository '{}'", url, name);
    Repository::replace_mirrors(conn, repo.require_id()?, MirrorKind::User, &repo.user_mirrors)
}

/// Exclude or re-include any mirror, official ones included
pub fn set_mirror_enabled(conn: &Connection, name: &str, url: &str, enabled: bool) -> Result<()> {
    let mut repo = find(conn, name)?;
    if enabled {
        repo.disabled_mirrors.retain(|d| !same_base(d, url));
    } else if !repo.disabled_mirrors.iter().any(|d| same_base(d, url)) {
        repo.disabled_mirrors.push(url.to_string());
    }
    info!(
        "Mirror {} {} for repository '{}'",
        url,
        if enabled { "enabled" } else { "disabled" },
        name
    );
    let disabled: Vec<Mirror> = repo.disabled_mirrors.iter().map(Mirror::new).collect();
    Repository::replace_mirrors(conn, repo.require_id()?, MirrorKind::Disabled, &disabled)
}

/// Normalise and sanity-check a user-supplied certificate fingerprint
pub fn parse_fingerprint(fingerprint: &str) -> Result<String> {
    let normalized = normalize_fingerprint(fingerprint);
    if normalized.len() != 64 || !normalized.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::ParseError(format!(
            "Fingerprint must be 64 hex digits, got '{fingerprint}'"
        )));
    }
    Ok(normalized)
}

// src/commands/repo.rs
//! Repository management commands

use super::find_repository;
use anyhow::Result;
use reposync::Mirror;
use reposync::db::models::{PackageRecord, Repository};
use rusqlite::Connection;
use reposync::repository::{self, effective_mirrors};
use tracing::info;

/// Create the database, seeding the bundled repositories unless told not to
pub fn cmd_init(db_path: &str, seed: bool) -> Result<()> {
    info!("Initializing reposync database at: {}", db_path);
    reposync::db::init(db_path)?;
    println!("Database initialized successfully at: {}", db_path);

    if seed {
        let mut conn = reposync::db::open(db_path)?;
        let added = reposync::db::transaction(&mut conn, |tx| {
            repository::seed_bundled_repositories(tx)
        })?;
        if added > 0 {
            println!("Added {} default repositories", added);
        }
    }
    Ok(())
}

/// Seed repositories from a list (or the bundled one) into an empty database
pub fn cmd_bootstrap(file: Option<&str>, db_path: &str) -> Result<()> {
    let defaults = match file {
        Some(path) => {
            info!("Bootstrapping repositories from {}", path);
            let content = std::fs::read_to_string(path)
                .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path, e))?;
            repository::parse_default_repositories(&content)?
        }
        None => repository::parse_default_repositories(repository::DEFAULT_REPOSITORIES)?,
    };

    let mut conn = reposync::db::open_and_migrate(db_path)?;
    let added = reposync::db::transaction(&mut conn, |tx| {
        repository::seed_default_repositories(tx, defaults)
    })?;
    if added == 0 {
        println!("Database already has repositories; nothing seeded");
    } else {
        println!("Seeded {} repositories", added);
    }
    Ok(())
}

/// Add a new repository
pub fn cmd_repo_add(name: &str, url: &str, db_path: &str, enabled: bool, weight: i32) -> Result<()> {
    info!("Adding repository: {} ({})", name, url);
    let conn = reposync::db::open(db_path)?;
    let repo = repository::add_repository(&conn, name.to_string(), url.to_string(), enabled, weight)?;
    println!("Added repository: {}", repo.name);
    println!("  URL: {}", repo.address);
    println!("  Enabled: {}", repo.enabled);
    println!("  Weight: {}", repo.weight);
    println!("  Run 'reposync update {}' to establish trust", repo.name);
    Ok(())
}

fn describe(conn: &Connection, repo: &Repository) -> String {
    let trust = match repo.certificate() {
        Ok(Some(cert)) => {
            let fp = cert.fingerprint();
            format!("signer {}", &fp[..16])
        }
        Ok(None) => "untrusted".to_string(),
        Err(_) => "invalid certificate".to_string(),
    };
    let sync = match (&repo.format_version, &repo.last_updated) {
        (Some(format), Some(at)) => format!("{} index, updated {}", format, at),
        _ => "never updated".to_string(),
    };
    let packages = repo
        .id
        .and_then(|id| PackageRecord::count_by_repository(conn, id).ok())
        .unwrap_or(0);
    format!("weight: {}, {}, {}, {} packages", repo.weight, trust, sync, packages)
}

/// List repositories
pub fn cmd_repo_list(db_path: &str, all: bool) -> Result<()> {
    info!("Listing repositories");
    let conn = reposync::db::open(db_path)?;
    let repos = if all {
        Repository::list_all(&conn)?
    } else {
        Repository::list_enabled(&conn)?
    };

    if repos.is_empty() {
        println!("No repositories configured");
        return Ok(());
    }

    println!("Repositories:");
    for repo in repos {
        let enabled_mark = if repo.enabled { "[x]" } else { "[ ]" };
        println!("  {} {} ({})", enabled_mark, repo.name, describe(&conn, &repo));
        println!("      {}", repo.address);
        for mirror in effective_mirrors(&repo) {
            if mirror.is_address(&repo.address) {
                continue;
            }
            let kind = if mirror.is_ipfs { " (ipfs)" } else { "" };
            match &mirror.location {
                Some(location) => println!("      mirror [{}] {}{}", location, mirror.url, kind),
                None => println!("      mirror {}{}", mirror.url, kind),
            }
        }
        for url in &repo.disabled_mirrors {
            println!("      disabled {}", url);
        }
    }
    Ok(())
}

/// Remove a repository
pub fn cmd_repo_remove(name: &str, db_path: &str) -> Result<()> {
    info!("Removing repository: {}", name);
    let conn = reposync::db::open(db_path)?;
    repository::remove_repository(&conn, name)?;
    println!("Removed repository: {}", name);
    Ok(())
}

/// Enable or disable a repository
pub fn cmd_repo_enable(name: &str, db_path: &str, enabled: bool) -> Result<()> {
    let verb = if enabled { "Enabled" } else { "Disabled" };
    info!("{} repository: {}", verb, name);
    let conn = reposync::db::open(db_path)?;
    repository::set_repository_enabled(&conn, name, enabled)?;
    println!("{} repository: {}", verb, name);
    Ok(())
}

/// Add a user mirror
pub fn cmd_mirror_add(
    name: &str,
    url: &str,
    ipfs: bool,
    location: Option<String>,
    db_path: &str,
) -> Result<()> {
    let conn = reposync::db::open(db_path)?;
    find_repository(&conn, name)?;

    let mut mirror = if ipfs {
        Mirror::ipfs_gateway(url)
    } else {
        Mirror::new(url)
    };
    mirror.location = location;
    repository::add_user_mirror(&conn, name, mirror)?;
    println!("Added mirror {} to {}", url, name);
    Ok(())
}

/// Remove a user mirror
pub fn cmd_mirror_remove(name: &str, url: &str, db_path: &str) -> Result<()> {
    let conn = reposync::db::open(db_path)?;
    repository::remove_user_mirror(&conn, name, url)?;
    println!("Removed mirror {} from {}", url, name);
    Ok(())
}

/// Enable or disable any mirror of a repository
pub fn cmd_mirror_enable(name: &str, url: &str, db_path: &str, enabled: bool) -> Result<()> {
    let conn = reposync::db::open(db_path)?;
    repository::set_mirror_enabled(&conn, name, url, enabled)?;
    let verb = if enabled { "Enabled" } else { "Disabled" };
    println!("{} mirror {} of {}", verb, url, name);
    Ok(())
}

// src/commands/update.rs
//! Repository index update command

use super::find_repository;
use anyhow::Result;
use reposync::db::SqliteStore;
use reposync::{
    CliProgress, DnsCache, HttpDownloader, IndexUpdater, LogProgress, SyncConfig, UpdateResult,
};
use std::sync::Arc;
use tracing::info;

fn build_updater(db_path: &str, config: &SyncConfig) -> Result<IndexUpdater> {
    let dns = Arc::new(DnsCache::new(config.network.dns_cache_enabled));
    let downloader = HttpDownloader::new(&config.network, dns)?;
    let store = SqliteStore::new(db_path);
    Ok(IndexUpdater::new(Arc::new(store), Arc::new(downloader), config))
}

/// Update one repository, or every enabled repository
pub async fn cmd_update(
    name: Option<&str>,
    fingerprint: Option<&str>,
    db_path: &str,
    config: &SyncConfig,
) -> Result<()> {
    let conn = reposync::db::open_and_migrate(db_path)?;

    let Some(name) = name else {
        if fingerprint.is_some() {
            anyhow::bail!("--fingerprint requires a repository name");
        }
        drop(conn);
        return update_all(db_path, config).await;
    };

    let repo = find_repository(&conn, name)?;
    drop(conn);
    if !repo.enabled {
        anyhow::bail!("Repository '{}' is disabled", name);
    }

    let updater = build_updater(db_path, config)?.with_progress(Arc::new(CliProgress::new()));
    let result = match (&repo.certificate, fingerprint) {
        (Some(_), Some(_)) => {
            anyhow::bail!(
                "Repository '{}' is already trusted; --fingerprint only applies to its first update",
                name
            );
        }
        (Some(_), None) => updater.update(&repo).await,
        (None, expected) => {
            info!("Establishing trust for {}", repo.name);
            updater.update_new_repo(&repo, expected).await
        }
    };

    match result {
        UpdateResult::Processed => println!("Updated {}", repo.name),
        UpdateResult::Unchanged => println!("{} is up to date", repo.name),
        UpdateResult::NotFound => {
            anyhow::bail!("No index found for {} at any mirror", repo.name)
        }
        UpdateResult::Error(e) => return Err(e.into()),
    }
    Ok(())
}

async fn update_all(db_path: &str, config: &SyncConfig) -> Result<()> {
    let updater = build_updater(db_path, config)?.with_progress(Arc::new(LogProgress::new("update")));
    let results = updater.update_all().await?;

    if results.is_empty() {
        println!("No repositories to update");
        return Ok(());
    }

    let total = results.len();
    let mut failed = 0;
    for (repo, result) in &results {
        if !result.is_success() {
            failed += 1;
        }
        println!("  {}: {}", repo.name, result);
    }

    if failed > 0 {
        anyhow::bail!("{} of {} repositories failed to update", failed, total);
    }
    println!("Updated {} repositories", total);
    Ok(())
}

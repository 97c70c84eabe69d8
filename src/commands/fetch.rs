// src/commands/fetch.rs
//! Artifact download command

use super::find_repository;
use anyhow::Result;
use reposync::repository::effective_mirrors;
use reposync::{
    ArtifactSource, ArtifactTarget, CliProgress, DnsCache, FetchOutcome, FetchRequest,
    HttpDownloader, SyncConfig,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Download an artifact from a repository's mirrors, verifying it on the way
pub async fn cmd_fetch(
    repo_name: &str,
    name: &str,
    sha256: Option<&str>,
    size: Option<u64>,
    output: Option<&str>,
    db_path: &str,
    config: &SyncConfig,
) -> Result<()> {
    let conn = reposync::db::open(db_path)?;
    let repo = find_repository(&conn, repo_name)?;
    drop(conn);

    let dest = match output {
        Some(path) => PathBuf::from(path),
        None => Path::new(name)
            .file_name()
            .map(PathBuf::from)
            .ok_or_else(|| anyhow::anyhow!("Cannot derive a file name from '{}'", name))?,
    };

    let mut target = ArtifactTarget::named(name);
    if let Some(hash) = sha256 {
        target = target.with_sha256(hash);
    }
    if let Some(size) = size {
        target = target.with_size(size);
    }
    if target.sha256.is_none() {
        println!("Warning: no --sha256 given; the download is not integrity-checked");
    }

    let dns = Arc::new(DnsCache::new(config.network.dns_cache_enabled));
    let downloader = HttpDownloader::new(&config.network, dns)?;
    let mirrors = effective_mirrors(&repo);
    let progress = CliProgress::new();

    info!("Fetching {} from {} ({} mirrors)", name, repo.name, mirrors.len());
    let outcome = downloader
        .fetch(FetchRequest {
            address: &repo.address,
            mirrors: &mirrors,
            target: &target,
            dest: &dest,
            validator: None,
            cancel: None,
            progress: &progress,
        })
        .await?;

    match outcome {
        FetchOutcome::Downloaded(downloaded) => {
            println!("Downloaded {}", downloaded.path.display());
            println!("  Size: {} bytes", downloaded.bytes);
            println!("  SHA-256: {}", downloaded.sha256);
            println!("  Mirror: {}", downloaded.mirror);
            Ok(())
        }
        FetchOutcome::Unchanged => anyhow::bail!("Mirror reported {} unchanged", name),
    }
}

// src/update/mod.rs

//! Index updater
//!
//! One update walks `Idle -> Downloading -> Verifying -> Parsing ->
//! Committing` and ends in exactly one [`UpdateResult`]. The unified format
//! (`entry.jar`) is tried first; a repository that does not publish one is
//! updated from the legacy `index-v1.jar`.
//!
//! Trust rules:
//! - [`IndexUpdater::update_new_repo`] accepts the first certificate that
//!   verifies, or only the one matching a caller-supplied fingerprint
//! - [`IndexUpdater::update`] accepts only the stored certificate
//!
//! Everything a single update writes goes through one store transaction,
//! committed after the last record. Any failure before that point, a
//! cancellation included, leaves the store exactly as it was.
//!
//! No retries happen here. Mirror fallback lives in the downloader and DNS
//! recovery in the resolver.

mod lock;
mod task;
mod v1;
mod v2;

pub use task::UpdateTask;

use crate::config::SyncConfig;
use crate::db::models::{IndexState, Repository};
use crate::db::{IndexStore, paths};
use crate::download::{ArtifactSource, ArtifactTarget, FetchOutcome, FetchRequest};
use crate::error::{Error, Result};
use crate::hash::normalize_fingerprint;
use crate::index::{DEFAULT_LOCALE, IndexFormat, LocalizedText, RepoV2};
use crate::progress::{SilentProgress, UpdateProgress};
use crate::repository::{Mirror, effective_mirrors};
use crate::signing::{Certificate, ExpectedSigner};
use futures::StreamExt;
use lock::RepoLocks;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::TempDir;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Observable outcome of one synchronisation attempt
#[derive(Debug)]
pub enum UpdateResult {
    /// Remote content matched what is stored; nothing written
    Unchanged,
    /// A new index was verified and committed
    Processed,
    /// The repository's index is gone (removed or archived)
    NotFound,
    /// Anything else; nothing was written
    Error(Error),
}

impl UpdateResult {
    fn from_outcome(outcome: Result<Applied>) -> Self {
        match outcome {
            Ok(Applied::Processed) => UpdateResult::Processed,
            Ok(Applied::Unchanged) => UpdateResult::Unchanged,
            Err(e) if e.is_not_found() => UpdateResult::NotFound,
            Err(e) => UpdateResult::Error(e),
        }
    }

    /// Whether the update ran to completion
    pub fn is_success(&self) -> bool {
        matches!(self, UpdateResult::Unchanged | UpdateResult::Processed)
    }
}

impl fmt::Display for UpdateResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateResult::Unchanged => write!(f, "unchanged"),
            UpdateResult::Processed => write!(f, "updated"),
            UpdateResult::NotFound => write!(f, "index not found"),
            UpdateResult::Error(e) => write!(f, "failed: {e}"),
        }
    }
}

/// Phases of a single update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateState {
    Idle,
    Downloading,
    Verifying,
    Parsing,
    Committing,
}

impl fmt::Display for UpdateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UpdateState::Idle => "idle",
            UpdateState::Downloading => "downloading",
            UpdateState::Verifying => "verifying",
            UpdateState::Parsing => "parsing",
            UpdateState::Committing => "committing",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Applied {
    Unchanged,
    Processed,
}

/// Signer an update will accept
#[derive(Debug, Clone)]
enum Trust {
    Pinned(Certificate),
    Fingerprint(String),
    FirstUse,
}

impl Trust {
    fn expected(&self) -> ExpectedSigner<'_> {
        match self {
            Trust::Pinned(certificate) => ExpectedSigner::Pinned(certificate),
            Trust::Fingerprint(fingerprint) => ExpectedSigner::Fingerprint(fingerprint),
            Trust::FirstUse => ExpectedSigner::FirstUse,
        }
    }

    fn for_new_repo(repo: &Repository, expected_fingerprint: Option<&str>) -> Result<Self> {
        if repo.certificate.is_some() {
            return Err(Error::PreconditionError(format!(
                "Repository {} is already trusted; use update",
                repo.name
            )));
        }
        Ok(match expected_fingerprint {
            Some(fingerprint) => Trust::Fingerprint(normalize_fingerprint(fingerprint)),
            None => Trust::FirstUse,
        })
    }

    fn for_trusted_repo(repo: &Repository) -> Result<Self> {
        repo.certificate()?.map(Trust::Pinned).ok_or_else(|| {
            Error::PreconditionError(format!(
                "Repository {} has no certificate; use update_new_repo",
                repo.name
            ))
        })
    }
}

/// Run blocking work (zip, JSON, SQLite) off the async workers
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::InitError(format!("Background task failed: {e}")))?
}

fn ensure_not_cancelled(cancel: &AtomicBool) -> Result<()> {
    if cancel.load(Ordering::Relaxed) {
        return Err(Error::Cancelled);
    }
    Ok(())
}

/// Best text for `locale` from a localized map
fn localized(text: &LocalizedText, locale: &str) -> Option<String> {
    text.get(locale)
        .or_else(|| text.get(DEFAULT_LOCALE))
        .or_else(|| text.values().next())
        .cloned()
}

/// Repository state recorded when a verified index commits
///
/// Announced mirrors replace the official list; the canonical address is
/// kept at the front so it is still tried first.
fn index_state(
    address: &str,
    certificate: &Certificate,
    format: IndexFormat,
    timestamp: i64,
    etag: Option<String>,
    index_repo: &RepoV2,
    locale: &str,
) -> IndexState {
    let mut mirrors: Vec<Mirror> = index_repo
        .mirrors
        .iter()
        .map(|m| Mirror {
            url: m.url.clone(),
            is_ipfs: false,
            location: m.location.clone(),
        })
        .collect();
    if !mirrors.is_empty() && !mirrors.iter().any(|m| m.is_address(address)) {
        mirrors.insert(0, Mirror::new(address));
    }

    IndexState {
        certificate: certificate.to_hex(),
        format_version: format,
        timestamp,
        etag,
        last_updated: chrono::Utc::now().to_rfc3339(),
        description: localized(&index_repo.description, locale),
        official_mirrors: mirrors,
    }
}

/// Per-update state shared by the format-specific flows
struct UpdateContext<'a> {
    updater: &'a IndexUpdater,
    repo: &'a Repository,
    repo_id: i64,
    trust: &'a Trust,
    cancel: Arc<AtomicBool>,
    mirrors: Vec<Mirror>,
    scratch: TempDir,
}

impl UpdateContext<'_> {
    fn enter(&self, state: UpdateState) {
        debug!("Repository {}: {}", self.repo.name, state);
        self.updater
            .progress
            .set_message(&format!("{}: {}", self.repo.name, state));
    }

    /// Download into this update's scratch directory
    async fn download(&self, target: &ArtifactTarget, validator: Option<&str>) -> Result<FetchOutcome> {
        ensure_not_cancelled(&self.cancel)?;
        let file_name = target.name.trim_start_matches('/').replace('/', "_");
        let dest = self.scratch.path().join(file_name);
        self.updater
            .source
            .fetch(FetchRequest {
                address: &self.repo.address,
                mirrors: &self.mirrors,
                target,
                dest: &dest,
                validator,
                cancel: Some(self.cancel.as_ref()),
                progress: self.updater.progress.as_ref(),
            })
            .await
    }

    /// Whether an index with `timestamp` should be applied
    ///
    /// Equal timestamps mean nothing changed; older ones are a rollback.
    fn is_newer(&self, timestamp: i64) -> Result<bool> {
        let stored = self.repo.timestamp;
        if self.repo.format_version.is_none() || timestamp > stored {
            Ok(true)
        } else if timestamp == stored {
            debug!("Repository {} already at {}", self.repo.name, stored);
            Ok(false)
        } else {
            Err(Error::StaleIndex {
                index: timestamp,
                stored,
            })
        }
    }
}

/// Updates repositories from their signed indexes
pub struct IndexUpdater {
    store: Arc<dyn IndexStore>,
    source: Arc<dyn ArtifactSource>,
    progress: Arc<dyn UpdateProgress>,
    cache_dir: PathBuf,
    max_download_size: u64,
    max_concurrent: usize,
    locale: String,
    locks: RepoLocks,
    permits: Semaphore,
}

impl IndexUpdater {
    pub fn new(store: Arc<dyn IndexStore>, source: Arc<dyn ArtifactSource>, config: &SyncConfig) -> Self {
        let max_concurrent = config.update.max_concurrent_updates.max(1);
        Self {
            store,
            source,
            progress: Arc::new(SilentProgress::new()),
            cache_dir: config.update.cache_dir(),
            max_download_size: config.network.max_download_size,
            max_concurrent,
            locale: DEFAULT_LOCALE.to_string(),
            locks: RepoLocks::new(),
            permits: Semaphore::new(max_concurrent),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn UpdateProgress>) -> Self {
        self.progress = progress;
        self
    }

    /// Locale used when converting legacy text
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    /// Whether an update of `repo_id` is currently running
    pub fn is_updating(&self, repo_id: i64) -> bool {
        self.locks.is_busy(repo_id)
    }

    /// First update of a repository with no stored certificate
    ///
    /// With `expected_fingerprint`, only a certificate with that fingerprint
    /// is accepted; without it, the first certificate that verifies is
    /// trusted and persisted.
    pub async fn update_new_repo(&self, repo: &Repository, expected_fingerprint: Option<&str>) -> UpdateResult {
        match Trust::for_new_repo(repo, expected_fingerprint) {
            Ok(trust) => self.run(repo, trust, Arc::new(AtomicBool::new(false))).await,
            Err(e) => UpdateResult::Error(e),
        }
    }

    /// Update a repository whose certificate is already pinned
    pub async fn update(&self, repo: &Repository) -> UpdateResult {
        match Trust::for_trusted_repo(repo) {
            Ok(trust) => self.run(repo, trust, Arc::new(AtomicBool::new(false))).await,
            Err(e) => UpdateResult::Error(e),
        }
    }

    /// Update every enabled repository, heaviest first
    ///
    /// Untrusted repositories go through trust on first use.
    pub async fn update_all(&self) -> Result<Vec<(Repository, UpdateResult)>> {
        let store = self.store.clone();
        let repos = blocking(move || store.enabled_repositories()).await?;
        info!("Updating {} repositories", repos.len());

        let results: Vec<_> = futures::stream::iter(repos)
            .map(|repo| async move {
                let result = if repo.certificate.is_some() {
                    self.update(&repo).await
                } else {
                    self.update_new_repo(&repo, None).await
                };
                (repo, result)
            })
            .buffered(self.max_concurrent)
            .collect()
            .await;
        Ok(results)
    }

    /// Run an update in the background
    ///
    /// The returned handle owns the task; dropping it cancels the update.
    pub fn spawn_update(self: &Arc<Self>, repo: Repository, expected_fingerprint: Option<&str>) -> Result<UpdateTask> {
        let repo_id = repo.require_id()?;
        let trust = if repo.certificate.is_some() {
            Trust::for_trusted_repo(&repo)?
        } else {
            Trust::for_new_repo(&repo, expected_fingerprint)?
        };

        let cancel = Arc::new(AtomicBool::new(false));
        let updater = Arc::clone(self);
        let flag = cancel.clone();
        let handle = tokio::spawn(async move { updater.run(&repo, trust, flag).await });
        Ok(UpdateTask::new(repo_id, cancel, handle))
    }

    async fn run(&self, repo: &Repository, trust: Trust, cancel: Arc<AtomicBool>) -> UpdateResult {
        let outcome = self.run_locked(repo, trust, cancel).await;
        let result = UpdateResult::from_outcome(outcome);
        match &result {
            UpdateResult::Error(e) => warn!("Update of {} failed: {}", repo.name, e),
            UpdateResult::NotFound => warn!("Repository {} has no index at any mirror", repo.name),
            other => info!("Repository {}: {}", repo.name, other),
        }
        self.progress
            .finish_with_message(&format!("{}: {}", repo.name, result));
        result
    }

    async fn run_locked(&self, repo: &Repository, trust: Trust, cancel: Arc<AtomicBool>) -> Result<Applied> {
        let repo_id = repo.require_id()?;
        let _guard = self.locks.acquire(repo_id).await;
        let _permit = self.permits.acquire().await.map_err(|_| Error::Cancelled)?;
        ensure_not_cancelled(&cancel)?;

        // Another update may have committed while this one was queued
        let store = self.store.clone();
        let current = blocking(move || store.repository(repo_id))
            .await?
            .ok_or_else(|| {
                Error::PreconditionError(format!("Repository {} no longer exists", repo.name))
            })?;
        let trust = match current.certificate()? {
            Some(stored) => Trust::Pinned(stored),
            None => trust,
        };

        let cache_dir = paths::repo_cache_dir(&self.cache_dir, repo_id);
        tokio::fs::create_dir_all(&cache_dir).await.map_err(|e| {
            Error::IoError(format!("Failed to create {}: {e}", cache_dir.display()))
        })?;
        let scratch = tempfile::Builder::new()
            .prefix("update-")
            .tempdir_in(&cache_dir)?;

        let ctx = UpdateContext {
            updater: self,
            repo: &current,
            repo_id,
            trust: &trust,
            cancel,
            mirrors: effective_mirrors(&current),
            scratch,
        };
        ctx.enter(UpdateState::Idle);

        match v2::update(&ctx).await? {
            Some(applied) => Ok(applied),
            None => {
                debug!("{} publishes no entry; using the legacy index", current.name);
                v1::update(&ctx).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_mapping() {
        assert!(matches!(
            UpdateResult::from_outcome(Ok(Applied::Processed)),
            UpdateResult::Processed
        ));
        assert!(matches!(
            UpdateResult::from_outcome(Err(Error::NotFoundError("gone".into()))),
            UpdateResult::NotFound
        ));
        assert!(matches!(
            UpdateResult::from_outcome(Err(Error::SecurityError("bad".into()))),
            UpdateResult::Error(Error::SecurityError(_))
        ));
        assert!(UpdateResult::Unchanged.is_success());
        assert!(!UpdateResult::NotFound.is_success());
    }

    #[test]
    fn test_trust_preconditions() {
        let mut repo = Repository::new("r".to_string(), "https://r".to_string());
        assert!(matches!(
            Trust::for_trusted_repo(&repo),
            Err(Error::PreconditionError(_))
        ));
        assert!(matches!(
            Trust::for_new_repo(&repo, Some("AB:CD")),
            Ok(Trust::Fingerprint(fp)) if fp == "abcd"
        ));

        repo.certificate = Some("11".repeat(32));
        assert!(matches!(Trust::for_trusted_repo(&repo), Ok(Trust::Pinned(_))));
        assert!(matches!(
            Trust::for_new_repo(&repo, None),
            Err(Error::PreconditionError(_))
        ));
    }

    #[test]
    fn test_index_state_keeps_canonical_mirror() {
        use crate::index::MirrorV2;

        let address = "https://r.example/repo";
        let certificate = Certificate::from_hex(&"22".repeat(32)).unwrap();
        let mut index_repo = RepoV2 {
            address: address.to_string(),
            timestamp: 7,
            ..RepoV2::default()
        };
        index_repo.mirrors.push(MirrorV2 {
            url: "https://m.example/repo".to_string(),
            location: Some("de".to_string()),
            is_primary: false,
        });
        index_repo
            .description
            .insert("en-US".to_string(), "Described".to_string());

        let state = index_state(address, &certificate, IndexFormat::V2, 7, None, &index_repo, "en-US");
        assert_eq!(state.certificate, "22".repeat(32));
        assert_eq!(state.format_version, IndexFormat::V2);
        assert_eq!(state.description.as_deref(), Some("Described"));
        let urls: Vec<_> = state.official_mirrors.iter().map(|m| m.url.as_str()).collect();
        assert_eq!(urls, vec!["https://r.example/repo", "https://m.example/repo"]);
        assert_eq!(state.official_mirrors[1].location.as_deref(), Some("de"));

        // No announced mirrors leaves the canonical address as the only source
        index_repo.mirrors.clear();
        index_repo.description.clear();
        let state = index_state(address, &certificate, IndexFormat::V2, 7, None, &index_repo, "en-US");
        assert!(state.official_mirrors.is_empty());
        assert!(state.description.is_none());
    }

    #[test]
    fn test_localized_fallbacks() {
        let mut text = LocalizedText::new();
        assert_eq!(localized(&text, "de"), None);
        text.insert("fr".to_string(), "Bonjour".to_string());
        assert_eq!(localized(&text, "de").as_deref(), Some("Bonjour"));
        text.insert("en-US".to_string(), "Hello".to_string());
        assert_eq!(localized(&text, "de").as_deref(), Some("Hello"));
        assert_eq!(localized(&text, "fr").as_deref(), Some("Bonjour"));
    }
}

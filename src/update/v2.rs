// src/update/v2.rs

//! Unified index flow
//!
//! The signed `entry.jar` names the full index and the diffs available
//! against older timestamps. A repository already on this format whose
//! timestamp has a diff fetches only that diff; everything else fetches the
//! full index. Either file is hash-checked by the downloader, then streamed
//! record by record into a single transaction.

use super::{
    Applied, UpdateContext, UpdateState, blocking, ensure_not_cancelled, index_state,
};
use crate::db::{IndexStore, StoreTransaction};
use crate::download::{ArtifactTarget, FetchOutcome};
use crate::error::{Error, Result};
use crate::index::{
    ENTRY_JAR, ENTRY_JSON, Entry, IndexFormat, IndexRecord, IndexV2Records, PackageV2, RepoV2,
    apply_patch,
};
use crate::progress::UpdateProgress;
use crate::signing::{Certificate, verify_signed_container};
use serde_json::{Map, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tracing::{debug, info};

/// Returns `None` when the repository publishes no entry
pub(super) async fn update(ctx: &UpdateContext<'_>) -> Result<Option<Applied>> {
    let repo = ctx.repo;
    let on_v2 = repo.format_version == Some(IndexFormat::V2);
    let validator = if on_v2 { repo.etag.as_deref() } else { None };

    ctx.enter(UpdateState::Downloading);
    let entry_download = match ctx.download(&ArtifactTarget::named(ENTRY_JAR), validator).await {
        Ok(FetchOutcome::Downloaded(d)) => d,
        Ok(FetchOutcome::Unchanged) => return Ok(Some(Applied::Unchanged)),
        Err(e) if e.is_not_found() => return Ok(None),
        Err(e) => return Err(e),
    };

    ctx.enter(UpdateState::Verifying);
    let path = entry_download.path.clone();
    let limit = ctx.updater.max_download_size;
    let (entry, certificate) = blocking(move || {
        let file = File::open(&path)?;
        verify_signed_container(BufReader::new(file), ENTRY_JSON, limit, |payload| {
            Entry::from_reader(payload)
        })
    })
    .await?;
    ctx.trust.expected().check(&certificate)?;

    if !ctx.is_newer(entry.timestamp)? {
        return Ok(Some(Applied::Unchanged));
    }

    let (file, is_diff) = match entry.diff_for(repo.timestamp) {
        Some(diff) if on_v2 => (diff.clone(), true),
        _ => (entry.index.clone(), false),
    };
    debug!(
        "Repository {}: fetching {} ({})",
        repo.name,
        file.name,
        if is_diff { "diff" } else { "full index" }
    );

    ctx.enter(UpdateState::Downloading);
    let index_download = match ctx.download(&ArtifactTarget::from(&file), None).await {
        Ok(FetchOutcome::Downloaded(d)) => d,
        Ok(FetchOutcome::Unchanged) => {
            return Err(Error::DownloadError(format!(
                "{} reported unchanged without a validator",
                file.name
            )));
        }
        // The entry promised this file; its absence is a broken repository, not a removed one
        Err(e) if e.is_not_found() => {
            return Err(Error::DownloadError(format!(
                "Entry references missing {}: {e}",
                file.name
            )));
        }
        Err(e) => return Err(e),
    };

    ctx.enter(UpdateState::Parsing);
    let job = ApplyJob {
        store: ctx.updater.store.clone(),
        progress: ctx.updater.progress.clone(),
        cancel: ctx.cancel.clone(),
        repo_id: ctx.repo_id,
        address: repo.address.clone(),
        certificate,
        timestamp: entry.timestamp,
        etag: entry_download.validator,
        locale: ctx.updater.locale.clone(),
        path: index_download.path,
        is_diff,
    };
    let packages = blocking(move || job.run()).await?;

    info!(
        "Applied {} of {} ({} packages, timestamp {})",
        if is_diff { "diff" } else { "index" },
        repo.name,
        packages,
        entry.timestamp
    );
    Ok(Some(Applied::Processed))
}

/// Streams one verified unified document into the store
struct ApplyJob {
    store: Arc<dyn IndexStore>,
    progress: Arc<dyn UpdateProgress>,
    cancel: Arc<AtomicBool>,
    repo_id: i64,
    address: String,
    certificate: Certificate,
    timestamp: i64,
    etag: Option<String>,
    locale: String,
    path: PathBuf,
    is_diff: bool,
}

impl ApplyJob {
    fn run(self) -> Result<u64> {
        let file = File::open(&self.path)?;
        let records = IndexV2Records::spawn(BufReader::new(file))?;

        let mut tx = self.store.begin()?;
        if !self.is_diff {
            tx.clear_packages(self.repo_id)?;
        }

        let mut repo_doc: Option<Value> = None;
        let mut count = 0;
        for record in records {
            ensure_not_cancelled(&self.cancel)?;
            match record? {
                IndexRecord::Repo(value) => {
                    repo_doc = Some(if self.is_diff {
                        let stored = match repo_doc.take() {
                            Some(doc) => Some(doc),
                            None => tx.repo_document(self.repo_id)?,
                        };
                        apply_patch(stored, value).ok_or_else(|| {
                            Error::ParseError("Diff removes the repo block".to_string())
                        })?
                    } else {
                        value
                    });
                }
                IndexRecord::Package { id, value } => {
                    if self.is_diff {
                        apply_package_diff(tx.as_mut(), self.repo_id, &id, value)?;
                    } else {
                        store_package(tx.as_mut(), self.repo_id, &id, value)?;
                    }
                    count += 1;
                    self.progress.entries_processed(count);
                }
            }
        }

        let repo_doc = match repo_doc {
            Some(doc) => doc,
            None if self.is_diff => tx.repo_document(self.repo_id)?.ok_or_else(|| {
                Error::ParseError("No stored repo block to apply the diff to".to_string())
            })?,
            None => return Err(Error::ParseError("Index has no repo block".to_string())),
        };
        let index_repo = RepoV2::from_value(repo_doc.clone())?;
        let state = index_state(
            &self.address,
            &self.certificate,
            IndexFormat::V2,
            self.timestamp,
            self.etag.clone(),
            &index_repo,
            &self.locale,
        );

        tx.store_repo_document(self.repo_id, &repo_doc)?;
        tx.record_index(self.repo_id, &state)?;
        ensure_not_cancelled(&self.cancel)?;
        tx.commit()?;
        Ok(count)
    }
}

/// Store one package of a full index
fn store_package(tx: &mut dyn StoreTransaction, repo_id: i64, id: &str, value: Value) -> Result<()> {
    PackageV2::from_value(id, value.clone())?;

    let metadata = value
        .get("metadata")
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()));
    tx.upsert_package(repo_id, id, &metadata)?;

    if let Some(versions) = value.get("versions").and_then(Value::as_object) {
        for (version_id, version) in versions {
            tx.upsert_version(repo_id, id, version_id, version)?;
        }
    }
    Ok(())
}

/// Merge one package entry of a diff into stored state
///
/// `null` removes the package, a `null` version removes that version, and
/// objects merge into what is stored.
fn apply_package_diff(tx: &mut dyn StoreTransaction, repo_id: i64, id: &str, patch: Value) -> Result<()> {
    let mut fields = match patch {
        Value::Null => return tx.remove_package(repo_id, id),
        Value::Object(fields) => fields,
        other => {
            return Err(Error::ParseError(format!(
                "Diff entry for {id} must be an object, got {other}"
            )));
        }
    };

    let stored = tx.package_metadata(repo_id, id)?;
    match fields.remove("metadata") {
        Some(Value::Null) => return tx.remove_package(repo_id, id),
        Some(metadata_patch) => {
            if let Some(metadata) = apply_patch(stored, metadata_patch) {
                tx.upsert_package(repo_id, id, &metadata)?;
            }
        }
        None if stored.is_none() => {
            return Err(Error::ParseError(format!(
                "Diff changes unknown package {id}"
            )));
        }
        None => {}
    }

    match fields.remove("versions") {
        None => {}
        Some(Value::Object(versions)) => {
            for (version_id, version_patch) in versions {
                let stored = tx.version(repo_id, id, &version_id)?;
                match apply_patch(stored, version_patch) {
                    Some(version) => tx.upsert_version(repo_id, id, &version_id, &version)?,
                    None => tx.remove_version(repo_id, id, &version_id)?,
                }
            }
        }
        Some(other) => {
            return Err(Error::ParseError(format!(
                "Diff versions of {id} must be an object, got {other}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use crate::db::models::Repository;
    use serde_json::json;

    fn store() -> (tempfile::TempDir, SqliteStore, i64) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("diff.db");
        crate::db::init(path.to_str().unwrap()).unwrap();
        let store = SqliteStore::new(&path);
        let conn = store.connect().unwrap();
        let mut repo = Repository::new("r".to_string(), "https://r".to_string());
        let id = repo.insert(&conn).unwrap();
        (dir, store, id)
    }

    #[test]
    fn test_full_package_then_diff() {
        let (_dir, store, id) = store();
        let mut tx = store.begin().unwrap();
        store_package(
            tx.as_mut(),
            id,
            "org.example",
            json!({
                "metadata": {"added": 1, "license": "MIT"},
                "versions": {
                    "h1": {"added": 1, "file": {"name": "/a.apk"}, "manifest": {"versionCode": 1}},
                    "h2": {"added": 2, "file": {"name": "/b.apk"}, "manifest": {"versionCode": 2}}
                }
            }),
        )
        .unwrap();

        apply_package_diff(
            tx.as_mut(),
            id,
            "org.example",
            json!({
                "metadata": {"license": null, "lastUpdated": 5},
                "versions": {"h1": null, "h2": {"added": 3}}
            }),
        )
        .unwrap();

        let metadata = tx.package_metadata(id, "org.example").unwrap().unwrap();
        assert_eq!(metadata, json!({"added": 1, "lastUpdated": 5}));
        assert!(tx.version(id, "org.example", "h1").unwrap().is_none());
        assert_eq!(tx.version(id, "org.example", "h2").unwrap().unwrap()["added"], 3);

        apply_package_diff(tx.as_mut(), id, "org.example", Value::Null).unwrap();
        assert!(tx.package_metadata(id, "org.example").unwrap().is_none());
        tx.rollback().unwrap();
    }

    #[test]
    fn test_diff_for_unknown_package_without_metadata() {
        let (_dir, store, id) = store();
        let mut tx = store.begin().unwrap();
        let err = apply_package_diff(tx.as_mut(), id, "ghost", json!({"versions": {"h": {}}}))
            .unwrap_err();
        assert!(matches!(err, Error::ParseError(_)));
    }

    #[test]
    fn test_malformed_package_rejected() {
        let (_dir, store, id) = store();
        let mut tx = store.begin().unwrap();
        assert!(store_package(tx.as_mut(), id, "x", json!([1, 2])).is_err());
        assert!(apply_package_diff(tx.as_mut(), id, "x", json!(5)).is_err());
    }
}

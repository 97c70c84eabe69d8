// src/update/v1.rs

//! Legacy index flow
//!
//! `index-v1.jar` carries the whole repository. It is verified and parsed in
//! one pass, converted to the unified model, and replaces every stored
//! package of the repository.

use super::{Applied, UpdateContext, UpdateState, blocking, ensure_not_cancelled, index_state};
use crate::db::IndexStore;
use crate::db::models::IndexState;
use crate::download::{ArtifactTarget, FetchOutcome};
use crate::error::Result;
use crate::index::{INDEX_V1_JAR, INDEX_V1_JSON, IndexFormat, IndexV1, IndexV2, convert_v1};
use crate::progress::UpdateProgress;
use crate::signing::verify_signed_container;
use std::fs::File;
use std::io::BufReader;
use std::sync::atomic::AtomicBool;
use tracing::info;

pub(super) async fn update(ctx: &UpdateContext<'_>) -> Result<Applied> {
    let repo = ctx.repo;
    let validator = if repo.format_version == Some(IndexFormat::V1) {
        repo.etag.as_deref()
    } else {
        None
    };

    ctx.enter(UpdateState::Downloading);
    let downloaded = match ctx.download(&ArtifactTarget::named(INDEX_V1_JAR), validator).await? {
        FetchOutcome::Unchanged => return Ok(Applied::Unchanged),
        FetchOutcome::Downloaded(d) => d,
    };

    ctx.enter(UpdateState::Verifying);
    let path = downloaded.path.clone();
    let limit = ctx.updater.max_download_size;
    let (index, certificate) = blocking(move || {
        let file = File::open(&path)?;
        verify_signed_container(BufReader::new(file), INDEX_V1_JSON, limit, |payload| {
            IndexV1::from_reader(payload)
        })
    })
    .await?;
    ctx.trust.expected().check(&certificate)?;

    let timestamp = index.repo.timestamp;
    if !ctx.is_newer(timestamp)? {
        return Ok(Applied::Unchanged);
    }

    ctx.enter(UpdateState::Parsing);
    let locale = ctx.updater.locale.clone();
    let converted = blocking(move || Ok(convert_v1(index, &locale))).await?;
    let state = index_state(
        &repo.address,
        &certificate,
        IndexFormat::V1,
        timestamp,
        downloaded.validator,
        &converted.repo,
        &ctx.updater.locale,
    );

    ctx.enter(UpdateState::Committing);
    let store = ctx.updater.store.clone();
    let progress = ctx.updater.progress.clone();
    let cancel = ctx.cancel.clone();
    let repo_id = ctx.repo_id;
    let packages = blocking(move || {
        commit_index(store.as_ref(), repo_id, &state, converted, &cancel, progress.as_ref())
    })
    .await?;

    info!(
        "Applied legacy index of {} ({} packages, timestamp {})",
        repo.name, packages, timestamp
    );
    Ok(Applied::Processed)
}

/// Replace a repository's packages with `index` in one transaction
fn commit_index(
    store: &dyn IndexStore,
    repo_id: i64,
    state: &IndexState,
    index: IndexV2,
    cancel: &AtomicBool,
    progress: &dyn UpdateProgress,
) -> Result<u64> {
    let mut tx = store.begin()?;
    tx.clear_packages(repo_id)?;

    let mut count = 0;
    for (package_id, package) in index.packages {
        ensure_not_cancelled(cancel)?;
        tx.upsert_package(repo_id, &package_id, &serde_json::to_value(&package.metadata)?)?;
        for (version_id, version) in package.versions {
            tx.upsert_version(repo_id, &package_id, &version_id, &serde_json::to_value(&version)?)?;
        }
        count += 1;
        progress.entries_processed(count);
    }

    tx.store_repo_document(repo_id, &serde_json::to_value(&index.repo)?)?;
    tx.record_index(repo_id, state)?;
    ensure_not_cancelled(cancel)?;
    tx.commit()?;
    Ok(count)
}

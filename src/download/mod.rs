// src/download/mod.rs

//! Mirror-aware, integrity-checked downloads
//!
//! [`ArtifactSource`] is the one seam between the updater and the network:
//! hand it a mirror list and an artifact descriptor and it either produces a
//! verified file or fails. [`HttpDownloader`] is the production
//! implementation; tests substitute their own.

mod http;
mod validator;

pub use http::HttpDownloader;
pub use validator::{ResponseValidators, normalize_etag, weak_validator};

use crate::error::Result;
use crate::index::EntryFile;
use crate::progress::UpdateProgress;
use crate::repository::Mirror;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

/// What to fetch and how to check it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactTarget {
    /// Path relative to a mirror's base URL
    pub name: String,
    /// Expected lowercase hex SHA-256, when known
    pub sha256: Option<String>,
    /// Exact expected size; also the transfer limit
    pub size: Option<u64>,
    /// Content-addressed identifier for gateway mirrors
    pub ipfs_cid: Option<String>,
}

impl ArtifactTarget {
    /// Target with no integrity metadata (signed containers check themselves)
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sha256: None,
            size: None,
            ipfs_cid: None,
        }
    }

    pub fn with_sha256(mut self, sha256: impl Into<String>) -> Self {
        self.sha256 = Some(sha256.into());
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }
}

impl From<&EntryFile> for ArtifactTarget {
    fn from(file: &EntryFile) -> Self {
        Self {
            name: file.name.clone(),
            sha256: Some(file.sha256.clone()),
            size: Some(file.size),
            ipfs_cid: file.ipfs_cid_v1.clone(),
        }
    }
}

/// A completed, verified transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downloaded {
    pub path: PathBuf,
    /// Validator to present on the next conditional fetch
    pub validator: Option<String>,
    pub bytes: u64,
    pub sha256: String,
    /// Base URL of the mirror that served it
    pub mirror: String,
}

/// Result of a fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The remembered validator still matches; nothing was transferred
    Unchanged,
    Downloaded(Downloaded),
}

/// One fetch request
pub struct FetchRequest<'a> {
    /// Canonical repository address, tried first
    pub address: &'a str,
    /// Effective mirrors in declared order
    pub mirrors: &'a [Mirror],
    pub target: &'a ArtifactTarget,
    /// Final location; written only after verification
    pub dest: &'a Path,
    /// Validator from a previous fetch, enabling the conditional probe
    pub validator: Option<&'a str>,
    /// Cooperative cancellation flag, checked between chunks
    pub cancel: Option<&'a AtomicBool>,
    pub progress: &'a dyn UpdateProgress,
}

/// Produces verified artifacts from a repository's mirrors
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    async fn fetch(&self, request: FetchRequest<'_>) -> Result<FetchOutcome>;
}

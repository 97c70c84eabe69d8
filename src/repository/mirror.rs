// src/repository/mirror.rs

//! Mirror lists and attempt ordering
//!
//! A repository's effective mirrors are its official mirrors (or the
//! canonical address alone when the index announced none), then user-added
//! mirrors, minus anything the user disabled. Downloads always try the
//! canonical address first when it is in that list.

use crate::db::models::Repository;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

/// A network location serving a repository's content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mirror {
    /// Base URL
    pub url: String,
    /// Content-addressed gateway; serves `{url}/ipfs/{cid}`
    #[serde(default)]
    pub is_ipfs: bool,
    /// Free-form location hint (country code)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl Mirror {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            is_ipfs: false,
            location: None,
        }
    }

    /// A content-addressed gateway
    pub fn ipfs_gateway(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            is_ipfs: true,
            location: None,
        }
    }

    /// URL of an artifact on this mirror
    ///
    /// Gateways address content by identifier, so they yield `None` for
    /// artifacts that have none.
    pub fn artifact_url(&self, name: &str, ipfs_cid: Option<&str>) -> Result<Option<Url>> {
        let base = self.url.trim_end_matches('/');
        let raw = if self.is_ipfs {
            match ipfs_cid {
                Some(cid) => format!("{base}/ipfs/{cid}"),
                None => return Ok(None),
            }
        } else {
            format!("{base}/{}", name.trim_start_matches('/'))
        };
        Url::parse(&raw)
            .map(Some)
            .map_err(|e| Error::DownloadError(format!("Invalid mirror URL {raw}: {e}")))
    }

    /// Whether this mirror points at `address`
    pub fn is_address(&self, address: &str) -> bool {
        same_base(&self.url, address)
    }
}

/// Compare base URLs, ignoring a trailing slash and scheme/host case
pub fn same_base(a: &str, b: &str) -> bool {
    match (Url::parse(a.trim_end_matches('/')), Url::parse(b.trim_end_matches('/'))) {
        (Ok(a), Ok(b)) => a == b,
        _ => a.trim_end_matches('/') == b.trim_end_matches('/'),
    }
}

/// Put the canonical address first, keeping the rest in declared order
///
/// When the canonical address is not among `mirrors` (the user may have
/// disabled it) the declared order is returned unchanged.
pub fn order_mirrors(address: &str, mirrors: Vec<Mirror>) -> Vec<Mirror> {
    let Some(position) = mirrors.iter().position(|m| m.is_address(address)) else {
        warn!(
            "Canonical address {} not among {} mirror(s); using declared order",
            address,
            mirrors.len()
        );
        return mirrors;
    };

    let mut ordered = mirrors;
    let canonical = ordered.remove(position);
    ordered.insert(0, canonical);
    ordered
}

/// Effective, ordered mirror list for a repository
pub fn effective_mirrors(repo: &Repository) -> Vec<Mirror> {
    // Gateways alone cannot serve unaddressed files such as the index
    let mut official = repo.official_mirrors.clone();
    if official.iter().all(|m| m.is_ipfs) {
        official.insert(0, Mirror::new(repo.address.clone()));
    }

    let mut mirrors: Vec<Mirror> = Vec::new();
    for mirror in official.into_iter().chain(repo.user_mirrors.iter().cloned()) {
        let disabled = repo.disabled_mirrors.iter().any(|d| same_base(d, &mirror.url));
        let duplicate = mirrors.iter().any(|m| same_base(&m.url, &mirror.url));
        if !disabled && !duplicate {
            mirrors.push(mirror);
        }
    }

    order_mirrors(&repo.address, mirrors)
}

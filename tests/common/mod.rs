// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use reposync::config::{NetworkSection, UpdateSection};
use reposync::db::models::{PackageRecord, Repository, VersionRecord};
use reposync::db::{self, SqliteStore};
use reposync::hash::sha256;
use reposync::index::{ENTRY_JSON, INDEX_V1_JSON};
use reposync::signing::signed_container_bytes;
use reposync::{DnsCache, HttpDownloader, IndexUpdater, SigningKeyPair, SyncConfig};
use serde_json::{Value, json};
use std::sync::Arc;
use tempfile::TempDir;

pub const APP_ID: &str = "org.example.app";

/// Scratch database plus download cache
///
/// Keep it alive for the whole test; dropping it removes both.
pub struct TestEnv {
    pub dir: TempDir,
    pub db_path: String,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("reposync.db").to_str().unwrap().to_string();
        db::init(&db_path).unwrap();
        Self { dir, db_path }
    }

    pub fn config(&self) -> SyncConfig {
        SyncConfig {
            network: NetworkSection {
                mirror_timeout_secs: 5,
                ..NetworkSection::default()
            },
            update: UpdateSection {
                cache_dir: Some(self.dir.path().join("cache")),
                ..UpdateSection::default()
            },
        }
    }

    pub fn updater(&self) -> IndexUpdater {
        let config = self.config();
        let downloader =
            HttpDownloader::new(&config.network, Arc::new(DnsCache::new(true))).unwrap();
        IndexUpdater::new(
            Arc::new(SqliteStore::new(&self.db_path)),
            Arc::new(downloader),
            &config,
        )
    }

    /// Add an untrusted repository at `address`
    pub fn add_repo(&self, name: &str, address: &str) -> Repository {
        let conn = db::open(&self.db_path).unwrap();
        reposync::repository::add_repository(&conn, name.to_string(), address.to_string(), true, 0)
            .unwrap()
    }

    pub fn repo(&self, name: &str) -> Repository {
        let conn = db::open(&self.db_path).unwrap();
        Repository::find_by_name(&conn, name).unwrap().unwrap()
    }

    pub fn packages(&self, repo: &Repository) -> Vec<PackageRecord> {
        let conn = db::open(&self.db_path).unwrap();
        PackageRecord::find_by_repository(&conn, repo.id.unwrap()).unwrap()
    }

    pub fn versions(&self, repo: &Repository, package_id: &str) -> Vec<VersionRecord> {
        let conn = db::open(&self.db_path).unwrap();
        VersionRecord::find_by_package(&conn, repo.id.unwrap(), package_id).unwrap()
    }
}

pub fn key(seed: u8) -> SigningKeyPair {
    SigningKeyPair::from_seed([seed; 32])
}

/// Legacy index with one app offering a beta (code 10) and a stable (code 5) version
pub fn legacy_index(address: &str, timestamp: i64) -> Value {
    json!({
        "repo": {
            "timestamp": timestamp,
            "version": 21,
            "name": "Example Repo",
            "address": address,
            "description": "Apps for testing"
        },
        "requests": {"install": [], "uninstall": []},
        "apps": [{
            "packageName": APP_ID,
            "name": "Example",
            "summary": "An example app",
            "categories": ["Tools"],
            "antiFeatures": ["Tracking"],
            "suggestedVersionCode": "5",
            "license": "GPL-3.0-only",
            "added": 1000,
            "lastUpdated": 2000,
            "localized": {"de": {"name": "Beispiel"}}
        }],
        "packages": {
            APP_ID: [
                {"versionCode": 10, "versionName": "1.0-beta", "hash": "aa".repeat(32),
                 "hashType": "sha256", "size": 2048, "apkName": "app_10.apk", "minSdkVersion": "21"},
                {"versionCode": 5, "versionName": "0.5", "hash": "bb".repeat(32),
                 "hashType": "sha256", "size": 1024, "apkName": "app_5.apk"}
            ]
        }
    })
}

pub fn legacy_jar(index: &Value, key: &SigningKeyPair) -> Vec<u8> {
    signed_container_bytes(INDEX_V1_JSON, &serde_json::to_vec(index).unwrap(), key).unwrap()
}

fn version(code: i64, name: &str) -> Value {
    json!({
        "added": code,
        "file": {"name": format!("/{name}"), "sha256": "cc".repeat(32), "size": 100},
        "manifest": {"versionCode": code, "versionName": format!("{code}.0")}
    })
}

/// Unified index with two packages; `alpha` has two versions
pub fn unified_index(address: &str, timestamp: i64) -> Value {
    json!({
        "repo": {
            "name": {"en-US": "Unified Repo"},
            "description": {"en-US": "Unified description"},
            "address": address,
            "timestamp": timestamp,
            "categories": {"Tools": {"name": {"en-US": "Tools"}}}
        },
        "packages": {
            "org.example.alpha": {
                "metadata": {"added": 1, "lastUpdated": 1, "license": "MIT"},
                "versions": {"h1": version(1, "alpha_1.apk"), "h2": version(2, "alpha_2.apk")}
            },
            "org.example.beta": {
                "metadata": {"added": 1, "lastUpdated": 1},
                "versions": {"h3": version(1, "beta_1.apk")}
            }
        }
    })
}

/// Reference to `bytes` served at `name`, as an entry lists it
pub fn entry_file(name: &str, bytes: &[u8]) -> Value {
    json!({"name": name, "sha256": sha256(bytes), "size": bytes.len()})
}

/// Signed entry pointing at `index` and any `diffs` (keyed by base timestamp)
pub fn entry_jar(timestamp: i64, index: Value, diffs: Value, key: &SigningKeyPair) -> Vec<u8> {
    let entry = json!({
        "timestamp": timestamp,
        "version": 20001,
        "index": index,
        "diffs": diffs
    });
    signed_container_bytes(ENTRY_JSON, &serde_json::to_vec(&entry).unwrap(), key).unwrap()
}

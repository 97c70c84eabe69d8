// src/index/v1.rs

//! Legacy index format (`index-v1.json`)
//!
//! The whole document is decoded in one pass. The format is monolithic, so
//! there is nothing to stream: callers bound its size at download time.

use super::int_or_string;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;

/// Root of a legacy index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexV1 {
    pub repo: RepoV1,
    #[serde(default)]
    pub apps: Vec<AppV1>,
    #[serde(default)]
    pub packages: BTreeMap<String, Vec<PackageVersionV1>>,
}

/// Repository block of a legacy index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoV1 {
    pub timestamp: i64,
    #[serde(default)]
    pub version: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
    pub address: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub mirrors: Vec<String>,
}

/// Localized block of an app entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalizedV1 {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub whats_new: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

/// Application metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppV1 {
    pub package_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub anti_features: Vec<String>,
    #[serde(default, deserialize_with = "int_or_string")]
    pub suggested_version_code: Option<i64>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub web_site: Option<String>,
    #[serde(default)]
    pub source_code: Option<String>,
    #[serde(default)]
    pub issue_tracker: Option<String>,
    #[serde(default)]
    pub changelog: Option<String>,
    #[serde(default)]
    pub donate: Option<String>,
    #[serde(default)]
    pub author_name: Option<String>,
    #[serde(default)]
    pub author_email: Option<String>,
    #[serde(default)]
    pub added: Option<i64>,
    #[serde(default)]
    pub last_updated: Option<i64>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub whats_new: Option<String>,
    #[serde(default)]
    pub localized: BTreeMap<String, LocalizedV1>,
}

/// One published version of an application
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageVersionV1 {
    #[serde(default)]
    pub package_name: Option<String>,
    #[serde(default, deserialize_with = "int_or_string")]
    pub version_code: Option<i64>,
    #[serde(default)]
    pub version_name: Option<String>,
    pub hash: String,
    #[serde(default)]
    pub hash_type: Option<String>,
    #[serde(default)]
    pub size: u64,
    pub apk_name: String,
    #[serde(default, rename = "srcname")]
    pub src_name: Option<String>,
    #[serde(default)]
    pub added: Option<i64>,
    #[serde(default)]
    pub sig: Option<String>,
    #[serde(default)]
    pub signer: Option<String>,
    #[serde(default, deserialize_with = "int_or_string")]
    pub min_sdk_version: Option<i64>,
    #[serde(default, deserialize_with = "int_or_string")]
    pub target_sdk_version: Option<i64>,
    #[serde(default, deserialize_with = "int_or_string")]
    pub max_sdk_version: Option<i64>,
    #[serde(default)]
    pub nativecode: Vec<String>,
    #[serde(default, rename = "uses-permission")]
    pub uses_permission: Vec<PermissionV1>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub anti_features: Vec<String>,
}

/// `["android.permission.INTERNET", null]` pairs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionV1(pub String, #[serde(default)] pub Option<serde_json::Value>);

impl PermissionV1 {
    pub fn name(&self) -> &str {
        &self.0
    }

    /// Upper SDK bound, tolerating both numeric and string encodings
    pub fn max_sdk_version(&self) -> Option<i64> {
        match &self.1 {
            Some(serde_json::Value::Number(n)) => n.as_i64(),
            Some(serde_json::Value::String(s)) => s.parse().ok(),
            _ => None,
        }
    }
}

impl AppV1 {
    /// Versions announced for this app, in source order
    pub fn versions<'a>(&self, index: &'a IndexV1) -> &'a [PackageVersionV1] {
        index
            .packages
            .get(&self.package_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

impl IndexV1 {
    /// Decode a legacy index from a reader
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        serde_json::from_reader(reader)
            .map_err(|e| Error::ParseError(format!("Invalid legacy index: {e}")))
    }

    /// Decode a legacy index from bytes
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data)
            .map_err(|e| Error::ParseError(format!("Invalid legacy index: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "repo": {
            "timestamp": 1700000000000,
            "version": 21,
            "name": "Example Repo",
            "icon": "icon.png",
            "address": "https://repo.example.org/repo",
            "description": "An example",
            "mirrors": ["https://mirror.example.net/repo"]
        },
        "requests": {"install": [], "uninstall": []},
        "apps": [{
            "packageName": "org.example.app",
            "name": "Example",
            "categories": ["System"],
            "antiFeatures": ["Ads"],
            "suggestedVersionCode": "5",
            "localized": {"en-US": {"summary": "Does things", "whatsNew": "Fixes"}}
        }],
        "packages": {
            "org.example.app": [{
                "versionCode": 10,
                "versionName": "1.0",
                "hash": "abc123",
                "hashType": "sha256",
                "size": 1024,
                "apkName": "org.example.app_10.apk",
                "minSdkVersion": "21",
                "uses-permission": [["android.permission.INTERNET", null], ["android.permission.CAMERA", "28"]],
                "nativecode": ["arm64-v8a"]
            }]
        }
    }"#;

    #[test]
    fn test_parse_sample() {
        let index = IndexV1::from_slice(SAMPLE.as_bytes()).unwrap();
        assert_eq!(index.repo.timestamp, 1_700_000_000_000);
        assert_eq!(index.repo.mirrors.len(), 1);
        assert_eq!(index.apps.len(), 1);

        let app = &index.apps[0];
        assert_eq!(app.suggested_version_code, Some(5));
        assert_eq!(app.localized["en-US"].whats_new.as_deref(), Some("Fixes"));

        let versions = app.versions(&index);
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].version_code, Some(10));
        assert_eq!(versions[0].min_sdk_version, Some(21));
        assert_eq!(versions[0].uses_permission[0].name(), "android.permission.INTERNET");
        assert_eq!(versions[0].uses_permission[0].max_sdk_version(), None);
        assert_eq!(versions[0].uses_permission[1].max_sdk_version(), Some(28));
    }

    #[test]
    fn test_app_without_versions() {
        let json = r#"{"repo": {"timestamp": 1, "address": "https://a"}, "apps": [{"packageName": "x"}]}"#;
        let index = IndexV1::from_slice(json.as_bytes()).unwrap();
        assert!(index.apps[0].versions(&index).is_empty());
    }

    #[test]
    fn test_missing_repo_is_parse_error() {
        let err = IndexV1::from_slice(br#"{"apps": []}"#).unwrap_err();
        assert!(matches!(err, Error::ParseError(_)));
    }

    #[test]
    fn test_truncated_document_is_parse_error() {
        let truncated = &SAMPLE.as_bytes()[..SAMPLE.len() / 2];
        assert!(matches!(IndexV1::from_slice(truncated), Err(Error::ParseError(_))));
    }
}

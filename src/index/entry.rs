// src/index/entry.rs

//! Signed entry point of a unified repository (`entry.json`)

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;

/// Lists the full index and the diffs available against older timestamps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub timestamp: i64,
    #[serde(default)]
    pub version: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age: Option<i64>,
    pub index: EntryFile,
    /// Keyed by the timestamp (as a string) a diff applies on top of
    #[serde(default)]
    pub diffs: BTreeMap<String, EntryFile>,
}

/// An index file referenced from the entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryFile {
    pub name: String,
    pub sha256: String,
    pub size: u64,
    #[serde(default, rename = "ipfsCIDv1", skip_serializing_if = "Option::is_none")]
    pub ipfs_cid_v1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_packages: Option<u64>,
}

impl Entry {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let entry: Entry = serde_json::from_reader(reader)
            .map_err(|e| Error::ParseError(format!("Invalid entry: {e}")))?;
        entry.validate()?;
        Ok(entry)
    }

    /// Diff that brings a repository at `timestamp` up to this entry
    pub fn diff_for(&self, timestamp: i64) -> Option<&EntryFile> {
        self.diffs.get(&timestamp.to_string())
    }

    fn validate(&self) -> Result<()> {
        if self.index.name.is_empty() {
            return Err(Error::ParseError("Entry names no index file".to_string()));
        }
        if let Some((key, _)) = self.diffs.iter().find(|(k, _)| k.parse::<i64>().is_err()) {
            return Err(Error::ParseError(format!("Diff key is not a timestamp: {key}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENTRY: &str = r#"{
        "timestamp": 3000,
        "version": 20002,
        "index": {"name": "/index-v2.json", "sha256": "aa", "size": 100, "numPackages": 2},
        "diffs": {
            "1000": {"name": "/diff/1000.json", "sha256": "bb", "size": 10},
            "2000": {"name": "/diff/2000.json", "sha256": "cc", "size": 5}
        }
    }"#;

    #[test]
    fn test_parse_entry() {
        let entry = Entry::from_reader(ENTRY.as_bytes()).unwrap();
        assert_eq!(entry.timestamp, 3000);
        assert_eq!(entry.index.num_packages, Some(2));
        assert_eq!(entry.diff_for(2000).unwrap().name, "/diff/2000.json");
        assert!(entry.diff_for(1500).is_none());
    }

    #[test]
    fn test_non_numeric_diff_key_rejected() {
        let json = r#"{"timestamp": 1, "index": {"name": "/i", "sha256": "a", "size": 1},
                       "diffs": {"yesterday": {"name": "/d", "sha256": "b", "size": 1}}}"#;
        assert!(matches!(Entry::from_reader(json.as_bytes()), Err(Error::ParseError(_))));
    }
}

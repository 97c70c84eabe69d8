// src/index/v2.rs

//! Unified index format (`index-v2.json`) and its streaming decoder
//!
//! A unified index can describe tens of thousands of packages, so it is never
//! materialised whole during an update. [`stream_index_v2`] walks the top-level
//! object and hands each `repo` block and each `packages` entry to a sink as it
//! is decoded. [`IndexV2Records`] exposes the same walk as a lazy, forward-only
//! iterator driven from a parser thread.
//!
//! The typed structs below are the shape the converter produces and the shape
//! stored documents are read back into.

use crate::error::{Error, Result};
use serde::de::{self, DeserializeSeed, IgnoredAny, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread;

/// Locale -> text
pub type LocalizedText = BTreeMap<String, String>;

/// Locale -> file
pub type LocalizedFile = BTreeMap<String, FileV2>;

/// Root of a unified index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexV2 {
    pub repo: RepoV2,
    #[serde(default)]
    pub packages: BTreeMap<String, PackageV2>,
}

/// Repository block of a unified index
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoV2 {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub name: LocalizedText,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub description: LocalizedText,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub icon: LocalizedFile,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mirrors: Vec<MirrorV2>,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub anti_features: BTreeMap<String, DictionaryEntryV2>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub categories: BTreeMap<String, DictionaryEntryV2>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub release_channels: BTreeMap<String, DictionaryEntryV2>,
}

/// Mirror announced by a repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorV2 {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_primary: bool,
}

/// Localized name and description of an anti-feature, category or channel
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DictionaryEntryV2 {
    #[serde(default)]
    pub name: LocalizedText,
    #[serde(default)]
    pub description: LocalizedText,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub icon: LocalizedFile,
}

/// File reference with integrity data
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileV2 {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, rename = "ipfsCIDv1", skip_serializing_if = "Option::is_none")]
    pub ipfs_cid_v1: Option<String>,
}

/// One package with all its versions, keyed by file hash
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageV2 {
    #[serde(default)]
    pub metadata: MetadataV2,
    #[serde(default)]
    pub versions: BTreeMap<String, VersionV2>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataV2 {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub name: LocalizedText,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub summary: LocalizedText,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub description: LocalizedText,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub icon: LocalizedFile,
    #[serde(default)]
    pub added: i64,
    #[serde(default)]
    pub last_updated: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_site: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_tracker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changelog: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub donate: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_email: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionV2 {
    #[serde(default)]
    pub added: i64,
    pub file: FileV2,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<FileV2>,
    #[serde(default)]
    pub manifest: ManifestV2,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub release_channels: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub anti_features: BTreeMap<String, LocalizedText>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub whats_new: LocalizedText,
}

impl VersionV2 {
    /// Stable versions carry no release channel
    pub fn is_stable(&self) -> bool {
        self.release_channels.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestV2 {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_name: Option<String>,
    #[serde(default)]
    pub version_code: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uses_sdk: Option<UsesSdkV2>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_sdk_version: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer: Option<SignerV2>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uses_permission: Vec<PermissionV2>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nativecode: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<FeatureV2>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsesSdkV2 {
    pub min_sdk_version: i64,
    pub target_sdk_version: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerV2 {
    pub sha256: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionV2 {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_sdk_version: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureV2 {
    pub name: String,
}

impl RepoV2 {
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| Error::ParseError(format!("Invalid repo block: {e}")))
    }
}

impl PackageV2 {
    pub fn from_value(id: &str, value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| Error::ParseError(format!("Invalid package {id}: {e}")))
    }
}

impl IndexV2 {
    /// Serialise into the canonical byte form
    ///
    /// Every map is ordered, so equal documents always produce equal bytes.
    pub fn to_canonical_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// A structural record produced while walking a unified document
#[derive(Debug, Clone, PartialEq)]
pub enum IndexRecord {
    /// The `repo` block, or a patch to it
    Repo(Value),
    /// One entry of `packages`; `Value::Null` in a diff means removal
    Package { id: String, value: Value },
}

/// Walk a unified document (full index or diff), feeding records to `sink`
///
/// Unknown top-level keys are skipped without being buffered. An error
/// returned by the sink aborts the walk and is returned unchanged.
pub fn stream_index_v2<R, F>(reader: R, mut sink: F) -> Result<()>
where
    R: Read,
    F: FnMut(IndexRecord) -> Result<()>,
{
    let mut de = serde_json::Deserializer::from_reader(reader);
    let mut failure: Option<Error> = None;

    let outcome = serde::Deserializer::deserialize_map(
        &mut de,
        DocumentVisitor {
            sink: &mut sink,
            failure: &mut failure,
        },
    );

    match outcome {
        Ok(()) => {
            de.end()
                .map_err(|e| Error::ParseError(format!("Trailing data after index: {e}")))?;
            Ok(())
        }
        Err(e) => Err(failure
            .take()
            .unwrap_or_else(|| Error::ParseError(format!("Invalid unified index: {e}")))),
    }
}

fn emit<F, E>(sink: &mut F, failure: &mut Option<Error>, record: IndexRecord) -> std::result::Result<(), E>
where
    F: FnMut(IndexRecord) -> Result<()>,
    E: de::Error,
{
    match sink(record) {
        Ok(()) => Ok(()),
        Err(e) => {
            *failure = Some(e);
            Err(E::custom("record sink aborted"))
        }
    }
}

struct DocumentVisitor<'a, F> {
    sink: &'a mut F,
    failure: &'a mut Option<Error>,
}

impl<'de, F> Visitor<'de> for DocumentVisitor<'_, F>
where
    F: FnMut(IndexRecord) -> Result<()>,
{
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a unified index object")
    }

    fn visit_map<A>(self, mut map: A) -> std::result::Result<(), A::Error>
    where
        A: MapAccess<'de>,
    {
        let DocumentVisitor { sink, failure } = self;
        while let Some(key) = map.next_key::<String>()? {
            match key.as_str() {
                "repo" => {
                    let value: Value = map.next_value()?;
                    emit::<_, A::Error>(sink, failure, IndexRecord::Repo(value))?;
                }
                "packages" => {
                    map.next_value_seed(PackagesSeed {
                        sink: &mut *sink,
                        failure: &mut *failure,
                    })?;
                }
                _ => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }
        Ok(())
    }
}

struct PackagesSeed<'a, F> {
    sink: &'a mut F,
    failure: &'a mut Option<Error>,
}

impl<'de, F> DeserializeSeed<'de> for PackagesSeed<'_, F>
where
    F: FnMut(IndexRecord) -> Result<()>,
{
    type Value = ();

    fn deserialize<D>(self, deserializer: D) -> std::result::Result<(), D::Error>
    where
        D: de::Deserializer<'de>,
    {
        deserializer.deserialize_map(self)
    }
}

impl<'de, F> Visitor<'de> for PackagesSeed<'_, F>
where
    F: FnMut(IndexRecord) -> Result<()>,
{
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of packages")
    }

    fn visit_map<A>(self, mut map: A) -> std::result::Result<(), A::Error>
    where
        A: MapAccess<'de>,
    {
        let PackagesSeed { sink, failure } = self;
        while let Some(id) = map.next_key::<String>()? {
            let value: Value = map.next_value()?;
            emit::<_, A::Error>(sink, failure, IndexRecord::Package { id, value })?;
        }
        Ok(())
    }
}

/// Records buffered between the parser thread and the consumer
const RECORD_BUFFER: usize = 64;

/// Lazy, forward-only sequence of records from a unified document
///
/// Parsing runs on a dedicated thread and blocks once [`RECORD_BUFFER`]
/// records are waiting, so memory stays bounded by the consumer's pace.
/// The sequence cannot be restarted. Dropping it stops the parser at its
/// next record.
pub struct IndexV2Records {
    rx: Receiver<Result<IndexRecord>>,
    done: bool,
}

impl IndexV2Records {
    /// Start parsing `reader` on a background thread
    pub fn spawn<R>(reader: R) -> Result<Self>
    where
        R: Read + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(RECORD_BUFFER);
        thread::Builder::new()
            .name("index-v2-parser".to_string())
            .spawn(move || parse_into(reader, tx))
            .map_err(|e| Error::InitError(format!("Failed to start index parser: {e}")))?;
        Ok(Self { rx, done: false })
    }
}

fn parse_into<R: Read>(reader: R, tx: SyncSender<Result<IndexRecord>>) {
    let result = stream_index_v2(reader, |record| {
        tx.send(Ok(record)).map_err(|_| Error::Cancelled)
    });
    match result {
        Ok(()) | Err(Error::Cancelled) => {}
        Err(e) => {
            // The consumer may already be gone
            let _ = tx.send(Err(e));
        }
    }
}

impl Iterator for IndexV2Records {
    type Item = Result<IndexRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.rx.recv() {
            Ok(Ok(record)) => Some(Ok(record)),
            Ok(Err(e)) => {
                self.done = true;
                Some(Err(e))
            }
            Err(_) => {
                self.done = true;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const DOC: &str = r#"{
        "repo": {"address": "https://repo.example.org/repo", "timestamp": 42, "name": {"en-US": "Example"}},
        "unknown": {"deeply": [1, 2, {"nested": true}]},
        "packages": {
            "org.example.a": {"metadata": {"added": 1}, "versions": {}},
            "org.example.b": {"metadata": {"added": 2}, "versions": {}}
        }
    }"#;

    #[test]
    fn test_stream_yields_records_in_order() {
        let mut records = Vec::new();
        stream_index_v2(DOC.as_bytes(), |r| {
            records.push(r);
            Ok(())
        })
        .unwrap();

        assert_eq!(records.len(), 3);
        assert!(matches!(&records[0], IndexRecord::Repo(v) if v["timestamp"] == 42));
        assert!(matches!(&records[1], IndexRecord::Package { id, .. } if id == "org.example.a"));
        assert!(matches!(&records[2], IndexRecord::Package { id, .. } if id == "org.example.b"));
    }

    #[test]
    fn test_sink_error_is_preserved() {
        let mut seen = 0;
        let err = stream_index_v2(DOC.as_bytes(), |r| {
            seen += 1;
            match r {
                IndexRecord::Package { .. } => Err(Error::Cancelled),
                IndexRecord::Repo(_) => Ok(()),
            }
        })
        .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(seen, 2);
    }

    #[test]
    fn test_malformed_document_is_parse_error() {
        let truncated = &DOC.as_bytes()[..DOC.len() - 20];
        let err = stream_index_v2(truncated, |_| Ok(())).unwrap_err();
        assert!(matches!(err, Error::ParseError(_)));

        let err = stream_index_v2(&b"[1, 2]"[..], |_| Ok(())).unwrap_err();
        assert!(matches!(err, Error::ParseError(_)));
    }

    #[test]
    fn test_trailing_garbage_rejected() {
        let doc = format!("{DOC} trailing");
        assert!(stream_index_v2(doc.as_bytes(), |_| Ok(())).is_err());
    }

    #[test]
    fn test_records_iterator() {
        let records: Vec<_> = IndexV2Records::spawn(std::io::Cursor::new(DOC.as_bytes().to_vec()))
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn test_records_iterator_surfaces_error_last() {
        let doc = r#"{"packages": {"a": {}, "b": "#.as_bytes().to_vec();
        let mut iter = IndexV2Records::spawn(std::io::Cursor::new(doc)).unwrap();
        assert!(matches!(iter.next(), Some(Ok(IndexRecord::Package { .. }))));
        assert!(matches!(iter.next(), Some(Err(Error::ParseError(_)))));
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_records_iterator_drop_stops_parser() {
        let mut packages = serde_json::Map::new();
        for i in 0..(RECORD_BUFFER * 4) {
            packages.insert(format!("pkg{i}"), json!({"metadata": {}}));
        }
        let doc = serde_json::to_vec(&json!({"packages": packages})).unwrap();
        let mut iter = IndexV2Records::spawn(std::io::Cursor::new(doc)).unwrap();
        assert!(iter.next().is_some());
        drop(iter);
    }

    #[test]
    fn test_typed_roundtrip_is_stable() {
        let package: PackageV2 = PackageV2::from_value(
            "x",
            json!({
                "metadata": {"name": {"en-US": "X"}, "added": 5, "lastUpdated": 6},
                "versions": {
                    "abc": {
                        "added": 5,
                        "file": {"name": "/x.apk", "sha256": "abc", "size": 3},
                        "manifest": {"versionCode": 3, "versionName": "1.0"},
                        "releaseChannels": ["Beta"]
                    }
                }
            }),
        )
        .unwrap();
        assert!(!package.versions["abc"].is_stable());
        let first = serde_json::to_vec(&package).unwrap();
        let again: PackageV2 = serde_json::from_slice(&first).unwrap();
        assert_eq!(first, serde_json::to_vec(&again).unwrap());
    }
}

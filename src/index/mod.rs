// src/index/mod.rs

//! Repository index formats
//!
//! - `v1`: the legacy monolithic document (`index-v1.json`)
//! - `v2`: the unified document (`index-v2.json`) and its streaming decoder
//! - `entry`: the small signed entry point listing the full index and diffs
//! - `convert`: pure V1 -> V2 conversion
//! - `diff`: JSON merge patches used by incremental updates

pub mod convert;
pub mod diff;
pub mod entry;
pub mod v1;
pub mod v2;

pub use convert::convert_v1;
pub use diff::{apply_patch, merge_patch};
pub use entry::{Entry, EntryFile};
pub use v1::{AppV1, IndexV1, PackageVersionV1, RepoV1};
pub use v2::{
    DictionaryEntryV2, FileV2, IndexRecord, IndexV2, IndexV2Records, LocalizedText, ManifestV2,
    MetadataV2, MirrorV2, PackageV2, RepoV2, VersionV2, stream_index_v2,
};

use serde::{Deserialize, Deserializer};

/// Locale used when a legacy field carries no locale of its own
pub const DEFAULT_LOCALE: &str = "en-US";

/// Release channel assigned to versions newer than the suggested one
pub const RELEASE_CHANNEL_BETA: &str = "Beta";

/// Signed container entry names
pub const INDEX_V1_JAR: &str = "index-v1.jar";
pub const INDEX_V1_JSON: &str = "index-v1.json";
pub const ENTRY_JAR: &str = "entry.jar";
pub const ENTRY_JSON: &str = "entry.json";

/// Which wire format a repository was last updated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    V1,
    V2,
}

impl IndexFormat {
    pub fn as_i32(self) -> i32 {
        match self {
            IndexFormat::V1 => 1,
            IndexFormat::V2 => 2,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(IndexFormat::V1),
            2 => Some(IndexFormat::V2),
            _ => None,
        }
    }
}

impl std::fmt::Display for IndexFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexFormat::V1 => write!(f, "v1"),
            IndexFormat::V2 => write!(f, "v2"),
        }
    }
}

/// Accept integers that legacy indexes sometimes encode as strings
pub(crate) fn int_or_string<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IntOrString {
        Int(i64),
        Str(String),
    }

    match Option::<IntOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(IntOrString::Int(n)) => Ok(Some(n)),
        Some(IntOrString::Str(s)) if s.trim().is_empty() => Ok(None),
        Some(IntOrString::Str(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("expected an integer, got \"{s}\""))),
    }
}

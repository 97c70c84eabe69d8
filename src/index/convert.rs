// src/index/convert.rs

//! Legacy -> unified index conversion
//!
//! Pure: no I/O, no shared state. Every map in the output is ordered, so the
//! same input always serialises to the same bytes.

use super::v1::{AppV1, IndexV1, PackageVersionV1, RepoV1};
use super::v2::{
    DictionaryEntryV2, FileV2, IndexV2, LocalizedFile, LocalizedText, ManifestV2, MetadataV2,
    MirrorV2, PackageV2, PermissionV2, RepoV2, SignerV2, UsesSdkV2, VersionV2, FeatureV2,
};
use super::RELEASE_CHANNEL_BETA;
use std::collections::BTreeMap;

/// Dictionaries referenced by the converted packages, built per call
#[derive(Default)]
struct Dictionaries {
    anti_features: BTreeMap<String, DictionaryEntryV2>,
    categories: BTreeMap<String, DictionaryEntryV2>,
    release_channels: BTreeMap<String, DictionaryEntryV2>,
}

impl Dictionaries {
    // First reference creates an empty entry; later references never touch it.
    fn note(map: &mut BTreeMap<String, DictionaryEntryV2>, key: &str) {
        if !map.contains_key(key) {
            map.insert(key.to_string(), DictionaryEntryV2::default());
        }
    }
}

/// Convert a legacy index into the unified model
///
/// `locale` receives text that the legacy format carries without a locale.
/// Only apps listed under `apps` produce packages; orphaned version lists
/// are dropped.
pub fn convert_v1(index: IndexV1, locale: &str) -> IndexV2 {
    let mut dicts = Dictionaries::default();
    let mut packages = BTreeMap::new();

    for app in &index.apps {
        let package = convert_app(app, app.versions(&index), locale, &mut dicts);
        packages.insert(app.package_name.clone(), package);
    }

    IndexV2 {
        repo: convert_repo(&index.repo, locale, dicts),
        packages,
    }
}

fn convert_repo(repo: &RepoV1, locale: &str, dicts: Dictionaries) -> RepoV2 {
    RepoV2 {
        name: localize(Some(&repo.name).filter(|n| !n.is_empty()), locale),
        description: localize(repo.description.as_ref(), locale),
        icon: localize_file(repo.icon.as_deref().map(|i| format!("/icons/{i}")), locale),
        address: repo.address.clone(),
        web_base_url: None,
        mirrors: repo
            .mirrors
            .iter()
            .map(|url| MirrorV2 {
                url: url.clone(),
                location: None,
                is_primary: false,
            })
            .collect(),
        timestamp: repo.timestamp,
        anti_features: dicts.anti_features,
        categories: dicts.categories,
        release_channels: dicts.release_channels,
    }
}

fn convert_app(
    app: &AppV1,
    versions: &[PackageVersionV1],
    locale: &str,
    dicts: &mut Dictionaries,
) -> PackageV2 {
    for category in &app.categories {
        Dictionaries::note(&mut dicts.categories, category);
    }

    let whats_new = localized_field(app, locale, app.whats_new.as_ref(), |l| l.whats_new.as_ref());

    let mut converted = BTreeMap::new();
    for (position, version) in versions.iter().enumerate() {
        let mut v2 = convert_version(app, version, dicts);
        if position == 0 {
            v2.whats_new = whats_new.clone();
        }
        // Keyed by hash: a later duplicate replaces an earlier one
        converted.insert(version.hash.clone(), v2);
    }

    PackageV2 {
        metadata: MetadataV2 {
            name: localized_field(app, locale, app.name.as_ref(), |l| l.name.as_ref()),
            summary: localized_field(app, locale, app.summary.as_ref(), |l| l.summary.as_ref()),
            description: localized_field(app, locale, app.description.as_ref(), |l| {
                l.description.as_ref()
            }),
            icon: localize_file(
                app.icon.as_deref().map(|i| format!("/icons/{i}")),
                locale,
            ),
            added: app.added.unwrap_or(0),
            last_updated: app.last_updated.or(app.added).unwrap_or(0),
            web_site: app.web_site.clone(),
            source_code: app.source_code.clone(),
            issue_tracker: app.issue_tracker.clone(),
            changelog: app.changelog.clone(),
            donate: app.donate.iter().cloned().collect(),
            license: app.license.clone(),
            author_name: app.author_name.clone(),
            author_email: app.author_email.clone(),
            categories: app.categories.clone(),
        },
        versions: converted,
    }
}

fn convert_version(app: &AppV1, version: &PackageVersionV1, dicts: &mut Dictionaries) -> VersionV2 {
    let version_code = version.version_code.unwrap_or(0);

    let mut release_channels = Vec::new();
    if matches!(app.suggested_version_code, Some(suggested) if version_code > suggested) {
        Dictionaries::note(&mut dicts.release_channels, RELEASE_CHANNEL_BETA);
        release_channels.push(RELEASE_CHANNEL_BETA.to_string());
    }

    let mut anti_features = BTreeMap::new();
    for key in app.anti_features.iter().chain(&version.anti_features) {
        Dictionaries::note(&mut dicts.anti_features, key);
        anti_features.insert(key.clone(), LocalizedText::new());
    }

    let uses_sdk = match (version.min_sdk_version, version.target_sdk_version) {
        (None, None) => None,
        (min, target) => {
            let min = min.unwrap_or(1);
            Some(UsesSdkV2 {
                min_sdk_version: min,
                target_sdk_version: target.unwrap_or(min),
            })
        }
    };

    VersionV2 {
        added: version.added.unwrap_or(0),
        file: FileV2 {
            name: format!("/{}", version.apk_name),
            sha256: Some(version.hash.clone()),
            size: Some(version.size),
            ipfs_cid_v1: None,
        },
        src: version.src_name.as_ref().map(|name| FileV2 {
            name: format!("/{name}"),
            ..FileV2::default()
        }),
        manifest: ManifestV2 {
            version_name: version.version_name.clone(),
            version_code,
            uses_sdk,
            max_sdk_version: version.max_sdk_version,
            signer: version.signer.as_ref().map(|s| SignerV2 {
                sha256: vec![s.clone()],
            }),
            uses_permission: version
                .uses_permission
                .iter()
                .map(|p| PermissionV2 {
                    name: p.name().to_string(),
                    max_sdk_version: p.max_sdk_version(),
                })
                .collect(),
            nativecode: version.nativecode.clone(),
            features: version
                .features
                .iter()
                .map(|name| FeatureV2 { name: name.clone() })
                .collect(),
        },
        release_channels,
        anti_features,
        whats_new: LocalizedText::new(),
    }
}

/// Collect a field from `localized`, adding the unlocalized value under
/// `locale` when that locale has none
fn localized_field<F>(
    app: &AppV1,
    locale: &str,
    fallback: Option<&String>,
    pick: F,
) -> LocalizedText
where
    F: Fn(&super::v1::LocalizedV1) -> Option<&String>,
{
    let mut text: LocalizedText = app
        .localized
        .iter()
        .filter_map(|(loc, fields)| pick(fields).map(|v| (loc.clone(), v.clone())))
        .filter(|(_, v)| !v.is_empty())
        .collect();

    if let Some(value) = fallback.filter(|v| !v.is_empty()) {
        text.entry(locale.to_string()).or_insert_with(|| value.clone());
    }
    text
}

fn localize(value: Option<&String>, locale: &str) -> LocalizedText {
    value
        .map(|v| LocalizedText::from([(locale.to_string(), v.clone())]))
        .unwrap_or_default()
}

fn localize_file(name: Option<String>, locale: &str) -> LocalizedFile {
    name.map(|name| {
        LocalizedFile::from([(
            locale.to_string(),
            FileV2 {
                name,
                ..FileV2::default()
            },
        )])
    })
    .unwrap_or_default()
}

// src/download/http.rs

//! HTTP implementation of [`ArtifactSource`]
//!
//! Mirrors are tried canonical address first, then in declared order. Each
//! attempt is bounded by the per-mirror timeout, streams into a `.part` file
//! through a size-limited digester, and is renamed into place only after
//! the hash and size check out. Integrity and transport failures move on to
//! the next mirror; anything else aborts the fetch.

use super::validator::ResponseValidators;
use super::{ArtifactSource, Downloaded, FetchOutcome, FetchRequest};
use crate::config::NetworkSection;
use crate::dns::{CachingResolver, DnsCache, send_with_dns_retry};
use crate::error::{Error, Result};
use crate::hash::{Digester, hashes_match};
use crate::repository::{Mirror, order_mirrors};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

/// Downloader backed by a shared `reqwest` client
pub struct HttpDownloader {
    client: Client,
    dns: Arc<DnsCache>,
    config: NetworkSection,
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

fn is_cancelled(cancel: Option<&AtomicBool>) -> bool {
    cancel.is_some_and(|flag| flag.load(Ordering::Relaxed))
}

fn transport_error(url: &Url, err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::TimeoutError(format!("{url}: {err}"))
    } else {
        Error::DownloadError(format!("{url}: {err}"))
    }
}

impl HttpDownloader {
    /// Create a downloader resolving names through `dns`
    pub fn new(config: &NetworkSection, dns: Arc<DnsCache>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .user_agent(config.user_agent.clone())
            .dns_resolver(Arc::new(CachingResolver::new(dns.clone())))
            .build()
            .map_err(|e| Error::InitError(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            dns,
            config: config.clone(),
        })
    }

    pub fn dns_cache(&self) -> &Arc<DnsCache> {
        &self.dns
    }

    /// HEAD the artifact and report its validators
    ///
    /// Probe failures are not errors; the GET that follows will tell.
    async fn probe(&self, url: &Url) -> Option<ResponseValidators> {
        match send_with_dns_retry(&self.dns, url, || self.client.head(url.clone())).await {
            Ok(response) if response.status().is_success() => {
                Some(ResponseValidators::from_headers(response.headers()))
            }
            Ok(response) => {
                debug!("HEAD {} returned {}", url, response.status());
                None
            }
            Err(e) => {
                debug!("HEAD {} failed: {}", url, e);
                None
            }
        }
    }

    /// One mirror attempt
    async fn attempt(&self, url: &Url, mirror: &Mirror, request: &FetchRequest<'_>) -> Result<FetchOutcome> {
        if let Some(stored) = request.validator {
            if let Some(validators) = self.probe(url).await {
                if validators.matches(stored) {
                    debug!("{} unchanged (validator {})", url, stored);
                    return Ok(FetchOutcome::Unchanged);
                }
            }
        }

        let response = send_with_dns_retry(&self.dns, url, || self.client.get(url.clone()))
            .await
            .map_err(|e| transport_error(url, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Err(Error::NotFoundError(format!("{url} returned {status}")));
        }
        if !status.is_success() {
            return Err(Error::DownloadError(format!("{url} returned HTTP {status}")));
        }

        let target = request.target;
        let limit = target.size.unwrap_or(self.config.max_download_size);
        let validators = ResponseValidators::from_headers(response.headers());
        if validators.content_length.is_some_and(|len| len > limit) {
            return Err(Error::SizeLimitExceeded { limit });
        }
        let total = target.size.or(validators.content_length);

        if let Some(parent) = request.dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let part = part_path(request.dest);
        let mut file = tokio::fs::File::create(&part).await?;
        let mut stream = response.bytes_stream();
        let mut digester = Digester::new(limit);

        while let Some(chunk) = stream.next().await {
            if is_cancelled(request.cancel) {
                return Err(Error::Cancelled);
            }
            let chunk = chunk.map_err(|e| transport_error(url, e))?;
            digester.update(&chunk)?;
            file.write_all(&chunk).await?;
            request.progress.bytes_read(digester.count(), total);
        }
        file.flush().await?;
        drop(file);

        let (actual, bytes) = digester.finalize();
        if let Some(expected) = target.size {
            if bytes != expected {
                return Err(Error::SizeMismatch {
                    expected,
                    actual: bytes,
                });
            }
        }
        if let Some(expected) = &target.sha256 {
            if !hashes_match(expected, &actual) {
                return Err(Error::ChecksumMismatch {
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        tokio::fs::rename(&part, request.dest).await?;
        Ok(FetchOutcome::Downloaded(Downloaded {
            path: request.dest.to_path_buf(),
            validator: validators.preferred(),
            bytes,
            sha256: actual,
            mirror: mirror.url.clone(),
        }))
    }
}

#[async_trait]
impl ArtifactSource for HttpDownloader {
    async fn fetch(&self, request: FetchRequest<'_>) -> Result<FetchOutcome> {
        let mirrors = order_mirrors(request.address, request.mirrors.to_vec());
        let name = &request.target.name;
        let part = part_path(request.dest);

        let mut last_not_found: Option<Error> = None;
        let mut last_failure: Option<Error> = None;

        for mirror in &mirrors {
            if is_cancelled(request.cancel) {
                return Err(Error::Cancelled);
            }

            let url = match mirror.artifact_url(name, request.target.ipfs_cid.as_deref()) {
                Ok(Some(url)) => url,
                Ok(None) => {
                    debug!("Skipping gateway {} for {} (no content id)", mirror.url, name);
                    continue;
                }
                Err(e) => {
                    warn!("Skipping mirror {}: {}", mirror.url, e);
                    last_failure = Some(e);
                    continue;
                }
            };

            request.progress.set_message(&format!("Fetching {url}"));
            let timeout = self.config.mirror_timeout();
            let result = match tokio::time::timeout(timeout, self.attempt(&url, mirror, &request)).await {
                Ok(result) => result,
                Err(_) => Err(Error::TimeoutError(format!(
                    "{url} after {}s",
                    timeout.as_secs()
                ))),
            };

            match result {
                Ok(outcome) => {
                    if let FetchOutcome::Downloaded(d) = &outcome {
                        info!("Fetched {} ({} bytes) from {}", name, d.bytes, d.mirror);
                    }
                    return Ok(outcome);
                }
                Err(e) => {
                    if tokio::fs::try_exists(&part).await.unwrap_or(false) {
                        let _ = tokio::fs::remove_file(&part).await;
                    }
                    if !e.is_mirror_recoverable() {
                        return Err(e);
                    }
                    if e.is_integrity() {
                        warn!("Mirror {} served bad content for {}: {}", mirror.url, name, e);
                    } else {
                        warn!("Mirror {} failed for {}: {}", mirror.url, name, e);
                    }
                    if e.is_not_found() {
                        last_not_found = Some(e);
                    } else {
                        last_failure = Some(e);
                    }
                }
            }
        }

        // NotFound only when every mirror agreed the artifact is gone
        Err(last_failure.or(last_not_found).unwrap_or_else(|| {
            Error::NotFoundError(format!("No usable mirror for {name}"))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::ArtifactTarget;
    use crate::hash::sha256;
    use crate::progress::SilentProgress;

    const BODY: &[u8] = b"signed index bytes";

    fn downloader() -> HttpDownloader {
        let config = NetworkSection {
            mirror_timeout_secs: 5,
            ..NetworkSection::default()
        };
        HttpDownloader::new(&config, Arc::new(DnsCache::new(true))).unwrap()
    }

    fn target() -> ArtifactTarget {
        ArtifactTarget::named("/index-v1.jar")
            .with_sha256(sha256(BODY))
            .with_size(BODY.len() as u64)
    }

    async fn fetch(
        downloader: &HttpDownloader,
        address: &str,
        mirrors: &[Mirror],
        target: &ArtifactTarget,
        dest: &Path,
        validator: Option<&str>,
        cancel: Option<&AtomicBool>,
    ) -> Result<FetchOutcome> {
        let progress = SilentProgress::new();
        downloader
            .fetch(FetchRequest {
                address,
                mirrors,
                target,
                dest,
                validator,
                cancel,
                progress: &progress,
            })
            .await
    }

    #[tokio::test]
    async fn test_canonical_mirror_first() {
        let mut canonical = mockito::Server::new_async().await;
        let mut other = mockito::Server::new_async().await;
        let hit = canonical
            .mock("GET", "/index-v1.jar")
            .with_body(BODY)
            .expect(1)
            .create_async()
            .await;
        let skipped = other.mock("GET", "/index-v1.jar").expect(0).create_async().await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("index-v1.jar");
        let mirrors = vec![Mirror::new(other.url()), Mirror::new(canonical.url())];
        let outcome = fetch(&downloader(), &canonical.url(), &mirrors, &target(), &dest, None, None)
            .await
            .unwrap();

        let FetchOutcome::Downloaded(d) = outcome else {
            panic!("expected a download");
        };
        assert_eq!(d.mirror, canonical.url());
        assert_eq!(std::fs::read(&dest).unwrap(), BODY);
        hit.assert_async().await;
        skipped.assert_async().await;
    }

    #[tokio::test]
    async fn test_corrupt_mirror_falls_back() {
        let mut bad = mockito::Server::new_async().await;
        let mut good = mockito::Server::new_async().await;
        let mut corrupted = BODY.to_vec();
        corrupted[0] ^= 1;
        bad.mock("GET", "/index-v1.jar").with_body(corrupted).create_async().await;
        good.mock("GET", "/index-v1.jar").with_body(BODY).create_async().await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("index-v1.jar");
        let mirrors = vec![Mirror::new(bad.url()), Mirror::new(good.url())];
        let outcome = fetch(&downloader(), &bad.url(), &mirrors, &target(), &dest, None, None)
            .await
            .unwrap();

        assert!(matches!(outcome, FetchOutcome::Downloaded(d) if d.mirror == good.url()));
        assert!(!part_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_truncated_body_is_integrity_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/index-v1.jar")
            .with_body(&BODY[..BODY.len() - 3])
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("index-v1.jar");
        let mirrors = vec![Mirror::new(server.url())];
        let err = fetch(&downloader(), &server.url(), &mirrors, &target(), &dest, None, None)
            .await
            .unwrap_err();

        assert!(err.is_integrity(), "unexpected error: {err}");
        assert!(matches!(
            err,
            Error::SizeMismatch { expected, actual } if expected == BODY.len() as u64 && actual == expected - 3
        ));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_corruption_everywhere_is_integrity_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/index-v1.jar")
            .with_body(b"signed index bytez")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("index-v1.jar");
        let mirrors = vec![Mirror::new(server.url())];
        let err = fetch(&downloader(), &server.url(), &mirrors, &target(), &dest, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ChecksumMismatch { .. }));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_oversized_body_aborted() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/big")
            .with_chunked_body(|w| {
                use std::io::Write;
                w.write_all(&[0u8; 4096])
            })
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("big");
        let small = ArtifactTarget::named("/big").with_size(16);
        let err = fetch(&downloader(), &server.url(), &[Mirror::new(server.url())], &small, &dest, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SizeLimitExceeded { limit: 16 }));
        assert!(!part_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_not_found_only_when_all_agree() {
        let mut gone = mockito::Server::new_async().await;
        let mut broken = mockito::Server::new_async().await;
        gone.mock("GET", "/index-v1.jar").with_status(404).create_async().await;
        broken.mock("GET", "/index-v1.jar").with_status(500).create_async().await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("index-v1.jar");

        let err = fetch(&downloader(), &gone.url(), &[Mirror::new(gone.url())], &target(), &dest, None, None)
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let mirrors = vec![Mirror::new(gone.url()), Mirror::new(broken.url())];
        let err = fetch(&downloader(), &gone.url(), &mirrors, &target(), &dest, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DownloadError(_)));
    }

    #[tokio::test]
    async fn test_matching_validator_skips_download() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("HEAD", "/index-v1.jar")
            .with_header("etag", "\"v7\"")
            .create_async()
            .await;
        let get = server.mock("GET", "/index-v1.jar").expect(0).create_async().await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("index-v1.jar");
        let outcome = fetch(
            &downloader(),
            &server.url(),
            &[Mirror::new(server.url())],
            &ArtifactTarget::named("/index-v1.jar"),
            &dest,
            Some("W/\"v7\""),
            None,
        )
        .await
        .unwrap();
        assert_eq!(outcome, FetchOutcome::Unchanged);
        get.assert_async().await;
    }

    #[tokio::test]
    async fn test_download_reports_validator() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/index-v1.jar")
            .with_header("etag", "\"v8\"")
            .with_body(BODY)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("index-v1.jar");
        let outcome = fetch(&downloader(), &server.url(), &[Mirror::new(server.url())], &target(), &dest, None, None)
            .await
            .unwrap();
        assert!(matches!(outcome, FetchOutcome::Downloaded(d) if d.validator.as_deref() == Some("v8")));
    }

    #[tokio::test]
    async fn test_gateway_without_cid_skipped() {
        let mut server = mockito::Server::new_async().await;
        let mirror_hit = server
            .mock("GET", "/index-v1.jar")
            .with_body(BODY)
            .expect(1)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("index-v1.jar");
        let mirrors = vec![
            Mirror::ipfs_gateway("http://127.0.0.2:9"),
            Mirror::new(server.url()),
        ];
        let outcome = fetch(&downloader(), "https://canonical.invalid", &mirrors, &target(), &dest, None, None)
            .await
            .unwrap();
        assert!(matches!(outcome, FetchOutcome::Downloaded(_)));
        mirror_hit.assert_async().await;
    }

    #[tokio::test]
    async fn test_cancelled_before_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("index-v1.jar");
        let cancel = AtomicBool::new(true);
        let err = fetch(
            &downloader(),
            "http://127.0.0.2:9",
            &[Mirror::new("http://127.0.0.2:9")],
            &target(),
            &dest,
            None,
            Some(&cancel),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test]
    async fn test_no_mirrors_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = fetch(&downloader(), "https://a.invalid", &[], &target(), &dir.path().join("x"), None, None)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}

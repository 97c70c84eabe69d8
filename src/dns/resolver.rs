// src/dns/resolver.rs

//! Cache-aware name resolution for the HTTP client
//!
//! [`CachingResolver`] plugs into `reqwest` so every connection consults the
//! [`DnsCache`] before the system resolver. [`send_with_dns_retry`] handles
//! the case where a cached address set has gone bad.

use super::cache::DnsCache;
use hyper::client::connect::dns::Name;
use reqwest::dns::{Addrs, Resolve, Resolving};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Resolver that answers from the cache and fills it on a miss
#[derive(Debug, Clone)]
pub struct CachingResolver {
    cache: Arc<DnsCache>,
}

impl CachingResolver {
    pub fn new(cache: Arc<DnsCache>) -> Self {
        Self { cache }
    }

    /// Resolve `host`, preferring cached addresses
    pub async fn resolve_host(&self, host: &str) -> std::io::Result<Vec<IpAddr>> {
        if let Some(cached) = self.cache.lookup(host) {
            debug!("DNS cache hit for {}", host);
            return Ok(cached);
        }

        let mut addresses: Vec<IpAddr> = Vec::new();
        for addr in tokio::net::lookup_host((host, 0)).await? {
            if !addresses.contains(&addr.ip()) {
                addresses.push(addr.ip());
            }
        }
        debug!("Resolved {} to {} address(es)", host, addresses.len());
        // A disabled cache keeps its entries untouched until re-enabled
        if self.cache.is_enabled() {
            self.cache.insert(host, addresses.clone());
        }
        Ok(addresses)
    }
}

// Lets CachingResolver be passed to reqwest::ClientBuilder::dns_resolver
impl Resolve for CachingResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let this = self.clone();
        Box::pin(async move {
            let addresses = this
                .resolve_host(name.as_str())
                .await
                .map_err(|err| -> BoxError { Box::new(err) })?;
            let addrs: Addrs = Box::new(
                addresses
                    .into_iter()
                    .map(|ip| SocketAddr::new(ip, 0))
                    .collect::<Vec<_>>()
                    .into_iter(),
            );
            Ok(addrs)
        })
    }
}

/// Failures that suggest the addresses we connected to are wrong
fn is_address_failure(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout()
}

/// Send a request, retrying once with fresh resolution on connect failure
///
/// `build` is called once per attempt. When the first attempt fails to
/// connect and the host was served from the enabled cache, the entry is
/// evicted so the retry resolves again (and repopulates the cache on
/// success). The second failure is returned as is.
pub async fn send_with_dns_retry<F>(
    cache: &DnsCache,
    url: &Url,
    build: F,
) -> std::result::Result<reqwest::Response, reqwest::Error>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let err = match build().send().await {
        Ok(response) => return Ok(response),
        Err(e) => e,
    };

    let host = match url.host_str() {
        Some(host) if is_address_failure(&err) => host,
        _ => return Err(err),
    };
    if host.parse::<IpAddr>().is_ok() || cache.lookup(host).is_none() {
        return Err(err);
    }

    warn!(
        "Request to {} failed with cached addresses ({}); re-resolving once",
        host, err
    );
    cache.remove(host);
    build().send().await
}

// src/dns/cache.rs

//! Host to address cache
//!
//! A plain key-value store with a global switch. The switch is read on every
//! lookup; flipping it neither clears nor repopulates entries.

use dashmap::DashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};

/// Resolution cache shared by every client in the process
#[derive(Debug, Default)]
pub struct DnsCache {
    entries: DashMap<String, Vec<IpAddr>>,
    enabled: AtomicBool,
}

fn key(host: &str) -> String {
    host.trim_end_matches('.').to_ascii_lowercase()
}

impl DnsCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            entries: DashMap::new(),
            enabled: AtomicBool::new(enabled),
        }
    }

    /// Store the addresses for `host`, replacing any previous set
    pub fn insert(&self, host: &str, addresses: Vec<IpAddr>) {
        if addresses.is_empty() {
            return;
        }
        self.entries.insert(key(host), addresses);
    }

    /// Cached addresses, or `None` when absent or the cache is disabled
    pub fn lookup(&self, host: &str) -> Option<Vec<IpAddr>> {
        if !self.is_enabled() {
            return None;
        }
        self.entries.get(&key(host)).map(|entry| entry.value().clone())
    }

    /// Evict `host`, returning what was cached
    pub fn remove(&self, host: &str) -> Option<Vec<IpAddr>> {
        self.entries.remove(&key(host)).map(|(_, addresses)| addresses)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

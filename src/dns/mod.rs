// src/dns/mod.rs

//! Application-level DNS cache
//!
//! System or ISP resolvers can hand out stale or hijacked answers. Addresses
//! that worked once are kept here and served ahead of system resolution; a
//! connect failure against cached addresses evicts them and retries once.

mod cache;
mod resolver;

pub use cache::DnsCache;
pub use resolver::{CachingResolver, send_with_dns_retry};

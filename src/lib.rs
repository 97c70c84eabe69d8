// src/lib.rs

//! Reposync
//!
//! Keeps a local catalog of remote software repositories in sync with their
//! signed indexes.
//!
//! # Architecture
//!
//! - Database-first: repositories, packages and versions live in SQLite
//! - Signed indexes: every index is verified against a pinned (or first-use)
//!   certificate before anything is written
//! - Two wire formats: the legacy monolithic index and the unified index with
//!   incremental diffs
//! - Mirror-aware downloads: canonical address first, hash-checked, with a
//!   DNS cache that evicts and retries once on connection failure

pub mod config;
pub mod db;
pub mod dns;
pub mod download;
mod error;
pub mod hash;
pub mod index;
pub mod progress;
pub mod repository;
pub mod signing;
pub mod update;

pub use config::SyncConfig;
pub use dns::DnsCache;
pub use download::{ArtifactSource, ArtifactTarget, FetchOutcome, FetchRequest, HttpDownloader};
pub use error::{Error, Result};
pub use index::IndexFormat;
pub use progress::{
    CallbackProgress, CliProgress, LogProgress, ProgressEvent, SilentProgress, UpdateProgress,
};
pub use repository::Mirror;
pub use signing::{Certificate, SigningKeyPair};
pub use update::{IndexUpdater, UpdateResult, UpdateState, UpdateTask};

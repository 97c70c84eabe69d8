// src/cli/mod.rs
//! CLI definitions for reposync
//!
//! This module contains all command-line interface definitions using clap.
//! The actual command implementations are in the `commands` module.
//!
//! - `init` / `bootstrap` - Create the database and seed default repositories
//! - `repo` - Repository and mirror management
//! - `update` - Synchronise one or all repositories with their signed indexes
//! - `fetch` - Download an artifact through a repository's mirrors
//! - `index` - Publisher tools (convert, keygen, sign, verify)

use clap::{Args, Parser, Subcommand};
use reposync::SyncConfig;
use std::path::PathBuf;

mod index;
mod repo;

pub use index::IndexCommands;
pub use repo::{MirrorCommands, RepoCommands};

#[derive(Parser)]
#[command(name = "reposync")]
#[command(version)]
#[command(about = "Synchronise signed repository indexes into a local catalog", long_about = None)]
pub struct Cli {
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (default: ~/.config/reposync/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Database location shared by every command that touches the catalog
#[derive(Args, Debug, Clone)]
pub struct DbArgs {
    /// Path to the database file (overrides the configured db_path)
    #[arg(short, long)]
    pub db_path: Option<String>,
}

impl DbArgs {
    pub fn resolve(&self, config: &SyncConfig) -> String {
        self.db_path
            .clone()
            .unwrap_or_else(|| config.update.db_path.to_string_lossy().into_owned())
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the reposync database
    Init {
        #[command(flatten)]
        db: DbArgs,

        /// Do not seed the bundled default repositories
        #[arg(long)]
        no_defaults: bool,
    },

    /// Repository management
    #[command(subcommand)]
    Repo(RepoCommands),

    /// Seed repositories from a JSON list into an empty database
    Bootstrap {
        /// Repository list (default: the bundled list)
        file: Option<String>,

        #[command(flatten)]
        db: DbArgs,
    },

    /// Update one repository, or every enabled repository
    Update {
        /// Repository name (all enabled repositories if omitted)
        name: Option<String>,

        /// Expected certificate fingerprint for a repository not yet trusted
        #[arg(long)]
        fingerprint: Option<String>,

        #[command(flatten)]
        db: DbArgs,
    },

    /// Download an artifact from a repository's mirrors
    Fetch {
        /// Repository name
        repo: String,

        /// Path of the artifact relative to the repository root
        name: String,

        /// Expected SHA-256 of the artifact
        #[arg(long)]
        sha256: Option<String>,

        /// Expected size in bytes
        #[arg(long)]
        size: Option<u64>,

        /// Destination file (default: the artifact's file name)
        #[arg(short, long)]
        output: Option<String>,

        #[command(flatten)]
        db: DbArgs,
    },

    /// Index publishing tools
    #[command(subcommand)]
    Index(IndexCommands),
}

// src/cli/repo.rs
//! Repository management commands

use super::DbArgs;
use clap::Subcommand;

#[derive(Subcommand)]
pub enum RepoCommands {
    /// Add a repository
    Add {
        /// Repository name
        name: String,

        /// Canonical repository URL
        url: String,

        /// Add repository in disabled state
        #[arg(long)]
        disabled: bool,

        /// Update priority (heavier repositories update first)
        #[arg(short, long, default_value = "0")]
        weight: i32,

        #[command(flatten)]
        db: DbArgs,
    },

    /// List repositories
    List {
        /// Include disabled repositories
        #[arg(short, long)]
        all: bool,

        #[command(flatten)]
        db: DbArgs,
    },

    /// Remove a repository and everything indexed from it
    Remove {
        /// Repository name
        name: String,

        #[command(flatten)]
        db: DbArgs,
    },

    /// Enable a repository
    Enable {
        /// Repository name
        name: String,

        #[command(flatten)]
        db: DbArgs,
    },

    /// Disable a repository
    Disable {
        /// Repository name
        name: String,

        #[command(flatten)]
        db: DbArgs,
    },

    /// Manage a repository's mirrors
    #[command(subcommand)]
    Mirror(MirrorCommands),
}

#[derive(Subcommand)]
pub enum MirrorCommands {
    /// Add a user mirror
    Add {
        /// Repository name
        name: String,

        /// Mirror base URL
        url: String,

        /// The mirror is a content-addressed gateway (serves /ipfs/{cid})
        #[arg(long)]
        ipfs: bool,

        /// Country code or free-form location
        #[arg(long)]
        location: Option<String>,

        #[command(flatten)]
        db: DbArgs,
    },

    /// Remove a user mirror
    Remove {
        /// Repository name
        name: String,

        /// Mirror base URL
        url: String,

        #[command(flatten)]
        db: DbArgs,
    },

    /// Re-enable a disabled mirror
    Enable {
        /// Repository name
        name: String,

        /// Mirror base URL
        url: String,

        #[command(flatten)]
        db: DbArgs,
    },

    /// Exclude a mirror (official or user) from downloads
    Disable {
        /// Repository name
        name: String,

        /// Mirror base URL
        url: String,

        #[command(flatten)]
        db: DbArgs,
    },
}

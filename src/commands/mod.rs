// src/commands/mod.rs
//! Command handlers for the reposync CLI

mod fetch;
mod index;
mod repo;
mod update;

// Re-export all command handlers
pub use fetch::cmd_fetch;
pub use index::{cmd_index_convert, cmd_index_keygen, cmd_index_sign, cmd_index_verify};
pub use repo::{
    cmd_bootstrap, cmd_init, cmd_mirror_add, cmd_mirror_enable, cmd_mirror_remove, cmd_repo_add,
    cmd_repo_enable, cmd_repo_list, cmd_repo_remove,
};
pub use update::cmd_update;

use anyhow::Result;
use reposync::db::models::Repository;
use rusqlite::Connection;

/// Look up a repository by name, failing with a user-facing message
fn find_repository(conn: &Connection, name: &str) -> Result<Repository> {
    Repository::find_by_name(conn, name)?
        .ok_or_else(|| anyhow::anyhow!("Repository '{}' not found", name))
}

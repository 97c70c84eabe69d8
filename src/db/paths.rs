// src/db/paths.rs
//! Centralized path derivation for reposync directories

use std::path::{Path, PathBuf};

/// Get the directory containing the database
pub fn db_dir(db_path: &str) -> PathBuf {
    Path::new(db_path)
        .parent()
        .unwrap_or(Path::new("/var/lib/reposync"))
        .to_path_buf()
}

/// Scratch directory for a single repository's downloads
pub fn repo_cache_dir(cache_root: &Path, repo_id: i64) -> PathBuf {
    cache_root.join("repos").join(repo_id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_dir() {
        assert_eq!(
            db_dir("/var/lib/reposync/reposync.db"),
            PathBuf::from("/var/lib/reposync")
        );
    }

    #[test]
    fn test_repo_cache_dir() {
        assert_eq!(
            repo_cache_dir(Path::new("/tmp/cache"), 7),
            PathBuf::from("/tmp/cache/repos/7")
        );
    }
}

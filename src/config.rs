// src/config.rs

//! Configuration for repository synchronisation
//!
//! Loaded from TOML. Every field has a default so an empty or missing file
//! yields a working configuration.
//!
//! ```toml
//! [network]
//! mirror_timeout_secs = 60
//! connect_timeout_secs = 10
//! max_download_size = 104857600
//! dns_cache_enabled = true
//!
//! [update]
//! max_concurrent_updates = 4
//! db_path = "/var/lib/reposync/reposync.db"
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default database location
pub const DEFAULT_DB_PATH: &str = "/var/lib/reposync/reposync.db";

/// Top-level configuration document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Transport settings
    #[serde(default)]
    pub network: NetworkSection,

    /// Updater settings
    #[serde(default)]
    pub update: UpdateSection,
}

/// `[network]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSection {
    /// Bound on a single mirror attempt, not the whole mirror sequence
    #[serde(default = "default_mirror_timeout")]
    pub mirror_timeout_secs: u64,

    /// TCP connect timeout
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Safety ceiling for artifacts with no declared size (bytes)
    #[serde(default = "default_max_download_size")]
    pub max_download_size: u64,

    /// Consult the DNS cache before system resolution
    #[serde(default = "default_dns_cache_enabled")]
    pub dns_cache_enabled: bool,
}

/// `[update]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSection {
    /// Distinct repositories updated at once
    #[serde(default = "default_max_concurrent_updates")]
    pub max_concurrent_updates: usize,

    /// SQLite database path
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Scratch directory for downloads awaiting verification
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

fn default_mirror_timeout() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_user_agent() -> String {
    format!("reposync/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_download_size() -> u64 {
    100 * 1024 * 1024 // 100 MiB
}

fn default_dns_cache_enabled() -> bool {
    true
}

fn default_max_concurrent_updates() -> usize {
    4
}

fn default_db_path() -> PathBuf {
    PathBuf::from(DEFAULT_DB_PATH)
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            mirror_timeout_secs: default_mirror_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            user_agent: default_user_agent(),
            max_download_size: default_max_download_size(),
            dns_cache_enabled: default_dns_cache_enabled(),
        }
    }
}

impl Default for UpdateSection {
    fn default() -> Self {
        Self {
            max_concurrent_updates: default_max_concurrent_updates(),
            db_path: default_db_path(),
            cache_dir: None,
        }
    }
}

impl NetworkSection {
    pub fn mirror_timeout(&self) -> Duration {
        Duration::from_secs(self.mirror_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl UpdateSection {
    /// Scratch directory, falling back to the user cache dir then the system temp dir
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .map(|d| d.join("reposync"))
                .unwrap_or_else(std::env::temp_dir)
        })
    }
}

impl SyncConfig {
    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: SyncConfig = toml::from_str(content)
            .map_err(|e| Error::ConfigError(format!("Invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration
    ///
    /// An explicit path must exist. Without one, the per-user config file is
    /// used if present, otherwise defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => {
                if !p.exists() {
                    return Err(Error::ConfigError(format!(
                        "Configuration file not found: {}",
                        p.display()
                    )));
                }
                p.to_path_buf()
            }
            None => match Self::default_path() {
                Some(p) if p.exists() => p,
                _ => return Ok(Self::default()),
            },
        };

        let content = std::fs::read_to_string(&path).map_err(|e| {
            Error::ConfigError(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Per-user configuration file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("reposync").join("config.toml"))
    }

    fn validate(&self) -> Result<()> {
        if self.update.max_concurrent_updates == 0 {
            return Err(Error::ConfigError(
                "max_concurrent_updates must be at least 1".to_string(),
            ));
        }
        if self.network.max_download_size == 0 {
            return Err(Error::ConfigError(
                "max_download_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = SyncConfig::from_toml("").unwrap();
        assert_eq!(config.network.mirror_timeout_secs, 60);
        assert_eq!(config.network.max_download_size, 100 * 1024 * 1024);
        assert!(config.network.dns_cache_enabled);
        assert_eq!(config.update.max_concurrent_updates, 4);
        assert_eq!(config.update.db_path, PathBuf::from(DEFAULT_DB_PATH));
    }

    #[test]
    fn test_partial_sections() {
        let config = SyncConfig::from_toml(
            r#"
            [network]
            mirror_timeout_secs = 5
            dns_cache_enabled = false

            [update]
            db_path = "/tmp/test.db"
            "#,
        )
        .unwrap();
        assert_eq!(config.network.mirror_timeout(), Duration::from_secs(5));
        assert!(!config.network.dns_cache_enabled);
        assert_eq!(config.network.connect_timeout_secs, 10);
        assert_eq!(config.update.db_path, PathBuf::from("/tmp/test.db"));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let err = SyncConfig::from_toml("[update]\nmax_concurrent_updates = 0").unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn test_missing_explicit_path() {
        let err = SyncConfig::load(Some(Path::new("/nonexistent/reposync.toml"))).unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn test_load_from_file() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(temp.path(), "[network]\nuser_agent = \"test-agent\"\n").unwrap();
        let config = SyncConfig::load(Some(temp.path())).unwrap();
        assert_eq!(config.network.user_agent, "test-agent");
    }
}

// src/error.rs

//! Error types for repository synchronisation
//!
//! One enum covers the whole crate. The variants fall into the classes the
//! updater cares about:
//!
//! | Class | Variants | Handling |
//! |-------|----------|----------|
//! | NotFound | `NotFoundError` | terminal `UpdateResult::NotFound` |
//! | Security | `SecurityError`, `StaleIndex` | fatal, never retried |
//! | Integrity | `ChecksumMismatch`, `SizeMismatch`, `SizeLimitExceeded` | next mirror |
//! | Transport | `DownloadError`, `TimeoutError` | next mirror, DNS retry |
//! | Parse | `ParseError` | fatal, rolled back |
//! | Precondition | `PreconditionError` | caller bug |

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while updating repositories or fetching artifacts
#[derive(Error, Debug)]
pub enum Error {
    /// Remote resource confirmed absent (HTTP 404 and friends)
    #[error("Not found: {0}")]
    NotFoundError(String),

    /// Signature, certificate or trust violation
    #[error("Security error: {0}")]
    SecurityError(String),

    /// Index timestamp went backwards
    #[error("Index is older than the stored one ({index} < {stored})")]
    StaleIndex { index: i64, stored: i64 },

    /// Downloaded content does not match its expected hash
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// Body ended short of its declared size
    #[error("Size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    /// Response body grew past the declared size or safety ceiling
    #[error("Download exceeded size limit of {limit} bytes")]
    SizeLimitExceeded { limit: u64 },

    /// Connectivity or HTTP failure
    #[error("Download error: {0}")]
    DownloadError(String),

    /// A single mirror attempt ran out of time
    #[error("Timed out: {0}")]
    TimeoutError(String),

    /// Malformed structural data
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Operation invoked on a repository in the wrong state
    #[error("Precondition failed: {0}")]
    PreconditionError(String),

    /// Filesystem failure
    #[error("I/O error: {0}")]
    IoError(String),

    /// SQLite failure
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Conflicts with existing local state
    #[error("Conflict: {0}")]
    ConflictError(String),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Component could not be initialised
    #[error("Initialization error: {0}")]
    InitError(String),

    /// Cooperative cancellation was observed
    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Whether a download failure should advance to the next mirror
    pub fn is_mirror_recoverable(&self) -> bool {
        matches!(
            self,
            Error::ChecksumMismatch { .. }
                | Error::SizeMismatch { .. }
                | Error::SizeLimitExceeded { .. }
                | Error::DownloadError(_)
                | Error::TimeoutError(_)
                | Error::NotFoundError(_)
        )
    }

    /// Whether fetched content failed verification
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            Error::ChecksumMismatch { .. } | Error::SizeMismatch { .. } | Error::SizeLimitExceeded { .. }
        )
    }

    /// Whether this error is a security failure that must never be retried
    pub fn is_security(&self) -> bool {
        matches!(self, Error::SecurityError(_) | Error::StaleIndex { .. })
    }

    /// Whether this error signals a missing remote resource
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFoundError(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::IoError(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::ParseError(format!("Invalid JSON: {e}"))
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(e: zip::result::ZipError) -> Self {
        Error::ParseError(format!("Invalid signed container: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mirror_recoverable_classes() {
        assert!(Error::DownloadError("refused".into()).is_mirror_recoverable());
        assert!(Error::TimeoutError("slow".into()).is_mirror_recoverable());
        assert!(
            Error::ChecksumMismatch {
                expected: "a".into(),
                actual: "b".into()
            }
            .is_mirror_recoverable()
        );
        assert!(Error::SizeLimitExceeded { limit: 1 }.is_mirror_recoverable());
        assert!(Error::SizeMismatch { expected: 2, actual: 1 }.is_mirror_recoverable());
        assert!(Error::SizeMismatch { expected: 2, actual: 1 }.is_integrity());
        assert!(!Error::DownloadError("refused".into()).is_integrity());

        assert!(!Error::SecurityError("bad cert".into()).is_mirror_recoverable());
        assert!(!Error::ParseError("eof".into()).is_mirror_recoverable());
        assert!(!Error::Cancelled.is_mirror_recoverable());
    }

    #[test]
    fn test_security_classes() {
        assert!(Error::SecurityError("x".into()).is_security());
        assert!(Error::StaleIndex { index: 1, stored: 2 }.is_security());
        assert!(!Error::NotFoundError("x".into()).is_security());
    }

    #[test]
    fn test_io_conversion() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::Other, "disk full").into();
        assert!(matches!(err, Error::IoError(msg) if msg.contains("disk full")));
    }
}

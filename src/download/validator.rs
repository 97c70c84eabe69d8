// src/download/validator.rs

//! Conditional-fetch validators
//!
//! Mirrors of the same repository rarely agree on `ETag` formatting, but
//! most servers derive it from modification time and length. We compute
//! that weak form locally (`{mtime:x}-{len:x}`, the nginx layout) so an
//! update can be skipped when the bytes provably did not change even though
//! the strong validator differs. This is an optimisation only; a miss just
//! means a full download.

use chrono::DateTime;
use reqwest::header::{CONTENT_LENGTH, ETAG, HeaderMap, HeaderName, LAST_MODIFIED};

/// Strip the weak marker and quotes from an entity tag
pub fn normalize_etag(etag: &str) -> String {
    let trimmed = etag.trim();
    let trimmed = trimmed
        .strip_prefix("W/")
        .or_else(|| trimmed.strip_prefix("w/"))
        .unwrap_or(trimmed);
    trimmed.trim_matches('"').to_string()
}

/// Synthetic validator from `Last-Modified` and `Content-Length`
pub fn weak_validator(last_modified: &str, content_length: u64) -> Option<String> {
    let modified = DateTime::parse_from_rfc2822(last_modified.trim()).ok()?;
    let secs = u64::try_from(modified.timestamp()).ok()?;
    Some(format!("{secs:x}-{content_length:x}"))
}

/// Validators announced by a response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseValidators {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub content_length: Option<u64>,
}

impl ResponseValidators {
    /// Read validators from response headers
    ///
    /// `Content-Length` is taken from the header itself; the body length
    /// `reqwest` reports for a HEAD response is zero.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let text = |name: HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Self {
            etag: text(ETAG).map(|e| normalize_etag(&e)),
            last_modified: text(LAST_MODIFIED),
            content_length: text(CONTENT_LENGTH).and_then(|l| l.trim().parse().ok()),
        }
    }

    /// Locally derived validator, when both inputs are present
    pub fn weak(&self) -> Option<String> {
        weak_validator(self.last_modified.as_deref()?, self.content_length?)
    }

    /// Validator to remember for the next conditional fetch
    ///
    /// The derived form wins because it is stable across mirrors.
    pub fn preferred(&self) -> Option<String> {
        self.weak().or_else(|| self.etag.clone())
    }

    /// Whether a remembered validator still describes this content
    pub fn matches(&self, stored: &str) -> bool {
        let stored = normalize_etag(stored);
        if stored.is_empty() {
            return false;
        }
        self.etag.as_deref() == Some(stored.as_str()) || self.weak().as_deref() == Some(stored.as_str())
    }
}

// src/hash.rs

//! SHA-256 hashing for index and artifact integrity
//!
//! - [`sha256`] / [`hashes_match`] for in-memory data
//! - [`Digester`]: rolling hash plus byte counter with a hard size limit,
//!   fed chunk by chunk from the network
//! - [`DigestReader`]: the same pass-through wrapped around any [`Read`]
//! - [`fingerprint`]: certificate fingerprints

use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::io::{self, Read};

/// Compute the lowercase hex SHA-256 of a byte slice
#[inline]
pub fn sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Compare two hex digests without regard to case
#[inline]
pub fn hashes_match(expected: &str, actual: &str) -> bool {
    expected.trim().eq_ignore_ascii_case(actual.trim())
}

/// Fingerprint of a signing certificate: hex SHA-256 of its raw bytes
pub fn fingerprint(certificate: &[u8]) -> String {
    sha256(certificate)
}

/// Canonical form of a user-supplied fingerprint
///
/// Fingerprints are often pasted with colons or spaces between byte pairs.
pub fn normalize_fingerprint(fingerprint: &str) -> String {
    fingerprint
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Rolling SHA-256 with a byte counter and an upper bound
///
/// `update` fails the moment the running count passes the limit, before the
/// offending bytes are hashed or written anywhere.
pub struct Digester {
    hasher: Sha256,
    count: u64,
    limit: u64,
}

impl Digester {
    /// Create a digester that rejects more than `limit` bytes
    pub fn new(limit: u64) -> Self {
        Self {
            hasher: Sha256::new(),
            count: 0,
            limit,
        }
    }

    /// Feed a chunk
    pub fn update(&mut self, chunk: &[u8]) -> Result<()> {
        let next = self.count.saturating_add(chunk.len() as u64);
        if next > self.limit {
            return Err(Error::SizeLimitExceeded { limit: self.limit });
        }
        self.hasher.update(chunk);
        self.count = next;
        Ok(())
    }

    /// Bytes accepted so far
    #[inline]
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Finish and return (hex digest, byte count)
    pub fn finalize(self) -> (String, u64) {
        (hex::encode(self.hasher.finalize()), self.count)
    }

    /// Finish and return the raw 32-byte digest
    pub fn finalize_raw(self) -> [u8; 32] {
        self.hasher.finalize().into()
    }
}

/// A [`Read`] pass-through that hashes and counts everything read
pub struct DigestReader<R> {
    inner: R,
    digester: Digester,
}

impl<R: Read> DigestReader<R> {
    /// Wrap a reader with a size limit
    pub fn new(inner: R, limit: u64) -> Self {
        Self {
            inner,
            digester: Digester::new(limit),
        }
    }

    /// Bytes read so far
    pub fn count(&self) -> u64 {
        self.digester.count()
    }

    /// Read and discard whatever the consumer left unread
    pub fn drain(&mut self) -> io::Result<u64> {
        io::copy(self, &mut io::sink())
    }

    /// Consume the reader, returning the digester
    pub fn into_digester(self) -> Digester {
        self.digester
    }
}

impl<R: Read> Read for DigestReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 {
            return Ok(0);
        }
        self.digester
            .update(&buf[..n])
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        Ok(n)
    }
}

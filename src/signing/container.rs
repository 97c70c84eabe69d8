// src/signing/container.rs
//! Signed container reading and writing
//!
//! Layout of a container (`index-v1.jar`, `entry.jar`):
//!
//! | Entry | Content |
//! |-------|---------|
//! | payload (`index-v1.json`, `entry.json`) | index bytes |
//! | `META-INF/SIGNER.CERT` | 32-byte Ed25519 public key |
//! | `META-INF/SIGNATURE.ED25519` | signature over SHA-256(payload) |
//!
//! Verification streams the payload straight into the caller's consumer
//! while hashing it. The certificate is handed back only once the payload
//! has been read to the end and the signature checked.

use super::{Certificate, SigningKeyPair};
use crate::error::{Error, Result};
use crate::hash::DigestReader;
use std::fs::File;
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;
use tracing::debug;
use zip::ZipArchive;
use zip::write::SimpleFileOptions;

pub const CERTIFICATE_ENTRY: &str = "META-INF/SIGNER.CERT";
pub const SIGNATURE_ENTRY: &str = "META-INF/SIGNATURE.ED25519";

// Upper bound on the small metadata entries
const MAX_META_ENTRY: u64 = 4096;

/// Verify a signed container while streaming its payload into `consume`
///
/// `limit` bounds the decompressed payload. Whatever `consume` leaves unread
/// is drained so the digest always covers the whole payload. A bad signature
/// takes precedence over any error the consumer raised.
pub fn verify_signed_container<R, T, F>(
    source: R,
    payload_name: &str,
    limit: u64,
    consume: F,
) -> Result<(T, Certificate)>
where
    R: Read + Seek,
    F: FnOnce(&mut dyn Read) -> Result<T>,
{
    let mut archive = ZipArchive::new(source)?;

    let certificate = Certificate::parse(read_meta_entry(&mut archive, CERTIFICATE_ENTRY)?)?;
    let signature = read_meta_entry(&mut archive, SIGNATURE_ENTRY)?;

    let payload = match archive.by_name(payload_name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => {
            return Err(Error::ParseError(format!(
                "Signed container has no {payload_name} entry"
            )));
        }
        Err(e) => return Err(e.into()),
    };

    let mut reader = DigestReader::new(payload, limit);
    let consumed = consume(&mut reader);
    let drained = reader.drain();
    let count = reader.count();
    let digest = reader.into_digester().finalize_raw();

    if let Err(e) = drained {
        // Payload unreadable (oversized or corrupt compression); never trust it
        consumed?;
        return Err(Error::SecurityError(format!(
            "Could not read complete payload {payload_name}: {e}"
        )));
    }

    certificate.verify_digest(&digest, &signature)?;
    debug!(
        "Verified {} ({} bytes) signed by {}",
        payload_name,
        count,
        certificate.fingerprint()
    );

    Ok((consumed?, certificate))
}

fn read_meta_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<Vec<u8>> {
    let entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => {
            return Err(Error::SecurityError(format!(
                "Container is not signed: missing {name}"
            )));
        }
        Err(e) => return Err(e.into()),
    };
    let mut data = Vec::new();
    entry.take(MAX_META_ENTRY).read_to_end(&mut data)?;
    Ok(data)
}

/// Build a signed container in memory
pub fn signed_container_bytes(
    payload_name: &str,
    payload: &[u8],
    key: &SigningKeyPair,
) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    write_container(&mut cursor, payload_name, payload, key)?;
    Ok(cursor.into_inner())
}

/// Write a signed container to `path`
pub fn write_signed_container(
    path: &Path,
    payload_name: &str,
    payload: &[u8],
    key: &SigningKeyPair,
) -> Result<()> {
    let mut file = File::create(path)
        .map_err(|e| Error::IoError(format!("Failed to create {}: {e}", path.display())))?;
    write_container(&mut file, payload_name, payload, key)?;
    file.sync_all()?;
    Ok(())
}

fn write_container<W: Write + Seek>(
    sink: W,
    payload_name: &str,
    payload: &[u8],
    key: &SigningKeyPair,
) -> Result<()> {
    let digest: [u8; 32] = {
        use sha2::{Digest, Sha256};
        Sha256::digest(payload).into()
    };
    let signature = key.sign_digest(&digest);

    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    let mut zip = zip::ZipWriter::new(sink);
    zip.start_file(payload_name, options)?;
    zip.write_all(payload)?;
    zip.start_file(CERTIFICATE_ENTRY, options)?;
    zip.write_all(key.certificate().as_bytes())?;
    zip.start_file(SIGNATURE_ENTRY, options)?;
    zip.write_all(&signature)?;
    zip.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &[u8] = br#"{"timestamp": 1, "index": {"name": "/i", "sha256": "a", "size": 1}}"#;

    fn read_all(reader: &mut dyn Read) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        reader.read_to_end(&mut out)?;
        Ok(out)
    }

    #[test]
    fn test_roundtrip_yields_certificate_after_payload() {
        let key = SigningKeyPair::from_seed([9u8; 32]);
        let jar = signed_container_bytes("entry.json", PAYLOAD, &key).unwrap();

        let (payload, cert) =
            verify_signed_container(Cursor::new(jar), "entry.json", 1 << 20, read_all).unwrap();
        assert_eq!(payload, PAYLOAD);
        assert_eq!(cert, key.certificate());
    }

    #[test]
    fn test_partial_consumer_still_covers_whole_payload() {
        let key = SigningKeyPair::generate();
        let jar = signed_container_bytes("entry.json", PAYLOAD, &key).unwrap();

        let (first, _) = verify_signed_container(Cursor::new(jar), "entry.json", 1 << 20, |r| {
            let mut byte = [0u8; 1];
            r.read_exact(&mut byte)?;
            Ok(byte[0])
        })
        .unwrap();
        assert_eq!(first, b'{');
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let key = SigningKeyPair::generate();
        let other = signed_container_bytes("entry.json", b"{\"other\": true}", &key).unwrap();
        let genuine = signed_container_bytes("entry.json", PAYLOAD, &key).unwrap();

        // Swap the signature of one container into another
        let mut archive = ZipArchive::new(Cursor::new(other)).unwrap();
        let mut sig = Vec::new();
        archive.by_name(SIGNATURE_ENTRY).unwrap().read_to_end(&mut sig).unwrap();

        let mut rebuilt = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        let mut source = ZipArchive::new(Cursor::new(genuine)).unwrap();
        for name in ["entry.json", CERTIFICATE_ENTRY] {
            let mut data = Vec::new();
            source.by_name(name).unwrap().read_to_end(&mut data).unwrap();
            rebuilt.start_file(name, options).unwrap();
            rebuilt.write_all(&data).unwrap();
        }
        rebuilt.start_file(SIGNATURE_ENTRY, options).unwrap();
        rebuilt.write_all(&sig).unwrap();
        let tampered = rebuilt.finish().unwrap().into_inner();

        let err = verify_signed_container(Cursor::new(tampered), "entry.json", 1 << 20, read_all)
            .unwrap_err();
        assert!(matches!(err, Error::SecurityError(_)));
    }

    #[test]
    fn test_unsigned_container_rejected() {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("entry.json", SimpleFileOptions::default()).unwrap();
        zip.write_all(PAYLOAD).unwrap();
        let jar = zip.finish().unwrap().into_inner();

        let err = verify_signed_container(Cursor::new(jar), "entry.json", 1 << 20, read_all)
            .unwrap_err();
        assert!(matches!(err, Error::SecurityError(_)));
    }

    #[test]
    fn test_missing_payload_entry() {
        let key = SigningKeyPair::generate();
        let jar = signed_container_bytes("entry.json", PAYLOAD, &key).unwrap();
        let err = verify_signed_container(Cursor::new(jar), "index-v1.json", 1 << 20, read_all)
            .unwrap_err();
        assert!(matches!(err, Error::ParseError(_)));
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let key = SigningKeyPair::generate();
        let jar = signed_container_bytes("entry.json", PAYLOAD, &key).unwrap();
        let result = verify_signed_container(Cursor::new(jar), "entry.json", 8, read_all);
        assert!(result.is_err());
    }

    #[test]
    fn test_not_a_zip() {
        let err = verify_signed_container(Cursor::new(b"plain".to_vec()), "entry.json", 64, read_all)
            .unwrap_err();
        assert!(matches!(err, Error::ParseError(_)));
    }

    #[test]
    fn test_write_to_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("entry.jar");
        let key = SigningKeyPair::generate();
        write_signed_container(&path, "entry.json", PAYLOAD, &key).unwrap();
        let file = File::open(&path).unwrap();
        let (_, cert) = verify_signed_container(file, "entry.json", 1 << 20, read_all).unwrap();
        assert_eq!(cert, key.certificate());
    }
}

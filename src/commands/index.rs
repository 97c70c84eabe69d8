// src/commands/index.rs
//! Index publishing commands

use anyhow::Result;
use reposync::config::NetworkSection;
use reposync::index::{INDEX_V1_JSON, IndexV1, convert_v1};
use reposync::signing::{
    ExpectedSigner, load_certificate, verify_signed_container, write_signed_container,
};
use reposync::{Certificate, SigningKeyPair};
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;
use tracing::info;

fn payload_limit() -> u64 {
    NetworkSection::default().max_download_size
}

fn open(path: &str) -> Result<BufReader<File>> {
    let file = File::open(path).map_err(|e| anyhow::anyhow!("Failed to open {}: {}", path, e))?;
    Ok(BufReader::new(file))
}

/// Payload entry name for a container, from its file name
///
/// `index-v1.jar` carries `index-v1.json`, `entry.jar` carries `entry.json`.
fn default_payload_name(container: &Path) -> Result<String> {
    let stem = container
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow::anyhow!("Cannot derive a payload name from {}", container.display()))?;
    Ok(format!("{}.json", stem))
}

/// Convert a legacy index into the unified format
///
/// A signed `.jar` is verified first; its signer is reported but not checked
/// against anything.
pub fn cmd_index_convert(input: &str, output: Option<&str>, locale: &str) -> Result<()> {
    info!("Converting legacy index {}", input);

    let index = if input.ends_with(".jar") {
        let (index, certificate) =
            verify_signed_container(open(input)?, INDEX_V1_JSON, payload_limit(), |payload| {
                IndexV1::from_reader(payload)
            })?;
        eprintln!("Signed by {}", certificate.fingerprint());
        index
    } else {
        IndexV1::from_reader(open(input)?)?
    };

    let converted = convert_v1(index, locale);
    let bytes = converted.to_canonical_json()?;

    match output {
        Some(path) => {
            std::fs::write(path, &bytes)
                .map_err(|e| anyhow::anyhow!("Failed to write {}: {}", path, e))?;
            println!(
                "Converted {} packages to {}",
                converted.packages.len(),
                path
            );
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes)?;
            stdout.write_all(b"\n")?;
        }
    }
    Ok(())
}

/// Generate a signing key pair
pub fn cmd_index_keygen(name: &str, output: &str, key_id: Option<&str>) -> Result<()> {
    let dir = Path::new(output);
    std::fs::create_dir_all(dir)
        .map_err(|e| anyhow::anyhow!("Failed to create {}: {}", dir.display(), e))?;

    let private_path = dir.join(format!("{}.private", name));
    let public_path = dir.join(format!("{}.public", name));
    if private_path.exists() || public_path.exists() {
        anyhow::bail!("Key files for '{}' already exist in {}", name, dir.display());
    }

    let mut keypair = SigningKeyPair::generate();
    if let Some(id) = key_id {
        keypair = keypair.with_key_id(id);
    }
    keypair.save_to_files(&private_path, &public_path)?;

    println!("Generated signing key pair:");
    println!("  Private key: {}", private_path.display());
    println!("  Public key: {}", public_path.display());
    println!("  Fingerprint: {}", keypair.certificate().fingerprint());
    println!();
    println!("Keep the private key secret. Share the fingerprint with repository users.");
    Ok(())
}

/// Sign an index document into a container
pub fn cmd_index_sign(
    input: &str,
    key: &str,
    output: Option<&str>,
    payload_name: Option<&str>,
) -> Result<()> {
    let input_path = Path::new(input);
    let payload_name = match payload_name {
        Some(name) => name.to_string(),
        None => input_path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("Cannot derive a payload name from {}", input))?,
    };
    let output_path = match output {
        Some(path) => Path::new(path).to_path_buf(),
        None => input_path.with_extension("jar"),
    };

    let keypair = SigningKeyPair::load_from_file(Path::new(key))?;
    let payload =
        std::fs::read(input_path).map_err(|e| anyhow::anyhow!("Failed to read {}: {}", input, e))?;

    info!("Signing {} as {}", input, payload_name);
    write_signed_container(&output_path, &payload_name, &payload, &keypair)?;

    println!("Signed {} -> {}", input, output_path.display());
    println!("  Payload: {} ({} bytes)", payload_name, payload.len());
    println!("  Signer: {}", keypair.certificate().fingerprint());
    Ok(())
}

/// Verify a signed container
pub fn cmd_index_verify(
    input: &str,
    payload_name: Option<&str>,
    fingerprint: Option<&str>,
    certificate_path: Option<&str>,
) -> Result<()> {
    let payload_name = match payload_name {
        Some(name) => name.to_string(),
        None => default_payload_name(Path::new(input))?,
    };

    let (bytes, certificate): (u64, Certificate) =
        verify_signed_container(open(input)?, &payload_name, payload_limit(), |payload| {
            let mut sink = std::io::sink();
            Ok(std::io::copy(payload, &mut sink)?)
        })?;

    if let Some(expected) = fingerprint {
        ExpectedSigner::Fingerprint(expected).check(&certificate)?;
    }
    if let Some(path) = certificate_path {
        let pinned = load_certificate(Path::new(path))?;
        ExpectedSigner::Pinned(&pinned).check(&certificate)?;
    }

    println!("Signature OK: {}", input);
    println!("  Payload: {} ({} bytes)", payload_name, bytes);
    println!("  Signer: {}", certificate.fingerprint());
    Ok(())
}

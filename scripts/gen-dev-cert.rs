//! Dev certificate generator
//!
//! Run from scripts/ with `cargo run [-- <output dir>]`. Writes a
//! self-signed localhost certificate to `../certs/` (or the given
//! directory), where the arena server looks for one when TLS_CERT_PATH
//! and TLS_KEY_PATH are unset.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use ring::digest::{digest, SHA256};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, SystemTime};

const DEFAULT_DIR: &str = "../certs";

// Browsers only accept serverCertificateHashes for certs valid <= 14 days
const VALIDITY: Duration = Duration::from_secs(14 * 24 * 60 * 60);

type BoxResult<T> = Result<T, Box<dyn std::error::Error>>;

fn main() -> BoxResult<()> {
    let dir = env::args().nth(1).map(PathBuf::from).unwrap_or_else(|| PathBuf::from(DEFAULT_DIR));
    let cert_file = dir.join("cert.pem");
    let key_file = dir.join("key.pem");

    if cert_file.exists() && key_file.exists() {
        println!("Keeping existing certificate in {}", dir.display());
        println!("Delete it to issue a fresh one (required every 14 days).\n");
    } else {
        issue(&dir, &cert_file, &key_file)?;
    }

    report(&cert_file)
}

/// Create a localhost certificate and key pair
fn issue(dir: &Path, cert_file: &Path, key_file: &Path) -> BoxResult<()> {
    fs::create_dir_all(dir)?;

    let mut params = CertificateParams::new(vec!["localhost".to_string(), "127.0.0.1".to_string()])?;
    let mut name = DistinguishedName::new();
    name.push(DnType::CommonName, "Serpent Arena Dev");
    name.push(DnType::OrganizationName, "Development");
    params.distinguished_name = name;

    let now = SystemTime::now();
    params.not_before = now.into();
    params.not_after = (now + VALIDITY).into();

    let key_pair = KeyPair::generate()?;
    let cert = params.self_signed(&key_pair)?;

    fs::write(cert_file, cert.pem())?;
    fs::write(key_file, key_pair.serialize_pem())?;
    println!("Wrote {} and {}\n", cert_file.display(), key_file.display());
    Ok(())
}

/// Print the hashes clients need to trust the certificate
fn report(cert_file: &Path) -> BoxResult<()> {
    let pem = pem::parse(fs::read_to_string(cert_file)?)?;
    let cert_hash = STANDARD.encode(digest(&SHA256, pem.contents()).as_ref());

    println!("serverCertificateHashes (base64 SHA-256 of the DER certificate):");
    println!("  {}\n", cert_hash);

    match spki_hash(cert_file) {
        Some(spki) => println!("Chrome flag:\n  --ignore-certificate-errors-spki-list={}", spki),
        None => println!("openssl not available; SPKI hash skipped"),
    }
    Ok(())
}

/// SHA-256 of the SubjectPublicKeyInfo, via the openssl CLI
fn spki_hash(cert_file: &Path) -> Option<String> {
    let pipeline = format!(
        "openssl x509 -in {} -pubkey -noout | openssl pkey -pubin -outform der | openssl dgst -sha256 -binary | base64",
        cert_file.display()
    );
    let output = Command::new("sh").arg("-c").arg(pipeline).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let hash = String::from_utf8(output.stdout).ok()?.trim().to_string();
    (!hash.is_empty()).then_some(hash)
}

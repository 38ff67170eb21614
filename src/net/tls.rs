use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use ring::digest::{digest, SHA256};
use std::path::{Path, PathBuf};
use tracing::info;
use wtransport::Identity;

use crate::config::ServerConfig;

// Dev certificate directory (generated via `cargo run --bin gen-dev-cert` in scripts/)
const DEV_CERT_DIR: &str = "certs";
const DEV_CERT_FILE: &str = "cert.pem";
const DEV_KEY_FILE: &str = "key.pem";

/// TLS configuration for WebTransport server
pub struct TlsConfig {
    /// The wtransport Identity containing certificate and key
    pub identity: Identity,
    /// Base64-encoded SHA-256 hash of the certificate (for browser flag)
    pub cert_hash: String,
}

impl TlsConfig {
    /// Load TLS configuration
    ///
    /// Production: TLS_CERT_PATH and TLS_KEY_PATH from the config
    /// Development: certs/cert.pem and certs/key.pem
    pub async fn load(config: &ServerConfig) -> Result<Self> {
        let (cert_path, key_path) = resolve_paths(config, Path::new(DEV_CERT_DIR))?;
        info!("Loading TLS certificate from {}", cert_path.display());
        Self::load_from_paths(&cert_path, &key_path).await
    }

    /// Load certificate from PEM file paths
    async fn load_from_paths(cert_path: &Path, key_path: &Path) -> Result<Self> {
        let identity = Identity::load_pemfiles(cert_path, key_path)
            .await
            .context("Failed to load certificate from PEM files")?;

        let cert_hash = Self::compute_cert_hash(&identity);
        Self::log_cert_info(&cert_hash);

        Ok(Self { identity, cert_hash })
    }

    fn compute_cert_hash(identity: &Identity) -> String {
        identity
            .certificate_chain()
            .as_slice()
            .first()
            .map(|cert| cert_hash_of(cert.der()))
            .unwrap_or_default()
    }

    fn log_cert_info(cert_hash: &str) {
        info!("Certificate hash: {}", cert_hash);
        info!("Chrome flag: --ignore-certificate-errors-spki-list={}", cert_hash);
    }

    /// Get the certificate hash for client configuration
    pub fn get_cert_hash(&self) -> &str {
        &self.cert_hash
    }
}

/// Base64 SHA-256 of a DER certificate
fn cert_hash_of(der: &[u8]) -> String {
    STANDARD.encode(digest(&SHA256, der).as_ref())
}

/// Configured paths win; otherwise fall back to the dev directory
fn resolve_paths(config: &ServerConfig, dev_dir: &Path) -> Result<(PathBuf, PathBuf)> {
    if let (Some(cert), Some(key)) = (&config.tls_cert_path, &config.tls_key_path) {
        return Ok((PathBuf::from(cert), PathBuf::from(key)));
    }

    let cert = dev_dir.join(DEV_CERT_FILE);
    let key = dev_dir.join(DEV_KEY_FILE);
    if cert.exists() && key.exists() {
        Ok((cert, key))
    } else {
        Err(anyhow!(
            "TLS certificate not found.\n\n\
            For development: run the gen-dev-cert helper in scripts/ to create certs/.\n\
            For production: set TLS_CERT_PATH and TLS_KEY_PATH environment variables."
        ))
    }
}

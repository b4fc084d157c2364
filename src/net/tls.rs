use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use ring::digest::{digest, SHA256};
use std::path::Path;
use tracing::info;
use wtransport::Identity;

use crate::config::ServerConfig;

// Dev certificate paths (generated by scripts/gen-dev-cert.rs)
const DEV_CERT_FILE: &str = "certs/cert.pem";
const DEV_KEY_FILE: &str = "certs/key.pem";

/// TLS identity for the WebTransport endpoint
pub struct TlsConfig {
    pub identity: Identity,
    /// Base64-encoded SHA-256 hash of the leaf certificate (serverCertificateHashes)
    pub cert_hash: String,
}

/// Pick the certificate/key pair: configured paths first, then `certs/`
fn resolve_paths(config: &ServerConfig) -> Result<(String, String)> {
    match (&config.tls_cert_path, &config.tls_key_path) {
        (Some(cert), Some(key)) => Ok((cert.clone(), key.clone())),
        (Some(_), None) | (None, Some(_)) => Err(anyhow!(
            "TLS_CERT_PATH and TLS_KEY_PATH must be set together"
        )),
        (None, None) if Path::new(DEV_CERT_FILE).exists() && Path::new(DEV_KEY_FILE).exists() => {
            Ok((DEV_CERT_FILE.to_string(), DEV_KEY_FILE.to_string()))
        }
        (None, None) => Err(anyhow!(
            "TLS certificate not found.\n\n\
            For development: run scripts/gen-dev-cert.rs to create certs/.\n\
            For production: set TLS_CERT_PATH and TLS_KEY_PATH."
        )),
    }
}

impl TlsConfig {
    pub async fn load(config: &ServerConfig) -> Result<Self> {
        let (cert_path, key_path) = resolve_paths(config)?;
        info!("Loading TLS certificate from {}", cert_path);

        let identity = Identity::load_pemfiles(&cert_path, &key_path)
            .await
            .with_context(|| format!("Failed to load certificate from {} / {}", cert_path, key_path))?;

        let cert_hash = compute_cert_hash(&identity);
        Ok(Self { identity, cert_hash })
    }
}

fn compute_cert_hash(identity: &Identity) -> String {
    identity
        .certificate_chain()
        .as_slice()
        .first()
        .map(|cert| STANDARD.encode(digest(&SHA256, cert.der()).as_ref()))
        .unwrap_or_default()
}

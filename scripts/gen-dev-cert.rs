//! Dev certificate generator - run with `cargo run --manifest-path scripts/Cargo.toml`
//!
//! Writes a self-signed localhost certificate to certs/ for the arena server
//! and prints the hashes browsers need to trust it.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use ring::digest::{digest, SHA256};
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

const CERT_DIR: &str = "../certs";
const CERT_FILE: &str = "../certs/cert.pem";
const KEY_FILE: &str = "../certs/key.pem";

// serverCertificateHashes rejects certificates valid for longer than 14 days
const VALIDITY: Duration = Duration::from_secs(14 * 24 * 60 * 60);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if Path::new(CERT_FILE).exists() && Path::new(KEY_FILE).exists() {
        println!("Certificates already exist at {}/, delete them to regenerate.", CERT_DIR);
        return Ok(());
    }

    fs::create_dir_all(CERT_DIR)?;

    let mut params = CertificateParams::new(vec!["localhost".to_string(), "127.0.0.1".to_string()])?;
    params.distinguished_name = DistinguishedName::new();
    params
        .distinguished_name
        .push(DnType::CommonName, "Blob Arena Dev");

    let now = SystemTime::now();
    params.not_before = now.into();
    params.not_after = (now + VALIDITY).into();

    let key_pair = KeyPair::generate()?;
    let cert = params.self_signed(&key_pair)?;

    fs::write(CERT_FILE, cert.pem())?;
    fs::write(KEY_FILE, key_pair.serialize_pem())?;
    println!("Wrote {} and {}\n", CERT_FILE, KEY_FILE);

    let cert_hash = STANDARD.encode(digest(&SHA256, cert.der().as_ref()).as_ref());
    let spki_hash = STANDARD.encode(digest(&SHA256, &key_pair.public_key_der()).as_ref());

    println!("WebTransport serverCertificateHashes value:");
    println!("  {}\n", cert_hash);
    println!("Chrome flag:");
    println!("  --ignore-certificate-errors-spki-list={}", spki_hash);

    Ok(())
}

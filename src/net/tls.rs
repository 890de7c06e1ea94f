//! TLS configuration and certificate loading.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_rustls::rustls::crypto::aws_lc_rs;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;

use crate::config::ServerConfig as SmartwebConfig;

/// Certificate file looked up in the storage root when none is configured.
pub const DEFAULT_CERT_FILE: &str = "cert.pem";
/// Private key file looked up in the storage root when none is configured.
pub const DEFAULT_KEY_FILE: &str = "key.pem";

/// Error type for TLS setup.
#[derive(Debug)]
pub enum TlsError {
    /// Failed to read a PEM file.
    Io(PathBuf, std::io::Error),
    /// The key file holds no private key.
    NoPrivateKey(PathBuf),
    /// The certificate file holds no certificate.
    NoCertificate(PathBuf),
    /// rustls rejected the certificate/key pair.
    Rustls(tokio_rustls::rustls::Error),
}

impl std::fmt::Display for TlsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TlsError::Io(path, e) => write!(f, "Failed to read {}: {}", path.display(), e),
            TlsError::NoPrivateKey(path) => write!(f, "No private key in {}", path.display()),
            TlsError::NoCertificate(path) => write!(f, "No certificate in {}", path.display()),
            TlsError::Rustls(e) => write!(f, "Invalid TLS configuration: {}", e),
        }
    }
}

impl std::error::Error for TlsError {}

/// Load a TLS acceptor from PEM certificate chain and key files.
pub fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor, TlsError> {
    let certs = load_certs(cert_path)?;
    let key = load_key(key_path)?;

    let mut config = ServerConfig::builder_with_provider(Arc::new(aws_lc_rs::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(TlsError::Rustls)?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(TlsError::Rustls)?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    tracing::info!(
        cert = %cert_path.display(),
        key = %key_path.display(),
        "TLS certificate loaded"
    );
    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Pick the certificate pair: the configured one, else `cert.pem`/`key.pem`
/// in the storage root, else none (plaintext only).
pub fn resolve_acceptor(config: &SmartwebConfig) -> Result<Option<TlsAcceptor>, TlsError> {
    if let Some(tls) = &config.listener.tls {
        return load_tls_config(Path::new(&tls.cert_path), Path::new(&tls.key_path)).map(Some);
    }

    let root = Path::new(&config.storage.root);
    let cert = root.join(DEFAULT_CERT_FILE);
    let key = root.join(DEFAULT_KEY_FILE);
    if cert.is_file() && key.is_file() {
        return load_tls_config(&cert, &key).map(Some);
    }

    tracing::info!("No TLS certificate found, serving plaintext only");
    Ok(None)
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let file = File::open(path).map_err(|e| TlsError::Io(path.to_path_buf(), e))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::Io(path.to_path_buf(), e))?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificate(path.to_path_buf()));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let file = File::open(path).map_err(|e| TlsError::Io(path.to_path_buf(), e))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| TlsError::Io(path.to_path_buf(), e))?
        .ok_or_else(|| TlsError::NoPrivateKey(path.to_path_buf()))
}

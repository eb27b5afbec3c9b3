//! TLS material loading.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls_pemfile::{certs, private_key};
use thiserror::Error;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::rustls::crypto::ring;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tracing::{debug, info};

use crate::config::TlsConfig;

#[derive(Debug, Error)]
pub enum TlsConfigError {
    #[error("failed to load certificate from '{path}': {message}")]
    Certificate { path: String, message: String },

    #[error("failed to load private key from '{path}': {message}")]
    PrivateKey { path: String, message: String },

    #[error("invalid TLS configuration: {0}")]
    Rustls(#[from] tokio_rustls::rustls::Error),
}

/// Builds an acceptor from a PEM certificate chain and private key.
pub fn load_acceptor(config: &TlsConfig) -> Result<TlsAcceptor, TlsConfigError> {
    info!(cert_path = %config.cert_path.display(), "Loading TLS certificate");

    let chain = load_certificates(&config.cert_path)?;
    let key = load_private_key(&config.key_path)?;

    debug!(cert_count = chain.len(), "Certificate chain loaded");

    let server_config = ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(chain, key)?;

    Ok(TlsAcceptor::from(Arc::new(server_config)))
}

fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsConfigError> {
    let file = File::open(path).map_err(|e| TlsConfigError::Certificate {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    let mut reader = BufReader::new(file);

    let chain = certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsConfigError::Certificate {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

    if chain.is_empty() {
        return Err(TlsConfigError::Certificate {
            path: path.display().to_string(),
            message: "no certificates found in file".to_string(),
        });
    }

    Ok(chain)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsConfigError> {
    let file = File::open(path).map_err(|e| TlsConfigError::PrivateKey {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    let mut reader = BufReader::new(file);

    private_key(&mut reader)
        .map_err(|e| TlsConfigError::PrivateKey {
            path: path.display().to_string(),
            message: e.to_string(),
        })?
        .ok_or_else(|| TlsConfigError::PrivateKey {
            path: path.display().to_string(),
            message: "no private key found in file".to_string(),
        })
}

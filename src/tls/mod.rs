//! TLS/SSL support for gatehouse-proxy
//!
//! - **Frontend TLS**: terminating encrypted connections from SQL clients
//!   after the dialect's explicit "request TLS" exchange
//! - **Backend TLS**: connecting to database servers over encrypted
//!   connections
//!
//! Absence of TLS material disables termination, not the session: a client
//! requesting encryption is answered negatively and the handshake continues
//! in clear text.
//!
//! Uses rustls with the ring provider; TLS 1.2 minimum, TLS 1.3 preferred;
//! certificate verification enabled by default on the backend side.

mod acceptor;
mod config;
mod connector;
mod error;

pub use acceptor::TlsAcceptor;
pub use config::{TlsClientConfig, TlsServerConfig, TlsVerifyMode};
pub use connector::TlsConnector;
pub use error::TlsError;

// Shared utilities for loading certificates and keys
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Load certificates from a PEM file
///
/// Reads all certificates from a PEM-encoded file and returns them as
/// a vector of `CertificateDer`. This supports certificate chains.
pub(crate) fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let file = File::open(path).map_err(|e| TlsError::cert_load(path, e.to_string()))?;

    let mut reader = BufReader::new(file);

    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::cert_load(path, e.to_string()))?;

    Ok(certs)
}

/// Load a private key from a PEM file
///
/// Supports RSA, PKCS8, and EC keys.
pub(crate) fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let file = File::open(path).map_err(|e| TlsError::key_load(path, e.to_string()))?;

    let mut reader = BufReader::new(file);

    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| TlsError::key_load(path, e.to_string()))?
        .ok_or_else(|| TlsError::key_load(path, "no private key found in file"))
}

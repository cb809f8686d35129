//! TLS Acceptor for server-side TLS connections
//!
//! This module provides `TlsAcceptor` which upgrades an inbound TCP
//! connection to TLS after the client has requested encryption in the
//! dialect's startup exchange. The certificate/key material may come from
//! files (config-driven deployments) or from PEM strings handed to the
//! session by the owning workflow.

use std::io::Cursor;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream;

use crate::tls::{load_certificates, load_private_key, TlsError, TlsServerConfig};

/// TLS Acceptor for upgrading TCP connections to TLS
///
/// Wraps `tokio_rustls::TlsAcceptor` with configuration loading
/// and error handling.
#[derive(Clone)]
pub struct TlsAcceptor {
    inner: tokio_rustls::TlsAcceptor,
}

impl TlsAcceptor {
    /// Create a new TLS acceptor from configuration
    ///
    /// Loads the server certificate and private key from the paths
    /// specified in the configuration.
    pub fn from_config(config: &TlsServerConfig) -> Result<Self, TlsError> {
        config.validate().map_err(TlsError::config)?;

        let cert_path = config
            .cert_path
            .as_ref()
            .ok_or_else(|| TlsError::config("cert_path is required"))?;

        let key_path = config
            .key_path
            .as_ref()
            .ok_or_else(|| TlsError::config("key_path is required"))?;

        let certs = load_certificates(cert_path)?;
        if certs.is_empty() {
            return Err(TlsError::cert_load(
                cert_path,
                "no certificates found in file",
            ));
        }

        let key = load_private_key(key_path)?;

        Self::build(certs, key)
    }

    /// Create a new TLS acceptor from in-memory PEM strings
    ///
    /// Session TLS material is supplied by the owning workflow rather than
    /// read from disk; this constructor accepts the certificate and private
    /// key as PEM text.
    pub fn from_pem(cert_pem: &str, key_pem: &str) -> Result<Self, TlsError> {
        let mut cert_reader = Cursor::new(cert_pem.as_bytes());
        let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut cert_reader)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| TlsError::cert_load("<inline pem>", e.to_string()))?;
        if certs.is_empty() {
            return Err(TlsError::cert_load("<inline pem>", "no certificates found"));
        }

        let mut key_reader = Cursor::new(key_pem.as_bytes());
        let key = rustls_pemfile::private_key(&mut key_reader)
            .map_err(|e| TlsError::key_load("<inline pem>", e.to_string()))?
            .ok_or_else(|| TlsError::key_load("<inline pem>", "no private key found"))?;

        Self::build(certs, key)
    }

    fn build(
        certs: Vec<CertificateDer<'static>>,
        key: PrivateKeyDer<'static>,
    ) -> Result<Self, TlsError> {
        let provider = rustls::crypto::ring::default_provider();

        let server_config = ServerConfig::builder_with_provider(Arc::new(provider))
            .with_safe_default_protocol_versions()
            .map_err(|e| TlsError::config(format!("Failed to set protocol versions: {}", e)))?
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| TlsError::config(format!("Failed to build TLS config: {}", e)))?;

        Ok(Self {
            inner: tokio_rustls::TlsAcceptor::from(Arc::new(server_config)),
        })
    }

    /// Upgrade a TCP stream to TLS
    ///
    /// Performs the TLS handshake with the client.
    pub async fn accept(&self, stream: TcpStream) -> Result<TlsStream<TcpStream>, TlsError> {
        self.inner
            .accept(stream)
            .await
            .map_err(|e| TlsError::handshake(e.to_string()))
    }

    /// Upgrade any async stream to TLS
    pub async fn accept_stream<S>(&self, stream: S) -> Result<TlsStream<S>, TlsError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.inner
            .accept(stream)
            .await
            .map_err(|e| TlsError::handshake(e.to_string()))
    }
}

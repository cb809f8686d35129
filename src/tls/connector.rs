//! TLS Connector for client-side TLS connections
//!
//! This module provides `TlsConnector` which establishes TLS-encrypted
//! connections to backend database servers.

use std::sync::Arc;

use rustls::pki_types::{CertificateDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;

use crate::tls::{load_certificates, TlsClientConfig, TlsError, TlsVerifyMode};

/// TLS Connector for establishing TLS connections to backend servers
///
/// Wraps `tokio_rustls::TlsConnector` with configuration loading
/// and error handling.
#[derive(Clone)]
pub struct TlsConnector {
    inner: tokio_rustls::TlsConnector,
}

impl TlsConnector {
    /// Create a new TLS connector from configuration
    pub fn from_config(config: &TlsClientConfig) -> Result<Self, TlsError> {
        if config.verify_mode == TlsVerifyMode::None {
            return Self::new_insecure();
        }

        let mut root_store = RootCertStore::empty();
        if let Some(ca_path) = &config.ca_path {
            let certs = load_certificates(ca_path)?;
            for cert in certs {
                root_store
                    .add(cert)
                    .map_err(|e| TlsError::cert_load(ca_path, e.to_string()))?;
            }
        } else {
            root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        }

        let provider = rustls::crypto::ring::default_provider();

        let client_config = ClientConfig::builder_with_provider(Arc::new(provider))
            .with_safe_default_protocol_versions()
            .map_err(|e| TlsError::config(format!("Failed to set protocol versions: {}", e)))?
            .with_root_certificates(root_store)
            .with_no_client_auth();

        Ok(Self {
            inner: tokio_rustls::TlsConnector::from(Arc::new(client_config)),
        })
    }

    /// Create a TLS connector that skips certificate verification
    ///
    /// Only for development and testing, or backends with self-signed
    /// certificates that cannot be provisioned as a CA bundle.
    pub fn new_insecure() -> Result<Self, TlsError> {
        let provider = rustls::crypto::ring::default_provider();

        let client_config = ClientConfig::builder_with_provider(Arc::new(provider))
            .with_safe_default_protocol_versions()
            .map_err(|e| TlsError::config(format!("Failed to set protocol versions: {}", e)))?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoCertificateVerification))
            .with_no_client_auth();

        Ok(Self {
            inner: tokio_rustls::TlsConnector::from(Arc::new(client_config)),
        })
    }

    /// Connect to a server over TLS
    ///
    /// The `server_name` is used for SNI and certificate verification.
    pub async fn connect(
        &self,
        stream: TcpStream,
        server_name: &str,
    ) -> Result<TlsStream<TcpStream>, TlsError> {
        let server_name = ServerName::try_from(server_name.to_string())
            .map_err(|_| TlsError::config(format!("Invalid server name: {}", server_name)))?;

        self.inner
            .connect(server_name, stream)
            .await
            .map_err(|e| TlsError::handshake(e.to_string()))
    }
}

/// Custom certificate verifier that accepts any certificate.
#[derive(Debug)]
struct NoCertificateVerification;

impl rustls::client::danger::ServerCertVerifier for NoCertificateVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_connector_insecure() {
        let result = TlsConnector::new_insecure();
        assert!(result.is_ok());
    }

    #[test]
    fn test_connector_nonexistent_ca_file() {
        let config = TlsClientConfig {
            enabled: true,
            verify_mode: TlsVerifyMode::Verify,
            ca_path: Some(PathBuf::from("/nonexistent/ca.crt")),
        };

        let result = TlsConnector::from_config(&config);
        assert!(result.is_err());
        let err = result.err().unwrap().to_string();
        assert!(err.contains("certificate") || err.contains("cert"));
    }

    #[test]
    fn test_connector_none_mode_is_insecure() {
        let config = TlsClientConfig {
            enabled: true,
            verify_mode: TlsVerifyMode::None,
            ca_path: None,
        };
        assert!(TlsConnector::from_config(&config).is_ok());
    }
}

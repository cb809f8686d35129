//! Error types for gatehouse-proxy

use thiserror::Error;

use crate::tls::TlsError;

/// Main error type for the proxy
#[derive(Error, Debug)]
pub enum ProxyError {
    /// I/O error (network, file)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed frame length or header; the connection is aborted without retry
    #[error("Protocol framing error: {0}")]
    Framing(String),

    /// A length field exceeded the frame size bound
    #[error("Frame of {size} bytes exceeds the {max} byte bound")]
    FrameTooLarge { size: u64, max: u64 },

    /// Protocol-level error beyond framing
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Client failed authentication against the proxy-issued credentials
    #[error("Frontend authentication failed: {0}")]
    FrontendAuth(String),

    /// The backend database was unreachable
    #[error("Backend connection failed: {0}")]
    BackendConnect(String),

    /// The backend rejected the stored datasource credentials
    #[error("Backend authentication failed: {0}")]
    BackendAuth(String),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),

    /// TLS/SSL error
    #[error("TLS error: {0}")]
    Tls(#[from] TlsError),

    /// The audit sink refused or failed to persist a statement
    #[error("Audit sink failure: {0}")]
    Audit(String),
}

/// Result type alias for ProxyError
pub type Result<T> = std::result::Result<T, ProxyError>;

impl From<serde_yaml::Error> for ProxyError {
    fn from(err: serde_yaml::Error) -> Self {
        ProxyError::Config(err.to_string())
    }
}

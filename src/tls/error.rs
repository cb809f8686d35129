//! TLS-specific error types

use std::path::PathBuf;
use thiserror::Error;

/// TLS-specific errors
///
/// These errors capture specific failure modes for TLS operations,
/// with detailed context for debugging.
#[derive(Error, Debug)]
pub enum TlsError {
    /// Failed to load certificate material
    #[error("Failed to load certificate from {path}: {reason}")]
    CertificateLoad {
        /// Path or origin of the certificate
        path: PathBuf,
        /// Reason for the failure
        reason: String,
    },

    /// Failed to load private key material
    #[error("Failed to load private key from {path}: {reason}")]
    PrivateKeyLoad {
        /// Path or origin of the key
        path: PathBuf,
        /// Reason for the failure
        reason: String,
    },

    /// TLS handshake failed
    #[error("TLS handshake failed: {0}")]
    Handshake(String),

    /// TLS configuration error
    #[error("TLS configuration error: {0}")]
    Config(String),

    /// I/O error during TLS operation
    #[error("TLS I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TlsError {
    /// Create a certificate load error
    pub fn cert_load(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        TlsError::CertificateLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a private key load error
    pub fn key_load(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        TlsError::PrivateKeyLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a handshake error
    pub fn handshake(reason: impl Into<String>) -> Self {
        TlsError::Handshake(reason.into())
    }

    /// Create a configuration error
    pub fn config(reason: impl Into<String>) -> Self {
        TlsError::Config(reason.into())
    }
}

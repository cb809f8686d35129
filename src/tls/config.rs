//! TLS configuration types
//!
//! - `TlsServerConfig` for terminating TLS on the frontend (client) side
//! - `TlsClientConfig` for connecting to backend database servers over TLS

use serde::Deserialize;
use std::path::PathBuf;

/// Server-side TLS configuration (proxy accepting client connections)
///
/// When enabled, a client's `SSLRequest` is answered affirmatively and the
/// socket upgraded before the handshake continues. When disabled, the
/// session still runs, in clear text.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TlsServerConfig {
    /// Enable TLS termination for client connections
    #[serde(default)]
    pub enabled: bool,

    /// Path to server certificate in PEM format
    pub cert_path: Option<PathBuf>,

    /// Path to server private key in PEM format (RSA, PKCS8, or EC)
    pub key_path: Option<PathBuf>,
}

impl TlsServerConfig {
    /// Validate the server TLS configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.enabled {
            if self.cert_path.is_none() {
                return Err("TLS enabled but cert_path not specified".to_string());
            }
            if self.key_path.is_none() {
                return Err("TLS enabled but key_path not specified".to_string());
            }
        }
        Ok(())
    }
}

/// Client-side TLS configuration (proxy connecting to the backend database)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TlsClientConfig {
    /// Enable TLS for the backend connection
    #[serde(default)]
    pub enabled: bool,

    /// Certificate verification mode
    #[serde(default)]
    pub verify_mode: TlsVerifyMode,

    /// Path to a CA certificate bundle in PEM format; system roots when unset
    pub ca_path: Option<PathBuf>,
}

/// Certificate verification mode for backend TLS
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TlsVerifyMode {
    /// Full verification: CA chain + hostname match (default)
    #[default]
    Verify,

    /// No verification (development only; any certificate is accepted)
    None,
}

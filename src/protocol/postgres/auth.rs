//! PostgreSQL backend authentication
//!
//! Implements the client side of the password methods a real server may
//! request during backend connection setup:
//! - MD5 password authentication
//! - SCRAM-SHA-256 (RFC 5802), including server-signature verification
//!
//! ASCII credentials are handled exactly; SASLprep normalization of
//! non-ASCII usernames/passwords is not performed.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use md5::{Digest as Md5Digest, Md5};
use pbkdf2::pbkdf2_hmac;
use rand::Rng;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::error::{ProxyError, Result};

type HmacSha256 = Hmac<Sha256>;

// ============================================================================
// MD5 authentication
// ============================================================================

/// Compute the MD5 password response for PostgreSQL authentication.
///
/// Format: `"md5" + md5(md5(password + user) + salt)`, lowercase hex.
pub fn compute_md5_password(user: &str, password: &str, salt: &[u8; 4]) -> String {
    let mut hasher = Md5::new();
    hasher.update(password.as_bytes());
    hasher.update(user.as_bytes());
    let inner = hex_encode(&hasher.finalize());

    let mut hasher = Md5::new();
    hasher.update(inner.as_bytes());
    hasher.update(salt);

    format!("md5{}", hex_encode(&hasher.finalize()))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

// ============================================================================
// SCRAM-SHA-256
// ============================================================================

/// SCRAM-SHA-256 client state machine.
///
/// Drives the three-message exchange: client-first, client-final after the
/// server's challenge, and verification of the server's final signature.
/// The last step is mandatory; skipping it would let an impostor backend
/// complete the handshake without knowing the password.
pub struct ScramClient {
    username: String,
    password: Zeroizing<String>,
    client_nonce: Zeroizing<String>,
    state: ScramState,
}

enum ScramState {
    Initial,
    SentClientFirst {
        client_first_bare: String,
    },
    SentClientFinal {
        auth_message: String,
        salted_password: Zeroizing<[u8; 32]>,
    },
    Complete,
    Failed,
}

impl ScramClient {
    /// Create a new SCRAM client for the given credentials.
    pub fn new(username: &str, password: &str) -> Self {
        Self::with_nonce(username, password, generate_nonce())
    }

    fn with_nonce(username: &str, password: &str, nonce: String) -> Self {
        Self {
            username: username.to_string(),
            password: Zeroizing::new(password.to_string()),
            client_nonce: Zeroizing::new(nonce),
            state: ScramState::Initial,
        }
    }

    /// Generate the client-first-message for the SASLInitialResponse.
    pub fn client_first_message(&mut self) -> Vec<u8> {
        // GS2 header "n,," = no channel binding
        let client_first_bare = format!("n={},r={}", self.username, &*self.client_nonce);
        let client_first = format!("n,,{}", client_first_bare);

        self.state = ScramState::SentClientFirst { client_first_bare };

        client_first.into_bytes()
    }

    /// Process the server-first-message and produce the client-final-message.
    pub fn process_server_first(&mut self, server_first: &[u8]) -> Result<Vec<u8>> {
        let client_first_bare = match &self.state {
            ScramState::SentClientFirst { client_first_bare } => client_first_bare.clone(),
            _ => {
                self.state = ScramState::Failed;
                return Err(ProxyError::BackendAuth(
                    "SCRAM: unexpected state for server-first".into(),
                ));
            }
        };

        let server_first_str = std::str::from_utf8(server_first)
            .map_err(|_| ProxyError::BackendAuth("SCRAM: invalid UTF-8 in server-first".into()))?;

        let (server_nonce, salt, iterations) = parse_server_first(server_first_str)?;

        if !server_nonce.starts_with(&**self.client_nonce) {
            self.state = ScramState::Failed;
            return Err(ProxyError::BackendAuth("SCRAM: server nonce mismatch".into()));
        }

        let mut salted_password = Zeroizing::new([0u8; 32]);
        pbkdf2_hmac::<Sha256>(
            self.password.as_bytes(),
            &salt,
            iterations,
            &mut *salted_password,
        );

        // c=biws is base64("n,,"), matching the GS2 header above
        let client_final_without_proof =
            format!("c={},r={}", BASE64.encode(b"n,,"), server_nonce);

        let auth_message = format!(
            "{},{},{}",
            client_first_bare, server_first_str, client_final_without_proof
        );

        let client_key = hmac_sha256(&*salted_password, b"Client Key");
        let stored_key = sha256(&client_key);
        let client_signature = hmac_sha256(&stored_key, auth_message.as_bytes());
        let client_proof: Vec<u8> = client_key
            .iter()
            .zip(client_signature.iter())
            .map(|(k, s)| k ^ s)
            .collect();

        let client_final = format!(
            "{},p={}",
            client_final_without_proof,
            BASE64.encode(&client_proof)
        );

        self.state = ScramState::SentClientFinal {
            auth_message,
            salted_password,
        };

        Ok(client_final.into_bytes())
    }

    /// Verify the server-final-message (mutual authentication).
    pub fn verify_server_final(&mut self, server_final: &[u8]) -> Result<()> {
        let (auth_message, salted_password) = match &self.state {
            ScramState::SentClientFinal {
                auth_message,
                salted_password,
            } => (auth_message.clone(), salted_password.clone()),
            _ => {
                self.state = ScramState::Failed;
                return Err(ProxyError::BackendAuth(
                    "SCRAM: unexpected state for server-final".into(),
                ));
            }
        };

        let server_final_str = std::str::from_utf8(server_final)
            .map_err(|_| ProxyError::BackendAuth("SCRAM: invalid UTF-8 in server-final".into()))?;

        if let Some(error_msg) = server_final_str.strip_prefix("e=") {
            self.state = ScramState::Failed;
            return Err(ProxyError::BackendAuth(format!(
                "SCRAM: server error: {}",
                error_msg
            )));
        }

        let signature_b64 = server_final_str.strip_prefix("v=").ok_or_else(|| {
            self.state = ScramState::Failed;
            ProxyError::BackendAuth("SCRAM: invalid server-final format".into())
        })?;

        let received_sig = BASE64.decode(signature_b64).map_err(|_| {
            ProxyError::BackendAuth("SCRAM: invalid base64 in server signature".into())
        })?;

        let server_key = hmac_sha256(&*salted_password, b"Server Key");
        let expected_sig = hmac_sha256(&server_key, auth_message.as_bytes());

        if received_sig.ct_eq(&expected_sig).into() {
            self.state = ScramState::Complete;
            Ok(())
        } else {
            self.state = ScramState::Failed;
            Err(ProxyError::BackendAuth(
                "SCRAM: server signature verification failed".into(),
            ))
        }
    }

    /// Whether the exchange completed with a verified server signature.
    pub fn is_complete(&self) -> bool {
        matches!(self.state, ScramState::Complete)
    }
}

fn generate_nonce() -> String {
    let nonce_bytes: [u8; 24] = rand::thread_rng().gen();
    BASE64.encode(nonce_bytes)
}

/// Parse server-first-message: `r=<nonce>,s=<salt>,i=<iterations>[,...]`
fn parse_server_first(msg: &str) -> Result<(String, Vec<u8>, u32)> {
    let mut nonce = None;
    let mut salt = None;
    let mut iterations = None;

    for part in msg.split(',') {
        if let Some(value) = part.strip_prefix("r=") {
            nonce = Some(value.to_string());
        } else if let Some(value) = part.strip_prefix("s=") {
            salt = Some(
                BASE64
                    .decode(value)
                    .map_err(|_| ProxyError::BackendAuth("SCRAM: invalid base64 in salt".into()))?,
            );
        } else if let Some(value) = part.strip_prefix("i=") {
            iterations = Some(value.parse::<u32>().map_err(|_| {
                ProxyError::BackendAuth("SCRAM: invalid iteration count".into())
            })?);
        }
    }

    match (nonce, salt, iterations) {
        (Some(n), Some(s), Some(i)) => Ok((n, s, i)),
        _ => Err(ProxyError::BackendAuth(
            "SCRAM: missing required field in server-first".into(),
        )),
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

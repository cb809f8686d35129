//! Credential types for the two sides of a proxied session.
//!
//! A session carries two unrelated credential pairs:
//!
//! - [`AuthenticationDetails`]: the stored datasource credentials the proxy
//!   uses to authenticate against the real backend. The client never sees
//!   these.
//! - [`ProxyCredentials`]: the proxy-issued, session-scoped pair the client
//!   must present on the frontend. These are single-use tokens minted by the
//!   approval workflow, never the real database password.
//!
//! All password fields use [`Zeroizing<String>`] so credentials are erased
//! from memory on drop, and `Debug` implementations redact them.

use subtle::ConstantTimeEq;
use zeroize::{ZeroizeOnDrop, Zeroizing};

/// How the proxy authenticates to the *backend* database.
///
/// Immutable, supplied at session construction.
#[derive(Clone, ZeroizeOnDrop)]
pub enum AuthenticationDetails {
    /// Plain username/password datasource credentials.
    UserPassword {
        /// Database username
        #[zeroize(skip)]
        username: String,
        /// Database password (zeroized on drop)
        password: Zeroizing<String>,
    },
}

impl AuthenticationDetails {
    /// Create username/password backend credentials.
    pub fn user_password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::UserPassword {
            username: username.into(),
            password: Zeroizing::new(password.into()),
        }
    }

    /// The backend username.
    pub fn username(&self) -> &str {
        match self {
            Self::UserPassword { username, .. } => username,
        }
    }

    /// The backend password.
    ///
    /// The returned reference should be used immediately and not stored;
    /// the password is zeroized when the value is dropped.
    pub fn password(&self) -> &str {
        match self {
            Self::UserPassword { password, .. } => password.as_str(),
        }
    }
}

impl std::fmt::Debug for AuthenticationDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UserPassword { username, .. } => f
                .debug_struct("UserPassword")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
        }
    }
}

/// Proxy-issued frontend credentials for one session.
///
/// Verification is constant-time so a failed attempt reveals neither which
/// field was wrong nor how close the guess was.
#[derive(Clone, ZeroizeOnDrop)]
pub struct ProxyCredentials {
    #[zeroize(skip)]
    username: String,
    password: Zeroizing<String>,
}

impl ProxyCredentials {
    /// Create a proxy credential pair.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Zeroizing::new(password.into()),
        }
    }

    /// The proxy-issued username.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Check a presented username/password pair against this credential.
    ///
    /// Both comparisons run in constant time and are combined without
    /// short-circuiting.
    pub fn verify(&self, username: &str, password: &str) -> bool {
        let user_ok = self.username.as_bytes().ct_eq(username.as_bytes());
        let pass_ok = self.password.as_bytes().ct_eq(password.as_bytes());
        (user_ok & pass_ok).into()
    }
}

impl std::fmt::Debug for ProxyCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyCredentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_password_creation() {
        let details = AuthenticationDetails::user_password("dbadmin", "s3cret");
        assert_eq!(details.username(), "dbadmin");
        assert_eq!(details.password(), "s3cret");
    }

    #[test]
    fn test_debug_redacts_backend_password() {
        let details = AuthenticationDetails::user_password("dbadmin", "supersecret123");
        let output = format!("{:?}", details);
        assert!(!output.contains("supersecret123"));
        assert!(output.contains("[REDACTED]"));
        assert!(output.contains("dbadmin"));
    }

    #[test]
    fn test_proxy_credentials_verify() {
        let creds = ProxyCredentials::new("session-user", "token-123");
        assert!(creds.verify("session-user", "token-123"));
        assert!(!creds.verify("session-user", "token-124"));
        assert!(!creds.verify("other-user", "token-123"));
        assert!(!creds.verify("", ""));
    }

    #[test]
    fn test_proxy_credentials_verify_length_mismatch() {
        let creds = ProxyCredentials::new("u", "p");
        assert!(!creds.verify("u", "pp"));
        assert!(!creds.verify("uu", "p"));
    }

    #[test]
    fn test_debug_redacts_proxy_password() {
        let creds = ProxyCredentials::new("session-user", "token-xyz");
        let output = format!("{:?}", creds);
        assert!(!output.contains("token-xyz"));
        assert!(output.contains("[REDACTED]"));
    }

    #[test]
    fn test_clone_independence() {
        let a = AuthenticationDetails::user_password("user", "password");
        let b = a.clone();
        drop(a);
        assert_eq!(b.username(), "user");
        assert_eq!(b.password(), "password");
    }
}

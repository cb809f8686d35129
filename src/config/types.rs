//! Configuration types

use serde::Deserialize;
use std::path::PathBuf;

use crate::tls::{TlsClientConfig, TlsServerConfig};

/// Root configuration structure for the standalone binary.
///
/// # Example YAML
///
/// ```yaml
/// server:
///   listen_address: "127.0.0.1"
///   listen_port: 15432
///
/// target:
///   host: "db.internal"
///   port: 5432
///   database: "orders"
///
/// credentials:
///   username: "app_readonly"
///   password: "${DB_PASSWORD}"
///
/// session:
///   proxy_username: "session-user"
///   proxy_password: "one-time-token"
///   duration_minutes: 60
/// ```
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Listener configuration
    pub server: ServerConfig,

    /// Backend database target
    pub target: TargetConfig,

    /// Stored datasource credentials injected on the backend side
    pub credentials: CredentialsConfig,

    /// Session parameters (proxy-issued credentials, duration)
    pub session: SessionConfig,

    /// Audit output configuration
    #[serde(default)]
    pub audit: AuditConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.target.host.is_empty() {
            return Err("target.host must not be empty".to_string());
        }
        if self.session.proxy_username.is_empty() {
            return Err("session.proxy_username must not be empty".to_string());
        }
        if self.session.duration_minutes <= 0 {
            return Err("session.duration_minutes must be positive".to_string());
        }
        self.server.tls.validate()?;
        Ok(())
    }
}

/// Server listener configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    /// Port to listen on (0 picks a free port)
    pub listen_port: u16,
    /// Connection and handshake timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// TLS termination for client connections
    #[serde(default)]
    pub tls: TlsServerConfig,
}

/// Backend database target
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    /// Backend host
    pub host: String,
    /// Backend port
    pub port: u16,
    /// Database name; falls back to the backend username when unset
    #[serde(default)]
    pub database: Option<String>,
    /// TLS for the backend connection
    #[serde(default)]
    pub tls: TlsClientConfig,
}

/// Stored datasource credentials
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsConfig {
    /// Backend username
    pub username: String,
    /// Backend password
    pub password: String,
}

/// Session parameters for the standalone binary
///
/// In the full system these arrive from the approval workflow per execution
/// request; the standalone binary reads them from configuration instead.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Proxy-issued frontend username
    pub proxy_username: String,
    /// Proxy-issued frontend password
    pub proxy_password: String,
    /// Session duration in minutes from start
    #[serde(default = "default_duration_minutes")]
    pub duration_minutes: i64,
    /// Execution request identity recorded with every statement
    #[serde(default = "default_execution_request_id")]
    pub execution_request_id: String,
    /// Acting user identity recorded with every statement
    #[serde(default = "default_user_id")]
    pub user_id: String,
}

/// Audit output configuration
#[derive(Debug, Default, Deserialize)]
pub struct AuditConfig {
    /// JSON Lines file to append events to; log-only when unset
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen_address() -> String {
    "127.0.0.1".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_duration_minutes() -> i64 {
    60
}

fn default_execution_request_id() -> String {
    "standalone".to_string()
}

fn default_user_id() -> String {
    "operator".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
server:
  listen_port: 15432
target:
  host: "127.0.0.1"
  port: 5432
credentials:
  username: "app"
  password: "secret"
session:
  proxy_username: "session-user"
  proxy_password: "token"
"#;

    #[test]
    fn test_minimal_config_parses_with_defaults() {
        let config: Config = serde_yaml::from_str(MINIMAL).unwrap();
        assert_eq!(config.server.listen_address, "127.0.0.1");
        assert_eq!(config.server.connect_timeout_secs, 10);
        assert_eq!(config.session.duration_minutes, 60);
        assert!(config.audit.file.is_none());
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_empty_host() {
        let yaml = MINIMAL.replace("host: \"127.0.0.1\"", "host: \"\"");
        let config: Config = serde_yaml::from_str(&yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_nonpositive_duration() {
        let mut config: Config = serde_yaml::from_str(MINIMAL).unwrap();
        config.session.duration_minutes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_full_config_parses() {
        let yaml = r#"
server:
  listen_address: "0.0.0.0"
  listen_port: 15432
  connect_timeout_secs: 5
  tls:
    enabled: false
target:
  host: "db.internal"
  port: 5432
  database: "orders"
credentials:
  username: "app"
  password: "secret"
session:
  proxy_username: "session-user"
  proxy_password: "token"
  duration_minutes: 30
  execution_request_id: "req-91"
  user_id: "alice"
audit:
  file: "/var/log/gatehouse/audit.jsonl"
logging:
  level: "debug"
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.target.database.as_deref(), Some("orders"));
        assert_eq!(config.session.execution_request_id, "req-91");
        assert_eq!(
            config.audit.file.as_deref(),
            Some(std::path::Path::new("/var/log/gatehouse/audit.jsonl"))
        );
        assert!(config.validate().is_ok());
    }
}

//! gatehouse-proxy - auditing database session proxy
//!
//! This library provides the core of a database-access gateway: a proxy
//! that sits between an operator's SQL client and a real database server,
//! speaking the database's own wire protocol on both sides. It
//! - authenticates the client against proxy-issued, session-scoped
//!   credentials (decoupled from the real database credentials)
//! - opens and authenticates a backend connection with stored datasource
//!   credentials
//! - relays frames bidirectionally, extracting the SQL text of every
//!   statement into an audit sink before forwarding it
//! - optionally terminates TLS on the frontend and encrypts the backend leg
//! - force-closes the whole session at an expiry instant computed when the
//!   session starts
//!
//! The review/approval workflow that decides whether a session may exist,
//! and the stores that persist audit events, are external collaborators:
//! they hand the session its credentials, duration, and audit sink as
//! explicit constructor arguments.

#[macro_use]
mod logging;

pub mod audit;
pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod protocol;
pub mod server;
pub mod tls;

pub use audit::{AuditEvent, AuditSink, FileSink, MemorySink, TracingSink};
pub use auth::{AuthenticationDetails, ProxyCredentials};
pub use config::Config;
pub use error::{ProxyError, Result};
pub use extract::{MysqlStatementExtractor, PostgresStatementExtractor, StatementExtractor};
pub use server::{
    compute_expiry, is_session_expired, ConnectionCorrelator, ConnectionId, DisconnectReason,
    MysqlRelayProxy, NetworkStream, PostgresProxy, ShutdownScheduler,
};
pub use tls::{TlsAcceptor, TlsClientConfig, TlsConnector, TlsError, TlsServerConfig, TlsVerifyMode};

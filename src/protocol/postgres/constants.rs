//! PostgreSQL wire protocol constants
//!
//! Reference: <https://www.postgresql.org/docs/current/protocol-message-formats.html>

/// Protocol version 3.0 (0x00030000)
pub const PROTOCOL_VERSION_3_0: u32 = 196608;

/// Magic code in an SSLRequest pseudo-startup message (80877103)
pub const SSL_REQUEST_CODE: u32 = 80877103;

/// Magic code in a CancelRequest pseudo-startup message (80877102)
pub const CANCEL_REQUEST_CODE: u32 = 80877102;

/// Reply byte accepting a TLS upgrade
pub const TLS_SUPPORTED: u8 = b'S';

/// Reply byte declining a TLS upgrade
pub const TLS_NOT_SUPPORTED: u8 = b'N';

// ============================================================================
// Frontend message tags (client -> server)
// ============================================================================

/// Simple query ('Q')
pub const MSG_QUERY: u8 = b'Q';
/// Parse: prepare a statement with its SQL text ('P')
pub const MSG_PARSE: u8 = b'P';
/// Bind parameter values to a prepared statement ('B')
pub const MSG_BIND: u8 = b'B';
/// Execute a bound portal ('E')
pub const MSG_EXECUTE: u8 = b'E';
/// Sync ('S')
pub const MSG_SYNC: u8 = b'S';
/// Terminate ('X')
pub const MSG_TERMINATE: u8 = b'X';
/// Password / SASL response ('p')
pub const MSG_PASSWORD: u8 = b'p';

// ============================================================================
// Backend message tags (server -> client)
// ============================================================================

/// Authentication request family ('R')
pub const MSG_AUTH_REQUEST: u8 = b'R';
/// ErrorResponse ('E')
pub const MSG_ERROR_RESPONSE: u8 = b'E';
/// NoticeResponse ('N')
pub const MSG_NOTICE_RESPONSE: u8 = b'N';
/// ParameterStatus ('S')
pub const MSG_PARAMETER_STATUS: u8 = b'S';
/// BackendKeyData ('K')
pub const MSG_BACKEND_KEY_DATA: u8 = b'K';
/// ReadyForQuery ('Z')
pub const MSG_READY_FOR_QUERY: u8 = b'Z';
/// CommandComplete ('C')
pub const MSG_COMMAND_COMPLETE: u8 = b'C';

// ============================================================================
// Authentication request subtypes (first 4 payload bytes of an 'R' message)
// ============================================================================

/// AuthenticationOk
pub const AUTH_OK: u32 = 0;
/// AuthenticationCleartextPassword
pub const AUTH_CLEARTEXT_PASSWORD: u32 = 3;
/// AuthenticationMD5Password (carries a 4-byte salt)
pub const AUTH_MD5_PASSWORD: u32 = 5;
/// AuthenticationSASL (carries a mechanism list)
pub const AUTH_SASL: u32 = 10;
/// AuthenticationSASLContinue
pub const AUTH_SASL_CONTINUE: u32 = 11;
/// AuthenticationSASLFinal
pub const AUTH_SASL_FINAL: u32 = 12;

/// The only SASL mechanism the backend negotiator speaks
pub const SASL_MECHANISM_SCRAM_SHA_256: &str = "SCRAM-SHA-256";

// ============================================================================
// ErrorResponse field tags and SQLSTATE codes
// ============================================================================

/// Severity field ('S')
pub const ERROR_FIELD_SEVERITY: u8 = b'S';
/// SQLSTATE code field ('C')
pub const ERROR_FIELD_CODE: u8 = b'C';
/// Human-readable message field ('M')
pub const ERROR_FIELD_MESSAGE: u8 = b'M';

/// invalid_password
pub const SQLSTATE_INVALID_PASSWORD: &str = "28P01";
/// connection_failure
pub const SQLSTATE_CONNECTION_FAILURE: &str = "08006";

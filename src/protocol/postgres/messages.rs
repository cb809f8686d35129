//! PostgreSQL message structures and payload builders
//!
//! These types cover the subset of the protocol the proxy must understand:
//! the startup exchange, the authentication family, and the setup messages
//! forwarded between backend and client before relaying begins. Everything
//! else crosses the proxy as an opaque frame.

use std::collections::BTreeMap;
use std::collections::HashMap;

use crate::error::{ProxyError, Result};
use crate::protocol::postgres::constants::*;

/// A startup message with its connection parameters.
#[derive(Debug, Clone)]
pub struct StartupMessage {
    /// Protocol version (always 3.0 here)
    pub protocol_version: u32,
    /// Connection parameters (user, database, application_name, ...)
    pub parameters: HashMap<String, String>,
}

impl StartupMessage {
    /// Create a startup message carrying only a user name.
    pub fn new(user: &str) -> Self {
        let mut parameters = HashMap::new();
        parameters.insert("user".to_string(), user.to_string());
        Self {
            protocol_version: PROTOCOL_VERSION_3_0,
            parameters,
        }
    }

    /// Create a startup message with user and database.
    pub fn with_database(user: &str, database: &str) -> Self {
        let mut msg = Self::new(user);
        msg.parameters
            .insert("database".to_string(), database.to_string());
        msg
    }

    /// The declared user, if present.
    pub fn user(&self) -> Option<&str> {
        self.parameters.get("user").map(String::as_str)
    }

    /// The requested database, if present.
    pub fn database(&self) -> Option<&str> {
        self.parameters.get("database").map(String::as_str)
    }
}

/// A CancelRequest received instead of a startup message.
#[derive(Debug, Clone, Copy)]
pub struct CancelRequest {
    /// Backend process id the client wants to cancel
    pub process_id: u32,
    /// Cancellation secret
    pub secret_key: u32,
}

/// An ErrorResponse or NoticeResponse as a set of tagged fields.
#[derive(Debug, Clone, Default)]
pub struct ErrorNoticeResponse {
    /// Field tag -> value. BTreeMap keeps encoding deterministic.
    pub fields: BTreeMap<u8, String>,
}

impl ErrorNoticeResponse {
    /// Empty response.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an error with severity, SQLSTATE code, and message.
    pub fn error(severity: &str, code: &str, message: &str) -> Self {
        let mut response = Self::new();
        response.set_field(ERROR_FIELD_SEVERITY, severity);
        response.set_field(ERROR_FIELD_CODE, code);
        response.set_field(ERROR_FIELD_MESSAGE, message);
        response
    }

    /// Set a field value.
    pub fn set_field(&mut self, field_type: u8, value: &str) {
        self.fields.insert(field_type, value.to_string());
    }

    /// The severity field, if present.
    pub fn severity(&self) -> Option<&str> {
        self.fields.get(&ERROR_FIELD_SEVERITY).map(String::as_str)
    }

    /// The SQLSTATE code field, if present.
    pub fn code(&self) -> Option<&str> {
        self.fields.get(&ERROR_FIELD_CODE).map(String::as_str)
    }

    /// The message field, if present.
    pub fn message(&self) -> Option<&str> {
        self.fields.get(&ERROR_FIELD_MESSAGE).map(String::as_str)
    }
}

/// A ParameterStatus message forwarded during connection setup.
#[derive(Debug, Clone)]
pub struct ParameterStatus {
    /// Parameter name
    pub name: String,
    /// Parameter value
    pub value: String,
}

/// A BackendKeyData message forwarded during connection setup.
#[derive(Debug, Clone, Copy)]
pub struct BackendKeyData {
    /// Backend process id
    pub process_id: u32,
    /// Cancellation secret
    pub secret_key: u32,
}

// ============================================================================
// Payload parsing helpers
// ============================================================================

/// Read a null-terminated string from a buffer at the given offset.
/// Returns the string and the number of bytes consumed (including null).
pub(crate) fn read_cstring_from_buf(buf: &[u8], offset: usize) -> Result<(String, usize)> {
    let remaining = buf
        .get(offset..)
        .ok_or_else(|| ProxyError::Framing("string offset past end of payload".into()))?;
    let end = remaining
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| ProxyError::Framing("missing null terminator in string".into()))?;

    let s = std::str::from_utf8(&remaining[..end])
        .map_err(|_| ProxyError::Framing("invalid UTF-8 in string".into()))?;

    Ok((s.to_string(), end + 1))
}

/// Parse an ErrorResponse/NoticeResponse payload into its fields.
pub fn parse_error_notice(payload: &[u8]) -> Result<ErrorNoticeResponse> {
    let mut response = ErrorNoticeResponse::new();
    let mut offset = 0;

    while offset < payload.len() {
        let field_type = payload[offset];
        offset += 1;

        if field_type == 0 {
            break;
        }

        let (value, len) = read_cstring_from_buf(payload, offset)?;
        offset += len;

        response.set_field(field_type, &value);
    }

    Ok(response)
}

/// Parse a ParameterStatus payload.
pub fn parse_parameter_status(payload: &[u8]) -> Result<ParameterStatus> {
    let (name, name_len) = read_cstring_from_buf(payload, 0)?;
    let (value, _) = read_cstring_from_buf(payload, name_len)?;

    Ok(ParameterStatus { name, value })
}

/// Parse a BackendKeyData payload.
pub fn parse_backend_key_data(payload: &[u8]) -> Result<BackendKeyData> {
    if payload.len() < 8 {
        return Err(ProxyError::Framing("BackendKeyData too short".into()));
    }

    let process_id = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
    let secret_key = u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]);

    Ok(BackendKeyData {
        process_id,
        secret_key,
    })
}

/// Parse a PasswordMessage payload (cleartext password, NUL-terminated).
pub fn parse_password_message(payload: &[u8]) -> Result<String> {
    let (password, _) = read_cstring_from_buf(payload, 0)?;
    Ok(password)
}

// ============================================================================
// Payload builders
// ============================================================================

/// Build an AuthenticationOk payload.
pub fn build_auth_ok() -> Vec<u8> {
    AUTH_OK.to_be_bytes().to_vec()
}

/// Build an AuthenticationCleartextPassword payload.
pub fn build_auth_cleartext_password() -> Vec<u8> {
    AUTH_CLEARTEXT_PASSWORD.to_be_bytes().to_vec()
}

/// Build a PasswordMessage payload (NUL-terminated).
pub fn build_password_message(password: &str) -> Vec<u8> {
    let mut payload = password.as_bytes().to_vec();
    payload.push(0);
    payload
}

/// Build a SASLInitialResponse payload: mechanism name + length-prefixed data.
pub fn build_sasl_initial_response(mechanism: &str, data: &[u8]) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(mechanism.as_bytes());
    payload.push(0);
    if data.is_empty() {
        payload.extend_from_slice(&(-1i32).to_be_bytes());
    } else {
        payload.extend_from_slice(&(data.len() as i32).to_be_bytes());
        payload.extend_from_slice(data);
    }
    payload
}

/// Build an ErrorResponse payload from tagged fields.
pub fn build_error_response(response: &ErrorNoticeResponse) -> Vec<u8> {
    let mut payload = Vec::new();

    for (&field_type, value) in &response.fields {
        payload.push(field_type);
        payload.extend_from_slice(value.as_bytes());
        payload.push(0);
    }

    payload.push(0);
    payload
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_message_parameters() {
        let msg = StartupMessage::with_database("operator", "orders");
        assert_eq!(msg.protocol_version, PROTOCOL_VERSION_3_0);
        assert_eq!(msg.user(), Some("operator"));
        assert_eq!(msg.database(), Some("orders"));
    }

    #[test]
    fn test_error_response_round_trip() {
        let error = ErrorNoticeResponse::error("FATAL", "28P01", "password authentication failed");
        let payload = build_error_response(&error);
        let parsed = parse_error_notice(&payload).unwrap();

        assert_eq!(parsed.severity(), Some("FATAL"));
        assert_eq!(parsed.code(), Some("28P01"));
        assert_eq!(parsed.message(), Some("password authentication failed"));
    }

    #[test]
    fn test_error_response_payload_shape() {
        let error = ErrorNoticeResponse::error("ERROR", "08006", "backend unavailable");
        let payload = build_error_response(&error);
        assert!(payload.contains(&ERROR_FIELD_SEVERITY));
        assert!(payload.contains(&ERROR_FIELD_CODE));
        assert!(payload.contains(&ERROR_FIELD_MESSAGE));
        assert_eq!(payload.last(), Some(&0));
    }

    #[test]
    fn test_parse_parameter_status() {
        let mut payload = Vec::new();
        payload.extend_from_slice(b"server_version\0");
        payload.extend_from_slice(b"15.2\0");

        let status = parse_parameter_status(&payload).unwrap();
        assert_eq!(status.name, "server_version");
        assert_eq!(status.value, "15.2");
    }

    #[test]
    fn test_parse_backend_key_data() {
        let payload = [0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07];
        let key_data = parse_backend_key_data(&payload).unwrap();
        assert_eq!(key_data.process_id, 0x00010203);
        assert_eq!(key_data.secret_key, 0x04050607);
    }

    #[test]
    fn test_parse_backend_key_data_too_short() {
        assert!(parse_backend_key_data(&[0x00, 0x01]).is_err());
    }

    #[test]
    fn test_password_message_round_trip() {
        let payload = build_password_message("tok-3fa9");
        assert_eq!(payload, b"tok-3fa9\0");
        assert_eq!(parse_password_message(&payload).unwrap(), "tok-3fa9");
    }

    #[test]
    fn test_build_auth_payloads() {
        assert_eq!(build_auth_ok(), vec![0, 0, 0, 0]);
        assert_eq!(build_auth_cleartext_password(), vec![0, 0, 0, 3]);
    }

    #[test]
    fn test_build_sasl_initial_response() {
        let data = b"n,,n=user,r=nonce";
        let payload = build_sasl_initial_response("SCRAM-SHA-256", data);

        assert!(payload.starts_with(b"SCRAM-SHA-256\0"));

        let len_offset = "SCRAM-SHA-256".len() + 1;
        let len = i32::from_be_bytes([
            payload[len_offset],
            payload[len_offset + 1],
            payload[len_offset + 2],
            payload[len_offset + 3],
        ]);
        assert_eq!(len, data.len() as i32);
    }

    #[test]
    fn test_cstring_missing_terminator() {
        assert!(read_cstring_from_buf(b"no terminator", 0).is_err());
    }
}

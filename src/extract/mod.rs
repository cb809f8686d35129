//! Statement extraction from decoded frames
//!
//! A read-only side channel over frontend-to-backend frames: when a frame
//! carries SQL text, the extractor pulls it out for the audit sink; the
//! frame itself is forwarded unmodified either way. Extraction never blocks
//! and runs on every client frame, so implementations stay allocation-light.

use crate::protocol::mysql::packets::{COM_QUERY, COM_STMT_PREPARE};
use crate::protocol::postgres::constants::{MSG_PARSE, MSG_QUERY};
use crate::protocol::postgres::messages::read_cstring_from_buf;

/// Default cap on recorded statement text.
pub const DEFAULT_MAX_STATEMENT_LENGTH: usize = 10_000;

/// Extracts SQL text from a decoded frontend frame.
///
/// `frame_type` is the dialect's message discriminator (the tag byte for
/// Postgres, the command byte for MySQL); `payload` is the frame content
/// after that discriminator. Returns `None` for frames that carry no new
/// statement — they pass through the relay untouched.
pub trait StatementExtractor: Send + Sync {
    /// Extract the statement text, if this frame carries one.
    fn extract_statement(&self, frame_type: u8, payload: &[u8]) -> Option<String>;

    /// Dialect name for logging context.
    fn dialect(&self) -> &'static str;
}

fn truncate_statement(text: &str, max_length: usize) -> String {
    if text.len() > max_length {
        // Avoid splitting a UTF-8 sequence at the cut point
        let mut cut = max_length;
        while cut > 0 && !text.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}...[truncated]", &text[..cut])
    } else {
        text.to_string()
    }
}

// ---------------------------------------------------------------------------
// PostgreSQL
// ---------------------------------------------------------------------------

/// PostgreSQL statement extractor.
///
/// - `'Q'` (simple query): the payload is the SQL text, NUL-terminated.
/// - `'P'` (parse): statement name, then the SQL text, both NUL-terminated.
/// - `'B'`/`'E'` (bind/execute) carry only parameter values and portal
///   names; they are not new statements.
pub struct PostgresStatementExtractor {
    max_statement_length: usize,
}

impl PostgresStatementExtractor {
    /// Create an extractor with the given statement length cap.
    pub fn new(max_statement_length: usize) -> Self {
        Self {
            max_statement_length,
        }
    }
}

impl Default for PostgresStatementExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_STATEMENT_LENGTH)
    }
}

impl StatementExtractor for PostgresStatementExtractor {
    fn extract_statement(&self, frame_type: u8, payload: &[u8]) -> Option<String> {
        match frame_type {
            MSG_QUERY => {
                let (sql, _) = read_cstring_from_buf(payload, 0).ok()?;
                Some(truncate_statement(&sql, self.max_statement_length))
            }
            MSG_PARSE => {
                let (_, after_name) = read_cstring_from_buf(payload, 0).ok()?;
                let (sql, _) = read_cstring_from_buf(payload, after_name).ok()?;
                Some(truncate_statement(&sql, self.max_statement_length))
            }
            _ => None,
        }
    }

    fn dialect(&self) -> &'static str {
        "postgresql"
    }
}

// ---------------------------------------------------------------------------
// MySQL
// ---------------------------------------------------------------------------

/// MySQL statement extractor.
///
/// - `COM_QUERY` / `COM_STMT_PREPARE`: the payload after the command byte is
///   the SQL text.
/// - `COM_STMT_EXECUTE` / `COM_STMT_FETCH` carry only a statement id and
///   parameters; they are not new statements.
pub struct MysqlStatementExtractor {
    max_statement_length: usize,
}

impl MysqlStatementExtractor {
    /// Create an extractor with the given statement length cap.
    pub fn new(max_statement_length: usize) -> Self {
        Self {
            max_statement_length,
        }
    }
}

impl Default for MysqlStatementExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_STATEMENT_LENGTH)
    }
}

impl StatementExtractor for MysqlStatementExtractor {
    fn extract_statement(&self, frame_type: u8, payload: &[u8]) -> Option<String> {
        match frame_type {
            COM_QUERY | COM_STMT_PREPARE => {
                if payload.is_empty() {
                    return None;
                }
                let sql = String::from_utf8_lossy(payload);
                Some(truncate_statement(&sql, self.max_statement_length))
            }
            _ => None,
        }
    }

    fn dialect(&self) -> &'static str {
        "mysql"
    }
}

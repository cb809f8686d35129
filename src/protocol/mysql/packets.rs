//! MySQL command constants and packet builders
//!
//! Reference: <https://dev.mysql.com/doc/dev/mysql-server/latest/my__command_8h.html>

use crate::protocol::mysql::codec::build_frame;

/// Quit connection (COM_QUIT)
pub const COM_QUIT: u8 = 0x01;

/// Switch database (COM_INIT_DB)
pub const COM_INIT_DB: u8 = 0x02;

/// Execute SQL query (COM_QUERY)
pub const COM_QUERY: u8 = 0x03;

/// Ping server (COM_PING)
pub const COM_PING: u8 = 0x0e;

/// Prepare statement (COM_STMT_PREPARE)
pub const COM_STMT_PREPARE: u8 = 0x16;

/// Execute prepared statement (COM_STMT_EXECUTE)
pub const COM_STMT_EXECUTE: u8 = 0x17;

/// Close prepared statement (COM_STMT_CLOSE)
pub const COM_STMT_CLOSE: u8 = 0x19;

/// Fetch cursor row (COM_STMT_FETCH)
pub const COM_STMT_FETCH: u8 = 0x1c;

/// Check if a command byte carries or executes SQL.
#[inline]
pub fn is_query_command(cmd: u8) -> bool {
    matches!(
        cmd,
        COM_QUERY | COM_STMT_PREPARE | COM_STMT_EXECUTE | COM_STMT_FETCH | COM_INIT_DB
    )
}

/// Build an ERR packet frame for operator-facing teardown messages.
///
/// Format: `0xFF + error_code (LE u16) + '#' + sql_state (5) + message`.
pub fn build_err_frame(error_code: u16, message: &str) -> Vec<u8> {
    let mut payload = Vec::with_capacity(9 + message.len());
    payload.push(0xFF);
    payload.extend_from_slice(&error_code.to_le_bytes());
    payload.push(b'#');
    payload.extend_from_slice(b"HY000");
    payload.extend_from_slice(message.as_bytes());

    build_frame(1, &payload)
}

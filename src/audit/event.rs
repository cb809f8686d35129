//! Audit event type.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// One audited statement: who ran what, under which execution request.
///
/// Write-once per intercepted query; the proxy forwards it to the sink
/// immediately and never buffers or deduplicates.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    /// Unique event id.
    pub event_id: Uuid,

    /// When the statement was intercepted.
    pub occurred_at: DateTime<Utc>,

    /// The approved execution request this session audits against.
    pub execution_request_id: String,

    /// The acting (human) user identity.
    pub user_id: String,

    /// The literal SQL text, possibly truncated.
    pub statement: String,
}

impl AuditEvent {
    /// Create an event stamped with a fresh id and the current time.
    pub fn new(
        execution_request_id: impl Into<String>,
        user_id: impl Into<String>,
        statement: impl Into<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            execution_request_id: execution_request_id.into(),
            user_id: user_id.into(),
            statement: statement.into(),
        }
    }

    /// Format the event as a single human-readable log line.
    pub fn to_log_line(&self) -> String {
        format!(
            "[{}] request={} user={} statement=\"{}\"",
            self.occurred_at.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            self.execution_request_id,
            self.user_id,
            self.statement.replace('\n', " "),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_fields() {
        let event = AuditEvent::new("req-42", "alice", "SELECT 1");
        assert_eq!(event.execution_request_id, "req-42");
        assert_eq!(event.user_id, "alice");
        assert_eq!(event.statement, "SELECT 1");
    }

    #[test]
    fn test_event_ids_unique() {
        let a = AuditEvent::new("req", "u", "SELECT 1");
        let b = AuditEvent::new("req", "u", "SELECT 1");
        assert_ne!(a.event_id, b.event_id);
    }

    #[test]
    fn test_log_line_flattens_newlines() {
        let event = AuditEvent::new("req-1", "bob", "SELECT *\nFROM t");
        let line = event.to_log_line();
        assert!(line.contains("request=req-1"));
        assert!(line.contains("user=bob"));
        assert!(line.contains("SELECT * FROM t"));
        assert!(!line.contains('\n'));
    }

    #[test]
    fn test_event_serializes_to_json() {
        let event = AuditEvent::new("req-1", "bob", "SELECT 1");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"execution_request_id\":\"req-1\""));
        assert!(json.contains("\"statement\":\"SELECT 1\""));
    }
}

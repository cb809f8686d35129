//! Audit sink trait and implementations.
//!
//! The sink is called synchronously in the relay's forwarding path: a
//! statement is recorded before its frame is forwarded to the backend. A
//! sink failure therefore fails the session rather than letting an
//! unaudited statement through. A crash between extraction and recording
//! remains a documented gap.

use async_trait::async_trait;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::audit::AuditEvent;
use crate::error::{ProxyError, Result};

/// Receives each extracted statement plus actor identity and persists it.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Record one statement; returns the persisted event.
    async fn record(
        &self,
        execution_request_id: &str,
        user_id: &str,
        statement: &str,
    ) -> Result<AuditEvent>;
}

/// Sink that emits each event as a structured log line.
#[derive(Debug, Default)]
pub struct TracingSink;

#[async_trait]
impl AuditSink for TracingSink {
    async fn record(
        &self,
        execution_request_id: &str,
        user_id: &str,
        statement: &str,
    ) -> Result<AuditEvent> {
        let event = AuditEvent::new(execution_request_id, user_id, statement);
        info!(
            event_id = %event.event_id,
            request = %event.execution_request_id,
            user = %event.user_id,
            statement = %event.statement,
            "Statement audited"
        );
        Ok(event)
    }
}

/// Sink that appends events to a JSON Lines file.
pub struct FileSink {
    file: Mutex<tokio::fs::File>,
}

impl FileSink {
    /// Open (or create) the audit file for appending.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())
            .await?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

#[async_trait]
impl AuditSink for FileSink {
    async fn record(
        &self,
        execution_request_id: &str,
        user_id: &str,
        statement: &str,
    ) -> Result<AuditEvent> {
        let event = AuditEvent::new(execution_request_id, user_id, statement);

        let mut line = serde_json::to_string(&event)
            .map_err(|e| ProxyError::Audit(format!("failed to serialize event: {}", e)))?;
        line.push('\n');

        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| ProxyError::Audit(format!("failed to append event: {}", e)))?;
        file.flush()
            .await
            .map_err(|e| ProxyError::Audit(format!("failed to flush event: {}", e)))?;

        Ok(event)
    }
}

/// In-memory sink for tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemorySink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded events, in receipt order.
    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().await.clone()
    }

    /// Recorded statement texts, in receipt order.
    pub async fn statements(&self) -> Vec<String> {
        self.events
            .lock()
            .await
            .iter()
            .map(|e| e.statement.clone())
            .collect()
    }

    /// Number of recorded events.
    pub async fn len(&self) -> usize {
        self.events.lock().await.len()
    }

    /// Whether nothing was recorded.
    pub async fn is_empty(&self) -> bool {
        self.events.lock().await.is_empty()
    }
}

#[async_trait]
impl AuditSink for MemorySink {
    async fn record(
        &self,
        execution_request_id: &str,
        user_id: &str,
        statement: &str,
    ) -> Result<AuditEvent> {
        let event = AuditEvent::new(execution_request_id, user_id, statement);
        self.events.lock().await.push(event.clone());
        Ok(event)
    }
}

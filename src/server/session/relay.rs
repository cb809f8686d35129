//! Frame-level bidirectional relay.
//!
//! The two directions of a session run as independent tasks over split
//! stream halves. Client-to-backend frames pass through the statement
//! extractor, and an extracted statement is recorded with the audit sink
//! *before* its frame is forwarded. Backend-to-client frames are forwarded
//! unmodified. The relay races both directions against the shutdown
//! scheduler's signal; whichever of {client EOF, backend EOF, protocol
//! error, expiry} happens first ends the session, and the losing direction
//! is aborted so its socket half closes underneath any blocked read.

use std::sync::Arc;

use tokio::io::{split, AsyncRead, AsyncWrite};
use tokio::sync::oneshot;

use crate::audit::AuditSink;
use crate::error::ProxyError;
use crate::extract::StatementExtractor;
use crate::protocol::postgres::codec::{read_frame, write_frame};
use crate::protocol::postgres::constants::MSG_TERMINATE;
use crate::server::session::DisconnectReason;

/// Identities recorded with every audited statement.
#[derive(Debug, Clone)]
pub struct RelayContext {
    /// The approved execution request this session audits against.
    pub execution_request_id: String,
    /// The acting user identity.
    pub user_id: String,
}

/// Run the bidirectional Postgres frame relay until the session ends.
///
/// Consumes both streams; on return both have been dropped (closed).
pub async fn relay_frames<C, B>(
    client: C,
    backend: B,
    extractor: Arc<dyn StatementExtractor>,
    audit: Arc<dyn AuditSink>,
    context: RelayContext,
    disconnect_rx: oneshot::Receiver<DisconnectReason>,
) -> DisconnectReason
where
    C: AsyncRead + AsyncWrite + Send + 'static,
    B: AsyncRead + AsyncWrite + Send + 'static,
{
    let (client_read, client_write) = split(client);
    let (backend_read, backend_write) = split(backend);

    let mut client_to_backend = tokio::spawn(pump_client_frames(
        client_read,
        backend_write,
        extractor,
        audit,
        context,
    ));
    let mut backend_to_client = tokio::spawn(pump_backend_frames(backend_read, client_write));
    let mut disconnect_rx = disconnect_rx;

    let reason = tokio::select! {
        result = &mut client_to_backend => {
            backend_to_client.abort();
            result.unwrap_or_else(|e| DisconnectReason::Io(e.to_string()))
        }
        result = &mut backend_to_client => {
            client_to_backend.abort();
            result.unwrap_or_else(|e| DisconnectReason::Io(e.to_string()))
        }
        signal = &mut disconnect_rx => {
            // Scheduler fired (or the session owner triggered teardown):
            // abort both pumps; dropping their halves closes the sockets.
            client_to_backend.abort();
            backend_to_client.abort();
            signal.unwrap_or(DisconnectReason::ClientDisconnect)
        }
    };

    debug!(reason = %reason.message(), "Relay ended");
    reason
}

/// Client-to-backend direction: decode, extract, audit, forward.
async fn pump_client_frames<R, W>(
    mut reader: R,
    mut writer: W,
    extractor: Arc<dyn StatementExtractor>,
    audit: Arc<dyn AuditSink>,
    context: RelayContext,
) -> DisconnectReason
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        let frame = match read_frame(&mut reader).await {
            Ok(Some(frame)) => frame,
            Ok(None) => return DisconnectReason::ClientDisconnect,
            Err(e) => return framing_reason("client", e),
        };

        if let Some(statement) = extractor.extract_statement(frame.tag, &frame.payload) {
            // Recorded before the frame is forwarded; a sink failure fails
            // the session rather than letting an unaudited statement through.
            if let Err(e) = audit
                .record(&context.execution_request_id, &context.user_id, &statement)
                .await
            {
                error!(error = %e, "Audit sink rejected statement, closing session");
                return DisconnectReason::AuditFailure(e.to_string());
            }
        }

        if let Err(e) = write_frame(&mut writer, frame.tag, &frame.payload).await {
            return DisconnectReason::Io(e.to_string());
        }

        if frame.tag == MSG_TERMINATE {
            return DisconnectReason::ClientDisconnect;
        }
    }
}

/// Backend-to-client direction: forward frames unmodified.
async fn pump_backend_frames<R, W>(mut reader: R, mut writer: W) -> DisconnectReason
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        let frame = match read_frame(&mut reader).await {
            Ok(Some(frame)) => frame,
            Ok(None) => return DisconnectReason::BackendDisconnect,
            Err(e) => return framing_reason("backend", e),
        };

        if let Err(e) = write_frame(&mut writer, frame.tag, &frame.payload).await {
            return DisconnectReason::Io(e.to_string());
        }
    }
}

fn framing_reason(side: &str, error: ProxyError) -> DisconnectReason {
    match error {
        ProxyError::FrameTooLarge { size, max } => {
            warn!(
                side = side,
                size = size,
                max = max,
                "Oversized frame; possible attack or corrupted stream"
            );
            DisconnectReason::Protocol(format!(
                "{} sent a {} byte frame (max {})",
                side, size, max
            ))
        }
        ProxyError::Framing(msg) => DisconnectReason::Protocol(format!("{}: {}", side, msg)),
        other => DisconnectReason::Io(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemorySink;
    use crate::extract::PostgresStatementExtractor;
    use crate::protocol::postgres::constants::{MSG_QUERY, MSG_READY_FOR_QUERY};
    use crate::server::session::ShutdownScheduler;
    use chrono::Utc;
    use std::time::Duration;
    use tokio::io::{duplex, AsyncWriteExt};

    fn test_context() -> RelayContext {
        RelayContext {
            execution_request_id: "req-1".to_string(),
            user_id: "alice".to_string(),
        }
    }

    #[tokio::test]
    async fn test_relay_forwards_and_audits_query() {
        let (client_side, client_peer) = duplex(4096);
        let (backend_side, backend_peer) = duplex(4096);
        let sink = Arc::new(MemorySink::new());

        let mut scheduler = ShutdownScheduler::new();
        let rx = scheduler.take_disconnect_rx().unwrap();

        let relay = tokio::spawn(relay_frames(
            client_peer,
            backend_peer,
            Arc::new(PostgresStatementExtractor::default()),
            sink.clone() as Arc<dyn AuditSink>,
            test_context(),
            rx,
        ));

        // Client sends a simple query, then terminates
        let mut client = client_side;
        write_frame(&mut client, MSG_QUERY, b"SELECT 1\0")
            .await
            .unwrap();

        // Backend answers with something opaque
        let mut backend = backend_side;
        write_frame(&mut backend, MSG_READY_FOR_QUERY, b"I")
            .await
            .unwrap();

        // The query must reach the backend verbatim
        let frame = read_frame(&mut backend).await.unwrap().unwrap();
        assert_eq!(frame.tag, MSG_QUERY);
        assert_eq!(frame.payload, b"SELECT 1\0");

        // The backend reply must reach the client unmodified
        let frame = read_frame(&mut client).await.unwrap().unwrap();
        assert_eq!(frame.tag, MSG_READY_FOR_QUERY);

        write_frame(&mut client, MSG_TERMINATE, b"").await.unwrap();
        let reason = relay.await.unwrap();
        assert_eq!(reason, DisconnectReason::ClientDisconnect);

        assert_eq!(sink.statements().await, vec!["SELECT 1"]);
    }

    #[tokio::test]
    async fn test_relay_client_eof() {
        let (client_side, client_peer) = duplex(4096);
        let (_backend_side, backend_peer) = duplex(4096);

        let mut scheduler = ShutdownScheduler::new();
        let rx = scheduler.take_disconnect_rx().unwrap();

        let relay = tokio::spawn(relay_frames(
            client_peer,
            backend_peer,
            Arc::new(PostgresStatementExtractor::default()),
            Arc::new(MemorySink::new()) as Arc<dyn AuditSink>,
            test_context(),
            rx,
        ));

        drop(client_side);

        let reason = tokio::time::timeout(Duration::from_secs(2), relay)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reason, DisconnectReason::ClientDisconnect);
    }

    #[tokio::test]
    async fn test_relay_expiry_forces_close() {
        let (client_side, client_peer) = duplex(4096);
        let (_backend_side, backend_peer) = duplex(4096);
        let sink = Arc::new(MemorySink::new());

        let mut scheduler = ShutdownScheduler::new();
        let rx = scheduler.take_disconnect_rx().unwrap();
        // Already past its expiry: fires immediately
        scheduler.arm(Utc::now() - chrono::Duration::minutes(2), 1);

        let relay = tokio::spawn(relay_frames(
            client_peer,
            backend_peer,
            Arc::new(PostgresStatementExtractor::default()),
            sink.clone() as Arc<dyn AuditSink>,
            test_context(),
            rx,
        ));

        let reason = tokio::time::timeout(Duration::from_secs(2), relay)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reason, DisconnectReason::Expired);

        // Nothing further is recorded after closure
        let mut client = client_side;
        let _ = write_frame(&mut client, MSG_QUERY, b"SELECT 2\0").await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(sink.is_empty().await);
    }

    #[tokio::test]
    async fn test_relay_protocol_error_closes() {
        let (client_side, client_peer) = duplex(4096);
        let (_backend_side, backend_peer) = duplex(4096);

        let mut scheduler = ShutdownScheduler::new();
        let rx = scheduler.take_disconnect_rx().unwrap();

        let relay = tokio::spawn(relay_frames(
            client_peer,
            backend_peer,
            Arc::new(PostgresStatementExtractor::default()),
            Arc::new(MemorySink::new()) as Arc<dyn AuditSink>,
            test_context(),
            rx,
        ));

        // A tag followed by a truncated header, then EOF
        let mut client = client_side;
        client.write_all(&[b'Q', 0x00]).await.unwrap();
        drop(client);

        let reason = tokio::time::timeout(Duration::from_secs(2), relay)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(reason, DisconnectReason::Protocol(_)));
    }

    #[tokio::test]
    async fn test_bind_execute_not_audited() {
        let (client_side, client_peer) = duplex(4096);
        let (backend_side, backend_peer) = duplex(4096);
        let sink = Arc::new(MemorySink::new());

        let mut scheduler = ShutdownScheduler::new();
        let rx = scheduler.take_disconnect_rx().unwrap();

        let relay = tokio::spawn(relay_frames(
            client_peer,
            backend_peer,
            Arc::new(PostgresStatementExtractor::default()),
            sink.clone() as Arc<dyn AuditSink>,
            test_context(),
            rx,
        ));

        let mut client = client_side;
        let mut backend = backend_side;

        // Parse carries the statement; Bind and Execute do not
        let mut parse = Vec::new();
        parse.extend_from_slice(b"s1\0");
        parse.extend_from_slice(b"SELECT * FROM t WHERE id = $1\0");
        parse.extend_from_slice(&0u16.to_be_bytes());
        write_frame(&mut client, b'P', &parse).await.unwrap();
        write_frame(&mut client, b'B', b"\0s1\0\x00\x00\x00\x00\x00\x00")
            .await
            .unwrap();
        write_frame(&mut client, b'E', b"\0\x00\x00\x00\x00").await.unwrap();
        write_frame(&mut client, MSG_TERMINATE, b"").await.unwrap();

        // All four frames arrive at the backend in order
        for expected in [b'P', b'B', b'E', MSG_TERMINATE] {
            let frame = read_frame(&mut backend).await.unwrap().unwrap();
            assert_eq!(frame.tag, expected);
        }

        relay.await.unwrap();
        assert_eq!(
            sink.statements().await,
            vec!["SELECT * FROM t WHERE id = $1"]
        );
    }
}

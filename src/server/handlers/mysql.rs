//! MySQL-style dual-adapter relay
//!
//! Unlike the Postgres shape, where a session owns its socket pair, this
//! deployment shape runs two independently managed adapters: an inbound
//! listener accepting client connections and an outbound side holding one
//! backend connection per client. Nothing structural ties a backend reply
//! to a client socket, so every reply is routed through the
//! [`ConnectionCorrelator`]: the backend connection id is looked up and the
//! frame is delivered to the paired client's writer. A reply whose mapping
//! has been removed (client already gone) is dropped, never forwarded.
//!
//! Traffic is relayed at packet boundaries through the MySQL codec, and
//! client-to-backend packets pass the statement extractor into the audit
//! sink before being forwarded. The handshake packets of both sides are
//! relayed transparently; this shape does not decouple credentials.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;

use crate::audit::AuditSink;
use crate::error::Result;
use crate::extract::{MysqlStatementExtractor, StatementExtractor};
use crate::protocol::mysql::codec::{read_packet, sequence_id, write_packet};
use crate::protocol::mysql::packets::{build_err_frame, is_query_command, COM_QUIT};
use crate::server::correlator::{ConnectionCorrelator, ConnectionId};

/// ER_QUERY_INTERRUPTED, sent when the relay tears a client down.
const ERR_QUERY_INTERRUPTED: u16 = 1317;

/// Per-client channels the reply router delivers into.
type ReplyWriters = Arc<RwLock<HashMap<ConnectionId, mpsc::Sender<Vec<u8>>>>>;

/// Shared-listener MySQL relay with correlator-routed replies.
pub struct MysqlRelayProxy {
    listen_address: String,
    backend_host: String,
    backend_port: u16,
    audit: Arc<dyn AuditSink>,
    execution_request_id: String,
    user_id: String,
    correlator: Arc<ConnectionCorrelator>,
    extractor: Arc<MysqlStatementExtractor>,
    shutdown_tx: Option<broadcast::Sender<()>>,
    accept_task: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl MysqlRelayProxy {
    /// Create a relay for the given backend, auditing against the given
    /// execution request and user.
    pub fn new(
        backend_host: impl Into<String>,
        backend_port: u16,
        audit: Arc<dyn AuditSink>,
        execution_request_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            listen_address: "127.0.0.1".to_string(),
            backend_host: backend_host.into(),
            backend_port,
            audit,
            execution_request_id: execution_request_id.into(),
            user_id: user_id.into(),
            correlator: Arc::new(ConnectionCorrelator::new()),
            extractor: Arc::new(MysqlStatementExtractor::default()),
            shutdown_tx: None,
            accept_task: None,
            local_addr: None,
        }
    }

    /// Override the listen address (default 127.0.0.1).
    pub fn with_listen_address(mut self, address: impl Into<String>) -> Self {
        self.listen_address = address.into();
        self
    }

    /// The correlator holding the live client↔backend pairings.
    pub fn correlator(&self) -> Arc<ConnectionCorrelator> {
        Arc::clone(&self.correlator)
    }

    /// The bound listener address, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Bind the inbound adapter and return once it is listening.
    pub async fn start_server(&mut self, port: u16) -> Result<SocketAddr> {
        let listener = TcpListener::bind((self.listen_address.as_str(), port)).await?;
        let local_addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        self.shutdown_tx = Some(shutdown_tx);
        self.local_addr = Some(local_addr);

        let shared = AdapterShared {
            backend_host: self.backend_host.clone(),
            backend_port: self.backend_port,
            audit: Arc::clone(&self.audit),
            execution_request_id: self.execution_request_id.clone(),
            user_id: self.user_id.clone(),
            correlator: Arc::clone(&self.correlator),
            extractor: Arc::clone(&self.extractor),
            reply_writers: Arc::new(RwLock::new(HashMap::new())),
        };

        self.accept_task = Some(tokio::spawn(accept_loop(listener, shared, shutdown_rx)));

        info!(
            listen_addr = %local_addr,
            backend = %format!("{}:{}", self.backend_host, self.backend_port),
            "MySQL relay listening"
        );

        Ok(local_addr)
    }

    /// Stop accepting and tear down all relayed connections.
    pub fn shutdown_server(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MysqlRelayProxy {
    fn drop(&mut self) {
        self.shutdown_server();
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }
    }
}

/// State shared by every adapter pairing of one relay instance.
#[derive(Clone)]
struct AdapterShared {
    backend_host: String,
    backend_port: u16,
    audit: Arc<dyn AuditSink>,
    execution_request_id: String,
    user_id: String,
    correlator: Arc<ConnectionCorrelator>,
    extractor: Arc<MysqlStatementExtractor>,
    reply_writers: ReplyWriters,
}

async fn accept_loop(
    listener: TcpListener,
    shared: AdapterShared,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        let (stream, peer_addr) = tokio::select! {
            result = listener.accept() => match result {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                    continue;
                }
            },
            _ = shutdown_rx.recv() => {
                debug!("MySQL relay shutting down");
                return;
            }
        };

        debug!(peer = %peer_addr, "New client connection");
        let shared = shared.clone();
        let pair_shutdown_rx = shutdown_rx.resubscribe();
        tokio::spawn(async move {
            run_adapter_pair(stream, peer_addr, shared, pair_shutdown_rx).await;
        });
    }
}

/// Pair one client connection with a fresh backend connection and relay
/// until either side closes.
async fn run_adapter_pair(
    client: TcpStream,
    peer_addr: SocketAddr,
    shared: AdapterShared,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let backend_addr = format!("{}:{}", shared.backend_host, shared.backend_port);
    let backend = match TcpStream::connect(&backend_addr).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(peer = %peer_addr, backend = %backend_addr, error = %e,
                "Backend unreachable, dropping client");
            return;
        }
    };

    let client_id = ConnectionId::new();
    let backend_id = ConnectionId::new();
    if let Err(e) = shared
        .correlator
        .register(client_id.clone(), backend_id.clone())
        .await
    {
        error!(error = %e, "Failed to register connection pairing");
        return;
    }
    debug!(
        peer = %peer_addr,
        client_id = %client_id,
        backend_id = %backend_id,
        "Connection pair registered"
    );

    let (client_read, client_write) = client.into_split();
    let (backend_read, backend_write) = backend.into_split();

    // The reply router delivers into this channel; the writer task is the
    // only place that touches the client socket's write half.
    let (reply_tx, reply_rx) = mpsc::channel::<Vec<u8>>(32);
    shared
        .reply_writers
        .write()
        .await
        .insert(client_id.clone(), reply_tx);

    let writer_task = tokio::spawn(client_writer(client_write, reply_rx));

    let mut inbound = tokio::spawn(client_to_backend(
        client_read,
        backend_write,
        shared.clone(),
    ));
    let mut outbound = tokio::spawn(backend_reply_router(
        backend_read,
        backend_id.clone(),
        shared.clone(),
    ));

    tokio::select! {
        _ = &mut inbound => outbound.abort(),
        _ = &mut outbound => inbound.abort(),
        _ = shutdown_rx.recv() => {
            inbound.abort();
            outbound.abort();
            // Tell the client why it is being cut off before the writer goes
            let err = build_err_frame(ERR_QUERY_INTERRUPTED, "Session terminated by proxy");
            if let Some(sender) = shared.reply_writers.read().await.get(&client_id).cloned() {
                let _ = sender.send(err).await;
            }
        }
    }

    // Teardown discipline: remove the mapping (both directions) and the
    // reply channel, so any late backend reply is dropped by the router.
    shared.correlator.unregister_client(&client_id).await;
    shared.reply_writers.write().await.remove(&client_id);

    // All senders are gone now; the writer drains anything still queued
    // (the ERR frame on forced shutdown) and exits on its own.
    let _ = tokio::time::timeout(Duration::from_secs(1), writer_task).await;

    debug!(peer = %peer_addr, client_id = %client_id, "Connection pair closed");
}

/// Writer task: the single owner of the client socket's write half.
async fn client_writer(mut client_write: OwnedWriteHalf, mut reply_rx: mpsc::Receiver<Vec<u8>>) {
    while let Some(frame) = reply_rx.recv().await {
        if let Err(e) = write_packet(&mut client_write, &frame).await {
            debug!(error = %e, "Client writer ending");
            break;
        }
    }
}

/// Inbound adapter: client packets to the backend, auditing statements.
async fn client_to_backend(
    mut client_read: OwnedReadHalf,
    mut backend_write: OwnedWriteHalf,
    shared: AdapterShared,
) {
    loop {
        let frame = match read_packet(&mut client_read).await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!("Client EOF");
                return;
            }
            Err(e) => {
                warn!(error = %e, "Client stream error");
                return;
            }
        };

        if frame.len() >= 2 {
            let command = frame[1];
            trace!(
                seq = ?sequence_id(&frame),
                command = command,
                len = frame.len(),
                "client packet"
            );

            if is_query_command(command) {
                if let Some(statement) = shared.extractor.extract_statement(command, &frame[2..]) {
                    if let Err(e) = shared
                        .audit
                        .record(&shared.execution_request_id, &shared.user_id, &statement)
                        .await
                    {
                        error!(error = %e, "Audit sink rejected statement, closing connection");
                        return;
                    }
                }
            }

            if command == COM_QUIT {
                let _ = write_packet(&mut backend_write, &frame).await;
                debug!("Client sent COM_QUIT");
                return;
            }
        }

        if let Err(e) = write_packet(&mut backend_write, &frame).await {
            warn!(error = %e, "Error forwarding to backend");
            return;
        }
    }
}

/// Outbound adapter: backend packets routed to the paired client.
///
/// Every reply is routed via the correlator; once the pairing is removed
/// the reply is dropped and the router stops.
async fn backend_reply_router(
    mut backend_read: OwnedReadHalf,
    backend_id: ConnectionId,
    shared: AdapterShared,
) {
    loop {
        let frame = match read_packet(&mut backend_read).await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!(backend_id = %backend_id, "Backend EOF");
                return;
            }
            Err(e) => {
                warn!(backend_id = %backend_id, error = %e, "Backend stream error");
                return;
            }
        };

        let Some(client_id) = shared.correlator.client_for(&backend_id).await else {
            debug!(backend_id = %backend_id, "Dropping reply for unpaired backend connection");
            return;
        };

        let sender = shared.reply_writers.read().await.get(&client_id).cloned();
        let Some(sender) = sender else {
            debug!(client_id = %client_id, "Dropping reply: client writer gone");
            return;
        };

        if sender.send(frame).await.is_err() {
            debug!(client_id = %client_id, "Client writer channel closed");
            return;
        }
    }
}

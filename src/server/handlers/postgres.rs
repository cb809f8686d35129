//! PostgreSQL session proxy
//!
//! One [`PostgresProxy`] is the unit of work for one approved execution
//! request: it binds a listener on the assigned port, accepts a single
//! client connection, and drives it through the session state machine:
//!
//! ```text
//! AwaitingClientStartup -> (TlsHandshake)? -> AwaitingClientAuth
//!   -> AwaitingBackendConnect -> AwaitingBackendAuth -> Relaying -> Closed
//! ```
//!
//! The frontend authenticates against the proxy-issued credentials, never
//! the real database credentials; the backend handshake uses the stored
//! datasource credentials and its failures surface to the client only as a
//! generic "session could not be started" error. Once relaying begins, the
//! session races the shutdown scheduler's expiry timer.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::audit::AuditSink;
use crate::auth::{AuthenticationDetails, ProxyCredentials};
use crate::error::{ProxyError, Result};
use crate::extract::PostgresStatementExtractor;
use crate::protocol::postgres::auth::{compute_md5_password, ScramClient};
use crate::protocol::postgres::codec::{
    read_frame, read_startup_frame, write_frame, write_ssl_request, write_startup_frame,
    StartupFrame,
};
use crate::protocol::postgres::constants::*;
use crate::protocol::postgres::messages::{
    build_auth_cleartext_password, build_auth_ok, build_error_response, build_password_message,
    build_sasl_initial_response, parse_error_notice, parse_parameter_status,
    parse_password_message, ErrorNoticeResponse, StartupMessage,
};
use crate::server::session::{relay_frames, DisconnectReason, RelayContext, ShutdownScheduler};
use crate::server::stream::NetworkStream;
use crate::tls::{TlsAcceptor, TlsConnector};

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    /// Waiting for the client's startup (or SSLRequest) frame
    AwaitingClientStartup,
    /// Upgrading the client socket to TLS
    TlsHandshake,
    /// Validating the proxy-issued credentials
    AwaitingClientAuth,
    /// Opening the backend socket
    AwaitingBackendConnect,
    /// Running the backend authentication handshake
    AwaitingBackendAuth,
    /// Relaying frames in both directions
    Relaying,
    /// Terminal; both sockets closed
    Closed,
}

/// Everything one session run needs, cloned out of the proxy at start.
struct SessionParams {
    target_host: String,
    target_port: u16,
    database_name: String,
    auth: AuthenticationDetails,
    audit: Arc<dyn AuditSink>,
    execution_request_id: String,
    user_id: String,
    credentials: ProxyCredentials,
    tls_acceptor: Option<TlsAcceptor>,
    backend_tls: Option<TlsConnector>,
    connect_timeout: Duration,
    start_time: DateTime<Utc>,
    duration_minutes: i64,
}

/// A time-boxed, auditing proxy session for one execution request.
pub struct PostgresProxy {
    listen_address: String,
    target_host: String,
    target_port: u16,
    database_name: String,
    auth: AuthenticationDetails,
    audit: Arc<dyn AuditSink>,
    execution_request_id: String,
    user_id: String,
    tls_acceptor: Option<TlsAcceptor>,
    backend_tls: Option<TlsConnector>,
    connect_timeout: Duration,
    running: Arc<AtomicBool>,
    shutdown_tx: Option<broadcast::Sender<()>>,
    serve_task: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl PostgresProxy {
    /// Create a session proxy for the given backend and identities.
    ///
    /// The audit sink and backend credentials are explicit arguments; the
    /// session never resolves collaborators from ambient state.
    pub fn new(
        target_host: impl Into<String>,
        target_port: u16,
        database_name: impl Into<String>,
        auth: AuthenticationDetails,
        audit: Arc<dyn AuditSink>,
        execution_request_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            listen_address: "127.0.0.1".to_string(),
            target_host: target_host.into(),
            target_port,
            database_name: database_name.into(),
            auth,
            audit,
            execution_request_id: execution_request_id.into(),
            user_id: user_id.into(),
            tls_acceptor: None,
            backend_tls: None,
            connect_timeout: Duration::from_secs(10),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx: None,
            serve_task: None,
            local_addr: None,
        }
    }

    /// Terminate TLS on the frontend with the given acceptor.
    ///
    /// Without one, a client's SSLRequest is declined and the handshake
    /// continues in clear text.
    pub fn with_tls(mut self, acceptor: TlsAcceptor) -> Self {
        self.tls_acceptor = Some(acceptor);
        self
    }

    /// Encrypt the backend connection with the given connector.
    pub fn with_backend_tls(mut self, connector: TlsConnector) -> Self {
        self.backend_tls = Some(connector);
        self
    }

    /// Override the listen address (default 127.0.0.1).
    pub fn with_listen_address(mut self, address: impl Into<String>) -> Self {
        self.listen_address = address.into();
        self
    }

    /// Override the startup/connect timeout (default 10s).
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Whether the session has reached `Relaying` and not yet closed.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// The bound listener address, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Bind the session listener and return once it is listening.
    ///
    /// Called once per approved execution request. `port` 0 picks a free
    /// port; the bound address is returned. The expiry instant is computed
    /// from `start_time + duration_minutes` and the session is torn down at
    /// that instant regardless of traffic.
    pub async fn start_server(
        &mut self,
        port: u16,
        proxy_username: &str,
        proxy_password: &str,
        start_time: DateTime<Utc>,
        duration_minutes: i64,
    ) -> Result<SocketAddr> {
        let listener = TcpListener::bind((self.listen_address.as_str(), port)).await?;
        let local_addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        self.shutdown_tx = Some(shutdown_tx);
        self.local_addr = Some(local_addr);

        let params = SessionParams {
            target_host: self.target_host.clone(),
            target_port: self.target_port,
            database_name: self.database_name.clone(),
            auth: self.auth.clone(),
            audit: Arc::clone(&self.audit),
            execution_request_id: self.execution_request_id.clone(),
            user_id: self.user_id.clone(),
            credentials: ProxyCredentials::new(proxy_username, proxy_password),
            tls_acceptor: self.tls_acceptor.clone(),
            backend_tls: self.backend_tls.clone(),
            connect_timeout: self.connect_timeout,
            start_time,
            duration_minutes,
        };

        let running = Arc::clone(&self.running);
        self.serve_task = Some(tokio::spawn(serve_session(
            listener,
            params,
            running,
            shutdown_rx,
        )));

        info!(
            listen_addr = %local_addr,
            target = %format!("{}:{}", self.target_host, self.target_port),
            request = %self.execution_request_id,
            "Session listener bound"
        );

        Ok(local_addr)
    }

    /// Tear the session down: close the listener and any live relay.
    pub fn shutdown_server(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.running.store(false, Ordering::SeqCst);
    }
}

impl Drop for PostgresProxy {
    fn drop(&mut self) {
        self.shutdown_server();
        if let Some(task) = self.serve_task.take() {
            task.abort();
        }
    }
}

/// Accept one client and run it through the session state machine.
async fn serve_session(
    listener: TcpListener,
    params: SessionParams,
    running: Arc<AtomicBool>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut scheduler = ShutdownScheduler::new();
    scheduler.arm(params.start_time, params.duration_minutes);
    let Some(mut disconnect_rx) = scheduler.take_disconnect_rx() else {
        return;
    };

    let (stream, peer_addr) = tokio::select! {
        result = listener.accept() => match result {
            Ok(pair) => pair,
            Err(e) => {
                error!(error = %e, "Failed to accept client connection");
                return;
            }
        },
        _ = &mut disconnect_rx => {
            info!("Session expired before a client connected");
            return;
        }
        _ = shutdown_rx.recv() => {
            debug!("Session shut down before a client connected");
            return;
        }
    };

    // One client connection per session; stop listening once it arrives.
    drop(listener);
    debug!(peer = %peer_addr, "Client connected");

    let connection = SessionConnection::new(stream, peer_addr);
    let run = connection.run(&params, Arc::clone(&running), disconnect_rx);
    tokio::pin!(run);

    let outcome = tokio::select! {
        outcome = &mut run => outcome,
        _ = shutdown_rx.recv() => {
            info!(peer = %peer_addr, "Session torn down by operator");
            running.store(false, Ordering::SeqCst);
            scheduler.shutdown();
            return;
        }
    };

    running.store(false, Ordering::SeqCst);
    scheduler.shutdown();

    match outcome {
        Ok(reason) => info!(
            peer = %peer_addr,
            request = %params.execution_request_id,
            reason = %reason.message(),
            "Session closed"
        ),
        Err(e) => warn!(
            peer = %peer_addr,
            request = %params.execution_request_id,
            error = %e,
            "Session failed to start"
        ),
    }
}

/// One accepted client connection moving through the session states.
struct SessionConnection {
    /// Client stream (Option for safe taking during the TLS upgrade)
    client: Option<NetworkStream>,
    peer_addr: SocketAddr,
    state: SessionState,
}

impl SessionConnection {
    fn new(stream: TcpStream, peer_addr: SocketAddr) -> Self {
        Self {
            client: Some(NetworkStream::tcp(stream)),
            peer_addr,
            state: SessionState::AwaitingClientStartup,
        }
    }

    fn transition(&mut self, next: SessionState) {
        trace!(peer = %self.peer_addr, from = ?self.state, to = ?next, "Session state");
        self.state = next;
    }

    fn client_mut(&mut self) -> Result<&mut NetworkStream> {
        self.client
            .as_mut()
            .ok_or_else(|| ProxyError::Connection("client stream not available".into()))
    }

    fn take_client(&mut self) -> Result<NetworkStream> {
        self.client
            .take()
            .ok_or_else(|| ProxyError::Connection("client stream not available".into()))
    }

    /// Drive the connection through startup, auth, backend setup, and relay.
    async fn run(
        mut self,
        params: &SessionParams,
        running: Arc<AtomicBool>,
        disconnect_rx: oneshot::Receiver<DisconnectReason>,
    ) -> Result<DisconnectReason> {
        // AwaitingClientStartup (and the optional TlsHandshake)
        let startup = self
            .receive_client_startup(params.connect_timeout, params.tls_acceptor.clone())
            .await?;

        info!(
            peer = %self.peer_addr,
            user = %startup.user().unwrap_or("(unknown)"),
            database = %startup.database().unwrap_or("(default)"),
            tls = self.client.as_ref().map(|c| c.is_encrypted()).unwrap_or(false),
            "Client startup received"
        );

        // AwaitingClientAuth
        self.transition(SessionState::AwaitingClientAuth);
        self.authenticate_client(&startup, &params.credentials, params.connect_timeout)
            .await?;

        // AwaitingBackendConnect
        self.transition(SessionState::AwaitingBackendConnect);
        let mut backend = match self.connect_backend(params).await {
            Ok(backend) => backend,
            Err(e) => {
                self.send_session_start_error().await.ok();
                self.transition(SessionState::Closed);
                return Err(e);
            }
        };

        // AwaitingBackendAuth
        self.transition(SessionState::AwaitingBackendAuth);
        if let Err(e) = self.authenticate_with_backend(&mut backend, params).await {
            self.send_session_start_error().await.ok();
            self.transition(SessionState::Closed);
            return Err(e);
        }

        // Frontend completion: AuthenticationOk, then the backend's own
        // parameters and ReadyForQuery
        write_frame(self.client_mut()?, MSG_AUTH_REQUEST, &build_auth_ok()).await?;
        if let Err(e) = self.forward_backend_ready(&mut backend).await {
            self.transition(SessionState::Closed);
            return Err(e);
        }

        debug!(
            peer = %self.peer_addr,
            target = %format!("{}:{}", params.target_host, params.target_port),
            "Handshake complete, relaying"
        );

        // Relaying
        self.transition(SessionState::Relaying);
        running.store(true, Ordering::SeqCst);

        let client = self.take_client()?;
        let context = RelayContext {
            execution_request_id: params.execution_request_id.clone(),
            user_id: params.user_id.clone(),
        };
        let reason = relay_frames(
            client,
            backend,
            Arc::new(PostgresStatementExtractor::default()),
            Arc::clone(&params.audit),
            context,
            disconnect_rx,
        )
        .await;

        self.transition(SessionState::Closed);
        Ok(reason)
    }

    /// Receive the startup message, honoring an SSLRequest first.
    async fn receive_client_startup(
        &mut self,
        timeout_duration: Duration,
        tls_acceptor: Option<TlsAcceptor>,
    ) -> Result<StartupMessage> {
        let initial = timeout(timeout_duration, read_startup_frame(self.client_mut()?))
            .await
            .map_err(|_| ProxyError::Timeout("waiting for client startup".into()))??
            .ok_or_else(|| ProxyError::Connection("client closed before startup".into()))?;

        match initial {
            StartupFrame::SslRequest => {
                if let Some(acceptor) = tls_acceptor {
                    self.client_mut()?.write_all(&[TLS_SUPPORTED]).await?;
                    self.transition(SessionState::TlsHandshake);

                    let tcp = match self.take_client()?.into_tcp() {
                        Ok(stream) => stream,
                        Err(_) => {
                            return Err(ProxyError::Protocol(
                                "cannot upgrade: connection already encrypted".into(),
                            ))
                        }
                    };
                    let tls_stream = acceptor.accept(tcp).await?;
                    self.client = Some(NetworkStream::ServerTls(Box::new(tls_stream)));

                    if let Some(version) = self.client_mut()?.tls_version() {
                        debug!(peer = %self.peer_addr, version = version, "TLS established");
                    }
                } else {
                    self.client_mut()?.write_all(&[TLS_NOT_SUPPORTED]).await?;
                    debug!(peer = %self.peer_addr, "Declined SSLRequest, continuing in clear text");
                }

                let startup = timeout(timeout_duration, read_startup_frame(self.client_mut()?))
                    .await
                    .map_err(|_| ProxyError::Timeout("waiting for startup after SSLRequest".into()))??
                    .ok_or_else(|| {
                        ProxyError::Connection("client closed after SSLRequest".into())
                    })?;

                match startup {
                    StartupFrame::Startup(msg) => Ok(msg),
                    _ => Err(ProxyError::Protocol(
                        "expected startup message after SSLRequest".into(),
                    )),
                }
            }
            StartupFrame::Startup(msg) => Ok(msg),
            StartupFrame::CancelRequest(_) => Err(ProxyError::Protocol(
                "cancel requests are not relayed by this proxy".into(),
            )),
        }
    }

    /// Validate the client against the proxy-issued credentials.
    async fn authenticate_client(
        &mut self,
        startup: &StartupMessage,
        credentials: &ProxyCredentials,
        timeout_duration: Duration,
    ) -> Result<()> {
        write_frame(
            self.client_mut()?,
            MSG_AUTH_REQUEST,
            &build_auth_cleartext_password(),
        )
        .await?;

        let frame = timeout(timeout_duration, read_frame(self.client_mut()?))
            .await
            .map_err(|_| ProxyError::Timeout("waiting for client password".into()))??
            .ok_or_else(|| ProxyError::Connection("client closed during auth".into()))?;

        if frame.tag != MSG_PASSWORD {
            return Err(ProxyError::Protocol(format!(
                "expected password message, got '{}'",
                frame.tag as char
            )));
        }

        let password = parse_password_message(&frame.payload)?;
        let username = startup.user().unwrap_or_default();

        if credentials.verify(username, &password) {
            debug!(peer = %self.peer_addr, user = %username, "Frontend authentication succeeded");
            Ok(())
        } else {
            // The response does not reveal whether the username or the
            // password was wrong.
            warn!(peer = %self.peer_addr, user = %username, "Frontend authentication failed");
            self.send_client_error(SQLSTATE_INVALID_PASSWORD, "password authentication failed")
                .await
                .ok();
            Err(ProxyError::FrontendAuth(format!(
                "invalid proxy credentials for user '{}'",
                username
            )))
        }
    }

    /// Open the backend socket, optionally upgrading it to TLS.
    async fn connect_backend(&mut self, params: &SessionParams) -> Result<NetworkStream> {
        let addr = format!("{}:{}", params.target_host, params.target_port);
        debug!(target = %addr, "Connecting to backend");

        let mut stream = timeout(params.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| ProxyError::Timeout(format!("connecting to {}", addr)))?
            .map_err(|e| ProxyError::BackendConnect(format!("{}: {}", addr, e)))?;

        if let Some(ref connector) = params.backend_tls {
            write_ssl_request(&mut stream).await?;

            let mut response = [0u8; 1];
            stream
                .read_exact(&mut response)
                .await
                .map_err(|e| ProxyError::BackendConnect(format!("{}: {}", addr, e)))?;

            match response[0] {
                TLS_SUPPORTED => {
                    let tls_stream = connector.connect(stream, &params.target_host).await?;
                    debug!(target = %addr, "Backend TLS established");
                    return Ok(NetworkStream::ClientTls(Box::new(tls_stream)));
                }
                TLS_NOT_SUPPORTED => {
                    warn!(target = %addr, "Backend declined TLS, continuing in clear text");
                    return Ok(NetworkStream::Tcp(stream));
                }
                other => {
                    return Err(ProxyError::BackendConnect(format!(
                        "unexpected SSL response from backend: 0x{:02X}",
                        other
                    )));
                }
            }
        }

        Ok(NetworkStream::Tcp(stream))
    }

    /// Run the backend authentication handshake with the stored credentials.
    async fn authenticate_with_backend(
        &mut self,
        backend: &mut NetworkStream,
        params: &SessionParams,
    ) -> Result<()> {
        let username = params.auth.username().to_string();
        let password = params.auth.password().to_string();
        let database = if !params.database_name.is_empty() {
            params.database_name.clone()
        } else {
            username.clone()
        };

        let startup = StartupMessage::with_database(&username, &database);
        write_startup_frame(backend, &startup).await?;

        loop {
            let frame = read_frame(backend)
                .await?
                .ok_or_else(|| ProxyError::BackendAuth("backend closed during auth".into()))?;

            match frame.tag {
                MSG_AUTH_REQUEST => {
                    if self
                        .handle_backend_auth_request(backend, &frame.payload, &username, &password)
                        .await?
                    {
                        debug!("Backend authentication succeeded");
                        return Ok(());
                    }
                }
                MSG_ERROR_RESPONSE => {
                    let detail = parse_error_notice(&frame.payload)
                        .ok()
                        .and_then(|e| e.message().map(str::to_string))
                        .unwrap_or_else(|| "unknown error".to_string());
                    // Detail stays in the proxy log; the client gets a
                    // generic failure from the caller.
                    error!(error = %detail, "Backend rejected stored credentials");
                    return Err(ProxyError::BackendAuth(detail));
                }
                other => {
                    warn!(tag = %(other as char), "Unexpected message during backend auth");
                }
            }
        }
    }

    /// Answer one authentication request from the backend.
    ///
    /// Returns true once AuthenticationOk arrives.
    async fn handle_backend_auth_request(
        &mut self,
        backend: &mut NetworkStream,
        payload: &[u8],
        username: &str,
        password: &str,
    ) -> Result<bool> {
        if payload.len() < 4 {
            return Err(ProxyError::Protocol("short authentication message".into()));
        }
        let auth_type = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);

        match auth_type {
            AUTH_OK => Ok(true),
            AUTH_CLEARTEXT_PASSWORD => {
                write_frame(backend, MSG_PASSWORD, &build_password_message(password)).await?;
                Ok(false)
            }
            AUTH_MD5_PASSWORD => {
                if payload.len() < 8 {
                    return Err(ProxyError::Protocol("MD5 auth message missing salt".into()));
                }
                let salt = [payload[4], payload[5], payload[6], payload[7]];
                let response = compute_md5_password(username, password, &salt);
                write_frame(backend, MSG_PASSWORD, &build_password_message(&response)).await?;
                Ok(false)
            }
            AUTH_SASL => {
                self.run_scram_exchange(backend, payload, username, password)
                    .await?;
                Ok(true)
            }
            other => Err(ProxyError::BackendAuth(format!(
                "backend requested unsupported auth type {}",
                other
            ))),
        }
    }

    /// SCRAM-SHA-256 exchange, through AuthenticationOk.
    async fn run_scram_exchange(
        &mut self,
        backend: &mut NetworkStream,
        initial_payload: &[u8],
        username: &str,
        password: &str,
    ) -> Result<()> {
        let mechanisms_raw = std::str::from_utf8(&initial_payload[4..])
            .map_err(|_| ProxyError::Protocol("invalid SASL mechanism list".into()))?;
        let mechanisms: Vec<&str> = mechanisms_raw
            .split('\0')
            .filter(|s| !s.is_empty())
            .collect();

        if !mechanisms.contains(&SASL_MECHANISM_SCRAM_SHA_256) {
            return Err(ProxyError::BackendAuth(format!(
                "backend offers no supported SASL mechanism (got {:?})",
                mechanisms
            )));
        }

        let mut scram = ScramClient::new(username, password);
        let client_first = scram.client_first_message();
        write_frame(
            backend,
            MSG_PASSWORD,
            &build_sasl_initial_response(SASL_MECHANISM_SCRAM_SHA_256, &client_first),
        )
        .await?;

        let payload = self.expect_auth_frame(backend).await?;
        let auth_type = auth_subtype(&payload)?;
        if auth_type != AUTH_SASL_CONTINUE {
            return Err(ProxyError::Protocol(format!(
                "expected SASL continue, got auth type {}",
                auth_type
            )));
        }
        let client_final = scram.process_server_first(&payload[4..])?;
        write_frame(backend, MSG_PASSWORD, &client_final).await?;

        let payload = self.expect_auth_frame(backend).await?;
        match auth_subtype(&payload)? {
            AUTH_SASL_FINAL => {
                scram.verify_server_final(&payload[4..])?;
            }
            AUTH_OK => return Ok(()),
            other => {
                return Err(ProxyError::Protocol(format!(
                    "expected SASL final, got auth type {}",
                    other
                )))
            }
        }

        let payload = self.expect_auth_frame(backend).await?;
        if auth_subtype(&payload)? != AUTH_OK {
            return Err(ProxyError::BackendAuth(
                "SCRAM exchange did not end in AuthenticationOk".into(),
            ));
        }

        Ok(())
    }

    /// Read the next frame and require it to be an authentication message;
    /// an ErrorResponse here is a backend auth failure.
    async fn expect_auth_frame(&mut self, backend: &mut NetworkStream) -> Result<Vec<u8>> {
        let frame = read_frame(backend)
            .await?
            .ok_or_else(|| ProxyError::BackendAuth("backend closed during auth".into()))?;

        match frame.tag {
            MSG_AUTH_REQUEST => Ok(frame.payload),
            MSG_ERROR_RESPONSE => {
                let detail = parse_error_notice(&frame.payload)
                    .ok()
                    .and_then(|e| e.message().map(str::to_string))
                    .unwrap_or_else(|| "unknown error".to_string());
                error!(error = %detail, "Backend rejected stored credentials");
                Err(ProxyError::BackendAuth(detail))
            }
            other => Err(ProxyError::Protocol(format!(
                "expected authentication message, got '{}'",
                other as char
            ))),
        }
    }

    /// Forward the backend's setup messages until ReadyForQuery.
    async fn forward_backend_ready(&mut self, backend: &mut NetworkStream) -> Result<()> {
        loop {
            let frame = read_frame(backend)
                .await?
                .ok_or_else(|| ProxyError::BackendConnect("backend closed during setup".into()))?;

            match frame.tag {
                MSG_PARAMETER_STATUS => {
                    write_frame(self.client_mut()?, frame.tag, &frame.payload).await?;
                    if let Ok(param) = parse_parameter_status(&frame.payload) {
                        trace!(name = %param.name, value = %param.value, "Forwarded parameter");
                    }
                }
                MSG_BACKEND_KEY_DATA | MSG_NOTICE_RESPONSE => {
                    write_frame(self.client_mut()?, frame.tag, &frame.payload).await?;
                }
                MSG_READY_FOR_QUERY => {
                    write_frame(self.client_mut()?, frame.tag, &frame.payload).await?;
                    return Ok(());
                }
                MSG_ERROR_RESPONSE => {
                    let detail = parse_error_notice(&frame.payload)
                        .ok()
                        .and_then(|e| e.message().map(str::to_string))
                        .unwrap_or_else(|| "unknown error".to_string());
                    error!(error = %detail, "Backend error during setup");
                    self.send_session_start_error().await.ok();
                    return Err(ProxyError::BackendConnect(detail));
                }
                other => {
                    warn!(tag = %(other as char), "Unexpected message during setup");
                }
            }
        }
    }

    /// Tell the client its session could not be started, without backend detail.
    async fn send_session_start_error(&mut self) -> Result<()> {
        self.send_client_error(SQLSTATE_CONNECTION_FAILURE, "session could not be started")
            .await
    }

    async fn send_client_error(&mut self, code: &str, message: &str) -> Result<()> {
        let error = ErrorNoticeResponse::error("FATAL", code, message);
        write_frame(
            self.client_mut()?,
            MSG_ERROR_RESPONSE,
            &build_error_response(&error),
        )
        .await
    }
}

/// The subtype discriminator of an authentication message payload.
fn auth_subtype(payload: &[u8]) -> Result<u32> {
    if payload.len() < 4 {
        return Err(ProxyError::Protocol("short authentication message".into()));
    }
    Ok(u32::from_be_bytes([
        payload[0], payload[1], payload[2], payload[3],
    ]))
}

//! gatehouse-proxy - standalone auditing database session proxy
//!
//! Runs one time-boxed Postgres session proxy from a YAML configuration:
//! binds the listener, audits every statement, and tears the session down
//! when its duration elapses or on ctrl-c/SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use tokio::signal;
use tracing::{error, info};

use gatehouse_proxy::audit::{AuditSink, FileSink, TracingSink};
use gatehouse_proxy::auth::AuthenticationDetails;
use gatehouse_proxy::config::load_config;
use gatehouse_proxy::server::PostgresProxy;
use gatehouse_proxy::tls::{TlsAcceptor, TlsConnector};
use gatehouse_proxy::Result;

#[derive(Parser)]
#[command(name = "gatehouse-proxy")]
#[command(version)]
#[command(about = "Auditing database session proxy")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Override listen port
    #[arg(long)]
    listen_port: Option<u16>,

    /// Enable verbose/debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(&cli.config)?;
    if let Some(port) = cli.listen_port {
        config.server.listen_port = port;
    }

    // Priority: --verbose flag, then RUST_LOG, then the configured level
    let log_level = if cli.verbose {
        "debug".to_string()
    } else {
        std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone())
    };
    tracing_subscriber::fmt()
        .with_env_filter(log_level.as_str())
        .init();

    info!("Starting gatehouse-proxy v{}", env!("CARGO_PKG_VERSION"));

    let audit: Arc<dyn AuditSink> = match &config.audit.file {
        Some(path) => {
            info!(file = %path.display(), "Audit events appended as JSON Lines");
            Arc::new(FileSink::open(path).await?)
        }
        None => Arc::new(TracingSink),
    };

    let auth = AuthenticationDetails::user_password(
        &config.credentials.username,
        &config.credentials.password,
    );

    let mut proxy = PostgresProxy::new(
        config.target.host.clone(),
        config.target.port,
        config.target.database.clone().unwrap_or_default(),
        auth,
        audit,
        config.session.execution_request_id.clone(),
        config.session.user_id.clone(),
    )
    .with_listen_address(config.server.listen_address.clone())
    .with_connect_timeout(std::time::Duration::from_secs(
        config.server.connect_timeout_secs,
    ));

    if config.server.tls.enabled {
        proxy = proxy.with_tls(TlsAcceptor::from_config(&config.server.tls)?);
    }
    if config.target.tls.enabled {
        proxy = proxy.with_backend_tls(TlsConnector::from_config(&config.target.tls)?);
    }

    let local_addr = proxy
        .start_server(
            config.server.listen_port,
            &config.session.proxy_username,
            &config.session.proxy_password,
            Utc::now(),
            config.session.duration_minutes,
        )
        .await?;

    info!(
        listen_addr = %local_addr,
        target = %format!("{}:{}", config.target.host, config.target.port),
        duration_minutes = config.session.duration_minutes,
        "Session ready"
    );

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = async {
            #[cfg(unix)]
            {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut sigterm) => { sigterm.recv().await; }
                    Err(e) => {
                        error!(error = %e, "Failed to install SIGTERM handler");
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("Received SIGTERM, shutting down");
        }
    }

    proxy.shutdown_server();

    Ok(())
}

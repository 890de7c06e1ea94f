//! Startup orchestration.
//!
//! # Responsibilities
//! - Prepare the store root
//! - Initialize subsystems in dependency order (TLS, metrics)
//! - Bind the listener and begin accepting traffic
//! - Wire OS signals to graceful shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)

use std::net::SocketAddr;
use std::path::PathBuf;

use metrics_exporter_prometheus::BuildError;

use crate::config::ServerConfig;
use crate::http::HttpServer;
use crate::lifecycle::{signals, Shutdown};
use crate::net::listener::ListenerError;
use crate::net::tls::{resolve_acceptor, TlsError};
use crate::net::Listener;
use crate::observability::metrics;

/// Errors that abort startup or serving.
#[derive(Debug)]
pub enum StartupError {
    /// The store root could not be created.
    Storage(PathBuf, std::io::Error),
    /// The certificate pair could not be loaded.
    Tls(TlsError),
    /// The metrics address is malformed.
    MetricsAddress(String),
    /// The metrics exporter failed to install.
    Metrics(BuildError),
    /// The listener could not bind.
    Listener(ListenerError),
    /// The server stopped with an error.
    Serve(std::io::Error),
}

impl std::fmt::Display for StartupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartupError::Storage(path, e) => {
                write!(f, "Failed to create store root {}: {}", path.display(), e)
            }
            StartupError::Tls(e) => write!(f, "TLS setup failed: {}", e),
            StartupError::MetricsAddress(addr) => write!(f, "Invalid metrics address: {}", addr),
            StartupError::Metrics(e) => write!(f, "Metrics setup failed: {}", e),
            StartupError::Listener(e) => write!(f, "{}", e),
            StartupError::Serve(e) => write!(f, "Server error: {}", e),
        }
    }
}

impl std::error::Error for StartupError {}

/// Bring the server up and serve until a termination signal.
pub async fn run(config: ServerConfig) -> Result<(), StartupError> {
    let root = PathBuf::from(&config.storage.root);
    tokio::fs::create_dir_all(&root)
        .await
        .map_err(|e| StartupError::Storage(root.clone(), e))?;
    tracing::info!(root = %root.display(), "Store ready");

    let tls = resolve_acceptor(&config).map_err(StartupError::Tls)?;

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config
            .observability
            .metrics_address
            .parse()
            .map_err(|_| StartupError::MetricsAddress(config.observability.metrics_address.clone()))?;
        metrics::init_metrics(addr).map_err(StartupError::Metrics)?;
    }

    let listener = Listener::bind(&config.listener)
        .await
        .map_err(StartupError::Listener)?;

    let shutdown = Shutdown::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        signals::wait_for_signal().await;
        trigger.trigger();
    });

    HttpServer::new(&config, tls)
        .run(listener, shutdown)
        .await
        .map_err(StartupError::Serve)?;

    tracing::info!("Shutdown complete");
    Ok(())
}

//! HTTP server setup and connection serving.
//!
//! # Responsibilities
//! - Create the Axum router with the entry handler
//! - Wire up middleware (request ID, tracing, timeout, body limit, digest auth)
//! - Accept connections, classify them as HTTP or TLS, serve HTTP/1.1 and HTTP/2
//! - Drain open connections on shutdown
//!
//! # Design Decisions
//! - One task per connection; classification runs inside it so a silent
//!   client never stalls the accept loop
//! - hyper-util's auto builder serves both HTTP versions over the same stream

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Request},
    middleware::from_fn_with_state,
    routing::any,
    Router,
};
use hyper::body::Incoming;
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto,
};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_rustls::TlsAcceptor;
use tower::{Service, ServiceBuilder};
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::auth::{digest_auth_middleware, AclResolver, Authenticator};
use crate::config::ServerConfig;
use crate::http::handlers::entry_handler;
use crate::lifecycle::Shutdown;
use crate::net::connection::{ConnectionId, ConnectionTracker};
use crate::net::listener::ListenerError;
use crate::net::{Dispatcher, Listener};
use crate::observability::metrics;
use crate::store::Entry;

/// Application state injected into middleware and handlers.
#[derive(Clone)]
pub struct AppState {
    /// Root of the entry store.
    pub root: Entry,
    pub authenticator: Arc<Authenticator>,
}

/// The single-port HTTP/HTTPS server.
pub struct HttpServer {
    router: Router,
    dispatcher: Dispatcher,
    tracker: ConnectionTracker,
    drain_timeout: Duration,
}

impl HttpServer {
    /// Create a server for `config`. `tls` enables HTTPS on the same port.
    pub fn new(config: &ServerConfig, tls: Option<TlsAcceptor>) -> Self {
        let authenticator = Authenticator::new(
            AclResolver::new(config.auth.anonymous_domain.clone()),
            Duration::from_secs(config.auth.nonce_validity_secs),
        );
        let state = AppState {
            root: Entry::root(&config.storage.root),
            authenticator: Arc::new(authenticator),
        };

        Self {
            router: Self::build_router(config, state),
            dispatcher: Dispatcher::new(tls),
            tracker: ConnectionTracker::new(),
            drain_timeout: Duration::from_secs(config.timeouts.shutdown_secs),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ServerConfig, state: AppState) -> Router {
        let middleware = ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
            // Timeout needs a `Default` response body, so it sits innermost.
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)));

        Router::new()
            .route("/", any(entry_handler))
            .route("/{*path}", any(entry_handler))
            .layer(from_fn_with_state(state.clone(), digest_auth_middleware))
            .with_state(state)
            .layer(middleware)
    }

    /// The connection tracker, for observing open connections.
    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    /// Accept and serve connections until `shutdown` fires, then drain.
    pub async fn run(self, listener: Listener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            tls = self.dispatcher.tls_enabled(),
            max_connections = listener.max_connections(),
            "HTTP server starting"
        );

        let mut stop = shutdown.subscribe();
        loop {
            tokio::select! {
                _ = stop.recv() => break,
                accepted = listener.accept() => {
                    let (stream, peer, permit) = match accepted {
                        Ok(accepted) => accepted,
                        Err(ListenerError::Closed) => break,
                        Err(e) => {
                            tracing::warn!(error = %e, "Accept failed");
                            continue;
                        }
                    };

                    let guard = self.tracker.track();
                    let dispatcher = self.dispatcher.clone();
                    let router = self.router.clone();
                    let conn_stop = shutdown.subscribe();
                    tokio::spawn(async move {
                        let _permit = permit;
                        serve_connection(stream, peer, guard.id(), dispatcher, router, conn_stop).await;
                        drop(guard);
                    });
                }
            }
        }

        tracing::info!(
            active = self.tracker.active_count(),
            "Stopped accepting, draining connections"
        );
        if !self.tracker.wait_for_drain(self.drain_timeout).await {
            tracing::warn!(
                remaining = self.tracker.active_count(),
                "Drain timeout elapsed with open connections"
            );
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    id: ConnectionId,
    dispatcher: Dispatcher,
    router: Router,
    mut stop: broadcast::Receiver<()>,
) {
    let stream = tokio::select! {
        dispatched = dispatcher.dispatch(stream) => match dispatched {
            Ok(stream) => stream,
            Err(e) => {
                tracing::debug!(connection_id = %id, peer_addr = %peer, error = %e, "Dropping connection");
                return;
            }
        },
        _ = stop.recv() => return,
    };

    let protocol = stream.protocol();
    metrics::record_connection(protocol);
    tracing::debug!(connection_id = %id, peer_addr = %peer, protocol = ?protocol, "Connection accepted");

    let service = hyper::service::service_fn(move |mut request: Request<Incoming>| {
        request.extensions_mut().insert(ConnectInfo(peer));
        router.clone().call(request)
    });

    let builder = auto::Builder::new(TokioExecutor::new());
    let conn = builder.serve_connection_with_upgrades(TokioIo::new(stream), service);
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        _ = stop.recv() => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };

    if let Err(e) = result {
        tracing::debug!(connection_id = %id, peer_addr = %peer, error = %e, "Connection closed with error");
    }
}

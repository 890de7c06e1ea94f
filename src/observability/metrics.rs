//! Metrics collection and exposition.
//!
//! # Metrics
//! - `smartweb_requests_total` (counter): requests by method, status
//! - `smartweb_request_duration_seconds` (histogram): latency distribution
//! - `smartweb_auth_total` (counter): authentication verdicts by outcome
//! - `smartweb_nonce_cache_size` (gauge): nonces awaiting use
//! - `smartweb_connections_total` (counter): accepted connections by protocol
//! - `smartweb_active_connections` (gauge): current connection count
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::net::Protocol;

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, started: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
    ];
    counter!("smartweb_requests_total", &labels).increment(1);
    histogram!("smartweb_request_duration_seconds", &labels)
        .record(started.elapsed().as_secs_f64());
}

pub fn record_auth(authorized: bool) {
    let outcome = if authorized { "authorized" } else { "unauthorized" };
    counter!("smartweb_auth_total", "outcome" => outcome).increment(1);
}

pub fn record_nonce_cache_size(size: usize) {
    gauge!("smartweb_nonce_cache_size").set(size as f64);
}

pub fn record_connection(protocol: Protocol) {
    let protocol = match protocol {
        Protocol::Http => "http",
        Protocol::Tls => "tls",
    };
    counter!("smartweb_connections_total", "protocol" => protocol).increment(1);
}

pub fn record_active_connections(active: u64) {
    gauge!("smartweb_active_connections").set(active as f64);
}

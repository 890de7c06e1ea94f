//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (lifecycle tracking)
//!     → dispatch.rs (sniff first bytes, plaintext or TLS)
//!     → tls.rs (acceptor built from PEM files)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - HTTP and HTTPS share one port, no ALPN or second listener needed

pub mod connection;
pub mod dispatch;
pub mod listener;
pub mod tls;

pub use dispatch::{DispatchedStream, Dispatcher, Protocol};
pub use listener::Listener;

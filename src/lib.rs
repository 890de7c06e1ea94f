//! Smartweb: a single-port HTTP/HTTPS server over a hierarchical entry
//! store, guarded by Digest authentication with inherited ACLs.

pub mod auth;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod store;

pub use config::ServerConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use store::Entry;

//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Classified connection (plaintext or TLS)
//!     → server.rs (hyper auto builder, Axum router, middleware stack)
//!     → auth::middleware (resolve entry, digest auth, challenges)
//!     → handlers.rs (GET/HEAD/PUT/DELETE on the entry)
//!     → response.rs (error mapping, content type guessing)
//!     → Send to client
//! ```

pub mod handlers;
pub mod response;
pub mod server;

pub use server::{AppState, HttpServer};

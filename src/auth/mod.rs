//! Authentication and access control subsystem.
//!
//! # Data Flow
//! ```text
//! Request (Host, path, ?meta=, Authorization)
//!     → middleware.rs (resolve the addressed Entry)
//!     → digest.rs (nonce cache, digest verification, verdict)
//!         → header.rs (parse Authorization values)
//!         → acl.rs (climb ancestors for domains, realms, secrets, rules)
//!     → handler on success, 401 otherwise
//!     → WWW-Authenticate challenges on every response
//! ```
//!
//! # Design Decisions
//! - ACL configuration is ordinary entry metadata, no separate database
//! - Nonces are single use and expire lazily on the next request
//! - Open access only when no rule applies and no domain is declared

pub mod acl;
pub mod digest;
pub mod header;
pub mod middleware;

pub use acl::{AclResolver, AuthDomain, Permission};
pub use digest::{Authenticator, Verdict};
pub use header::{parse_authorization, Credentials, ParseError};
pub use middleware::{digest_auth_middleware, ResolvedEntry};

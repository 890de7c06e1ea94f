//! HTTP Digest authentication (MD5, `qop=auth`).
//!
//! # Responsibilities
//! - Own the nonce cache (single use, lazy expiry on every call)
//! - Verify `Authorization: Digest` responses against stored secrets
//! - Decide the request verdict from ACL permissions
//! - Produce one `WWW-Authenticate` challenge per listed domain

use std::collections::HashMap;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hyper::header::AUTHORIZATION;
use hyper::{HeaderMap, Method};
use md5::{Digest, Md5};
use rand::rngs::OsRng;
use rand::RngCore;
use tokio::sync::Mutex;

use super::acl::AclResolver;
use super::header::{parse_authorization, Credentials};
use crate::observability::metrics;
use crate::store::Entry;

/// Default lifetime of an issued nonce.
pub const DEFAULT_NONCE_VALIDITY: Duration = Duration::from_secs(5 * 60);

const SCHEME: &str = "Digest";

/// A challenge issued to a client.
#[derive(Debug, Clone)]
struct Nonce {
    created: Instant,
    validity: Duration,
    opaque: String,
    domain: String,
    realm: String,
}

impl Nonce {
    fn is_expired(&self, now: Instant) -> bool {
        now > self.created + self.validity
    }
}

/// Result of authenticating one request.
#[derive(Debug, Clone, Default)]
pub struct Verdict {
    pub authorized: bool,
    /// `WWW-Authenticate` header values to send back.
    pub challenges: Vec<String>,
}

/// Digest authenticator shared by all connections.
#[derive(Debug)]
pub struct Authenticator {
    nonces: Mutex<HashMap<String, Nonce>>,
    validity: Duration,
    acl: AclResolver,
}

/// What the candidate loop learned about a request.
#[derive(Debug, Default)]
struct Check {
    authorized: bool,
    found_rule: bool,
    stale: bool,
}

impl Authenticator {
    pub fn new(acl: AclResolver, validity: Duration) -> Self {
        Self {
            nonces: Mutex::new(HashMap::new()),
            validity,
            acl,
        }
    }

    pub fn acl(&self) -> &AclResolver {
        &self.acl
    }

    /// Number of cached nonces.
    pub async fn pending_nonces(&self) -> usize {
        self.nonces.lock().await.len()
    }

    /// Authenticate a request for `entry`, served under the site root `site`.
    ///
    /// `target` is the request target (path and query) the Digest `uri`
    /// parameter must name.
    pub async fn authenticate(
        &self,
        site: &Entry,
        entry: &Entry,
        method: &Method,
        target: &str,
        headers: &HeaderMap,
    ) -> Verdict {
        self.authenticate_at(site, entry, method, target, headers, Instant::now())
            .await
    }

    pub(crate) async fn authenticate_at(
        &self,
        site: &Entry,
        entry: &Entry,
        method: &Method,
        target: &str,
        headers: &HeaderMap,
        now: Instant,
    ) -> Verdict {
        let mut nonces = self.nonces.lock().await;
        nonces.retain(|_, nonce| !nonce.is_expired(now));

        let check = self
            .check_request(&mut nonces, entry, method, target, headers, now)
            .await;

        let (domains, errors) = self.acl.domains(entry).await;
        for err in &errors {
            tracing::warn!(entry = %entry, error = %err, "Failed to list auth domains");
        }

        let mut challenges = Vec::with_capacity(domains.len());
        for name in &domains {
            let domain = self.acl.domain(entry, name).await;
            let (key, opaque) = match (random_key(), random_key()) {
                (Ok(key), Ok(opaque)) => (key, opaque),
                (Err(err), _) | (_, Err(err)) => {
                    tracing::error!(error = %err, "Failed to generate nonce");
                    continue;
                }
            };

            let path = domain
                .scope
                .as_ref()
                .and_then(|scope| scope.url_path_under(site))
                .unwrap_or_else(|| "/".to_string());
            let stale = if check.stale { ", stale=\"true\"" } else { "" };
            challenges.push(format!(
                "Digest realm=\"{}\", domain=\"{}\", nonce=\"{}\", opaque=\"{}\"{}, algorithm=\"MD5\", qop=\"auth\"",
                escape(&domain.realm),
                escape(&path),
                key,
                opaque,
                stale,
            ));

            nonces.insert(
                key,
                Nonce {
                    created: now,
                    validity: self.validity,
                    opaque,
                    domain: domain.name,
                    realm: domain.realm,
                },
            );
        }
        metrics::record_nonce_cache_size(nonces.len());

        let authorized = if check.found_rule {
            check.authorized
        } else {
            domains.is_empty()
        };

        tracing::debug!(
            entry = %entry,
            method = %method,
            authorized,
            found_rule = check.found_rule,
            stale = check.stale,
            challenges = challenges.len(),
            "Authentication decided"
        );

        Verdict {
            authorized,
            challenges,
        }
    }

    async fn check_request(
        &self,
        nonces: &mut HashMap<String, Nonce>,
        entry: &Entry,
        method: &Method,
        target: &str,
        headers: &HeaderMap,
        now: Instant,
    ) -> Check {
        let mut check = Check::default();

        for candidate in candidates(headers) {
            let param = |key| param_or_empty(&candidate, key);

            let Some(nonce) = nonces.remove(param("nonce")) else {
                check.stale = true;
                continue;
            };
            if nonce.is_expired(now) {
                check.stale = true;
                continue;
            }
            if nonce.opaque != param("opaque") {
                tracing::debug!(entry = %entry, "Opaque mismatch");
                continue;
            }
            if param("uri") != target {
                tracing::debug!(entry = %entry, uri = %param("uri"), target = %target, "Digest uri does not name the request target");
                continue;
            }

            let username = param("username");
            let secret = match self
                .acl
                .credentials(entry, &nonce.domain, SCHEME, username)
                .await
            {
                Ok(Some(secret)) => secret,
                Ok(None) => {
                    tracing::info!(entry = %entry, username = %username, "Digest authentication failed: unknown user");
                    continue;
                }
                Err(err) => {
                    tracing::warn!(entry = %entry, error = %err, "Failed to read credentials");
                    continue;
                }
            };

            let ha1 = md5_hex(&[username.as_bytes(), nonce.realm.as_bytes(), &secret]);
            let ha2 = md5_hex(&[method.as_str().as_bytes(), param("uri").as_bytes()]);
            let expected = md5_hex(&[
                ha1.as_bytes(),
                param("nonce").as_bytes(),
                param("nc").as_bytes(),
                param("cnonce").as_bytes(),
                param("qop").as_bytes(),
                ha2.as_bytes(),
            ]);
            if expected != param("response") {
                tracing::info!(entry = %entry, username = %username, "Digest authentication failed: bad response");
                continue;
            }

            match self.acl.permission(entry, &nonce.domain, method.as_str()).await {
                Ok(permission) => {
                    check.found_rule |= permission.is_set();
                    if permission.is_allowed() {
                        check.authorized = true;
                        return check;
                    }
                }
                Err(err) => {
                    tracing::warn!(entry = %entry, domain = %nonce.domain, error = %err, "Failed to read permission");
                    check.found_rule = true;
                }
            }
        }

        let anonymous = self.acl.anonymous_domain();
        match self.acl.permission(entry, anonymous, method.as_str()).await {
            Ok(permission) => {
                check.found_rule |= permission.is_set();
                check.authorized = permission.is_allowed();
            }
            Err(err) => {
                tracing::warn!(entry = %entry, domain = %anonymous, error = %err, "Failed to read permission");
                check.found_rule = true;
            }
        }
        check
    }
}

impl Default for Authenticator {
    fn default() -> Self {
        Self::new(AclResolver::default(), DEFAULT_NONCE_VALIDITY)
    }
}

/// Digest candidates this server can verify.
fn candidates(headers: &HeaderMap) -> Vec<Credentials> {
    let mut out = Vec::new();
    for value in headers.get_all(AUTHORIZATION) {
        let Ok(value) = value.to_str() else {
            tracing::debug!("Ignoring non-ASCII Authorization header");
            continue;
        };
        match parse_authorization(value) {
            Ok(creds) => out.extend(creds),
            Err(err) => tracing::debug!(error = %err, "Ignoring malformed Authorization header"),
        }
    }
    out.retain(|c| {
        c.is_scheme(SCHEME) && c.param("algorithm") == Some("MD5") && c.param("qop") == Some("auth")
    });
    out
}

fn param_or_empty<'a>(creds: &'a Credentials, key: &str) -> &'a str {
    creds.param(key).unwrap_or_default()
}

/// Lowercase hex MD5 of the parts joined with `:`.
pub(crate) fn md5_hex(parts: &[&[u8]]) -> String {
    let mut hasher = Md5::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update(b":");
        }
        hasher.update(part);
    }
    hex::encode(hasher.finalize())
}

fn random_key() -> Result<String, rand::Error> {
    let mut bytes = [0u8; 12];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(STANDARD.encode(bytes))
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

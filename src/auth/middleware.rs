//! Axum middleware gating every request through the authenticator.

use std::time::Instant;

use axum::{
    extract::{Request, State},
    http::{
        header::{HOST, WWW_AUTHENTICATE},
        HeaderMap, HeaderValue, StatusCode, Uri,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use percent_encoding::percent_decode_str;

use super::acl::is_acl_config;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::store::Entry;

/// Query parameter descending into the metadata of the addressed entry.
const META_PARAM: &str = "meta";

/// The entry a request addresses, attached to the request once authorized.
#[derive(Debug, Clone)]
pub struct ResolvedEntry {
    /// Container form of the virtual host root.
    pub site: Entry,
    pub entry: Entry,
}

/// Map `Host` + path + `meta` query parameters onto the store.
pub fn resolve_entry(root: &Entry, headers: &HeaderMap, uri: &Uri) -> ResolvedEntry {
    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| uri.authority().map(|a| a.as_str()))
        .filter(|h| is_valid_host(h));
    let site = match host {
        Some(host) => root.child(&format!("{host}.host/")),
        None => root.child("host/"),
    };

    let path = percent_decode_str(uri.path()).decode_utf8_lossy();
    let mut entry = site.child(&path);

    if let Some(query) = uri.query() {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            if key == META_PARAM {
                entry = entry.parameters().child(&value);
            }
        }
    }

    ResolvedEntry { site, entry }
}

fn is_valid_host(host: &str) -> bool {
    !host.is_empty()
        && !host.starts_with('.')
        && host
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"-.:[]_".contains(&b))
}

/// Authenticate, then run the handler or answer 401. Challenges are
/// attached to the response either way. ACL configuration is never
/// reachable over HTTP (403).
pub async fn digest_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let resolved = resolve_entry(&state.root, request.headers(), request.uri());

    if is_acl_config(&resolved.entry) {
        tracing::warn!(
            method = %method,
            uri = %request.uri(),
            "Refusing access to ACL configuration"
        );
        let response = StatusCode::FORBIDDEN.into_response();
        metrics::record_request(method.as_str(), response.status().as_u16(), started);
        return response;
    }

    let target = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let verdict = state
        .authenticator
        .authenticate(&resolved.site, &resolved.entry, &method, target, request.headers())
        .await;
    metrics::record_auth(verdict.authorized);

    let mut response = if verdict.authorized {
        request.extensions_mut().insert(resolved);
        next.run(request).await
    } else {
        tracing::info!(
            method = %method,
            uri = %request.uri(),
            entry = %resolved.entry,
            "Request unauthorized"
        );
        StatusCode::UNAUTHORIZED.into_response()
    };

    for challenge in verdict.challenges {
        match HeaderValue::from_str(&challenge) {
            Ok(value) => {
                response.headers_mut().append(WWW_AUTHENTICATE, value);
            }
            Err(err) => tracing::warn!(error = %err, "Dropping unencodable challenge"),
        }
    }

    metrics::record_request(method.as_str(), response.status().as_u16(), started);
    response
}

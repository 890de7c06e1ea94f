//! ACL and realm resolution over the entry tree.
//!
//! Configuration lives in the metadata of any entry, under `auth/`:
//! ```text
//! auth/inherit                       keep listing domains above this entry
//! auth/<domain>/realm                challenge realm
//! auth/<domain>/inherit              keep climbing for this domain
//! auth/<domain>/<METHOD>.perm        "allow" grants, anything else denies
//! auth/<domain>/default.perm         fallback for methods without a rule
//! auth/<domain>/<Scheme>.users/<u>   secret of user <u>
//! ```
//! Every lookup climbs `parent(true)` from the requested entry and stops at
//! the first ancestor whose scope exists without an inherit marker.

use std::iter;

use crate::store::path::Step;
use crate::store::{Entry, StoreError};

/// Domain consulted when no credentials authorize a request.
pub const ANONYMOUS_DOMAIN: &str = "anonymous";

/// Existence-only marker that keeps a climb going.
pub const INHERIT: &str = "inherit";

const AUTH: &str = "auth";
const REALM: &str = "realm";

/// Outcome of a permission lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Allow,
    Deny,
    /// No rule anywhere on the climb.
    Unset,
}

impl Permission {
    fn from_rule(raw: &[u8]) -> Self {
        if String::from_utf8_lossy(raw).trim() == "allow" {
            Permission::Allow
        } else {
            Permission::Deny
        }
    }

    pub fn is_allowed(self) -> bool {
        self == Permission::Allow
    }

    pub fn is_set(self) -> bool {
        self != Permission::Unset
    }
}

/// A resolved authentication domain.
#[derive(Debug, Clone)]
pub struct AuthDomain {
    pub name: String,
    pub realm: String,
    /// Entry whose scope ended the climb, if any declared the domain.
    pub scope: Option<Entry>,
}

/// Resolves domains, realms, credentials and permissions for entries.
#[derive(Debug, Clone)]
pub struct AclResolver {
    anonymous_domain: String,
}

impl Default for AclResolver {
    fn default() -> Self {
        Self::new(ANONYMOUS_DOMAIN)
    }
}

impl AclResolver {
    pub fn new(anonymous_domain: impl Into<String>) -> Self {
        Self {
            anonymous_domain: anonymous_domain.into(),
        }
    }

    pub fn anonymous_domain(&self) -> &str {
        &self.anonymous_domain
    }

    /// Domains that can be challenged for `entry`, in discovery order.
    ///
    /// Listing errors are collected and the affected ancestor skipped.
    pub async fn domains(&self, entry: &Entry) -> (Vec<String>, Vec<StoreError>) {
        let mut names: Vec<String> = Vec::new();
        let mut errors = Vec::new();

        for ancestor in ancestors(entry) {
            let auths = ancestor.parameters().child(AUTH);
            match auths.children().await {
                Ok(children) => {
                    for child in children {
                        let name = child.name();
                        if name == self.anonymous_domain || name == INHERIT {
                            continue;
                        }
                        if !names.iter().any(|n| n == name) {
                            names.push(name.to_string());
                        }
                    }
                }
                Err(err) => {
                    errors.push(err);
                    continue;
                }
            }

            if auths.dir_exists().await && !auths.child(INHERIT).exists().await {
                break;
            }
        }

        (names, errors)
    }

    /// Realm and scope of `name` as seen from `entry`.
    ///
    /// The realm is the first non-empty one found on the climb and falls
    /// back to the domain name.
    pub async fn domain(&self, entry: &Entry, name: &str) -> AuthDomain {
        let mut realm: Option<String> = None;
        let mut scope = None;

        for ancestor in ancestors(entry) {
            let auth = scope_of(&ancestor, name);
            if !auth.dir_exists().await {
                continue;
            }
            scope = Some(ancestor);

            if realm.is_none() {
                match auth.child(REALM).read().await {
                    Ok(mut data) => {
                        strip_line_ending(&mut data);
                        if !data.is_empty() {
                            realm = Some(String::from_utf8_lossy(&data).into_owned());
                        }
                    }
                    Err(err) if err.is_not_found() => {}
                    Err(err) => {
                        tracing::warn!(domain = %name, error = %err, "Failed to read realm");
                    }
                }
            }

            if !auth.child(INHERIT).exists().await {
                break;
            }
        }

        AuthDomain {
            name: name.to_string(),
            realm: realm.unwrap_or_else(|| name.to_string()),
            scope,
        }
    }

    /// Stored secret of `username` for `scheme` in `domain`.
    pub async fn credentials(
        &self,
        entry: &Entry,
        domain: &str,
        scheme: &str,
        username: &str,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        if username.is_empty() || username == "." || username == ".." || username.contains('/') {
            return Ok(None);
        }

        for ancestor in ancestors(entry) {
            let auth = scope_of(&ancestor, domain);
            if !auth.dir_exists().await {
                continue;
            }

            let user = auth.child(&format!("{scheme}.users")).child(username);
            match user.read().await {
                Ok(mut data) => {
                    strip_line_ending(&mut data);
                    return Ok(Some(data));
                }
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err),
            }

            if !auth.child(INHERIT).exists().await {
                break;
            }
        }
        Ok(None)
    }

    /// Permission of `method` in `domain`. The nearest ancestor defining a
    /// method rule or a default rule decides.
    pub async fn permission(
        &self,
        entry: &Entry,
        domain: &str,
        method: &str,
    ) -> Result<Permission, StoreError> {
        let rules = [format!("{method}.perm"), "default.perm".to_string()];

        for ancestor in ancestors(entry) {
            let auth = scope_of(&ancestor, domain);

            for rule in &rules {
                match auth.child(rule).read().await {
                    Ok(data) => return Ok(Permission::from_rule(&data)),
                    Err(err) if err.is_not_found() => {}
                    Err(err) => return Err(err),
                }
            }

            if auth.dir_exists().await && !auth.child(INHERIT).exists().await {
                break;
            }
        }
        Ok(Permission::Unset)
    }
}

/// True when `entry` lies inside the `auth` configuration of some entry.
pub fn is_acl_config(entry: &Entry) -> bool {
    entry
        .path()
        .steps()
        .windows(2)
        .any(|pair| matches!(pair, [Step::Meta, Step::Child(name)] if name == AUTH))
}

fn ancestors(entry: &Entry) -> impl Iterator<Item = Entry> {
    iter::successors(Some(entry.clone()), |e| e.parent(true))
}

fn scope_of(entry: &Entry, domain: &str) -> Entry {
    entry.parameters().child(AUTH).child(domain)
}

fn strip_line_ending(data: &mut Vec<u8>) {
    if data.last() == Some(&b'\n') {
        data.pop();
        if data.last() == Some(&b'\r') {
            data.pop();
        }
    }
}

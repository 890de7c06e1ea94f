//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;

use md5::{Digest, Md5};
use smartweb::auth::parse_authorization;
use smartweb::config::ServerConfig;
use smartweb::net::Listener;
use smartweb::{Entry, HttpServer, Shutdown};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

/// A server on an ephemeral port over a throwaway store.
pub struct TestServer {
    pub addr: SocketAddr,
    pub root: TempDir,
    pub shutdown: Shutdown,
    handle: JoinHandle<std::io::Result<()>>,
}

impl TestServer {
    /// The store root as an entry.
    pub fn store(&self) -> Entry {
        Entry::root(self.root.path())
    }

    /// The site root that requests to `127.0.0.1:<port>` resolve under.
    pub fn site(&self) -> Entry {
        self.site_for(&format!("127.0.0.1:{}", self.addr.port()))
    }

    pub fn site_for(&self, host: &str) -> Entry {
        self.store().child(&format!("{host}.host/"))
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Trigger shutdown and wait for the server to drain.
    pub async fn stop(self) {
        self.shutdown.trigger();
        self.handle.await.unwrap().unwrap();
    }
}

/// Start a server with default settings, optionally accepting TLS.
pub async fn start_server(tls: Option<TlsAcceptor>) -> TestServer {
    let root = tempfile::tempdir().unwrap();
    let mut config = ServerConfig::default();
    config.storage.root = root.path().to_string_lossy().into_owned();
    config.timeouts.shutdown_secs = 2;

    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = tcp.local_addr().unwrap();
    let listener = Listener::from_tcp(tcp, 64);

    let shutdown = Shutdown::new();
    let server = HttpServer::new(&config, tls);
    let handle = tokio::spawn(server.run(listener, shutdown.clone()));

    TestServer {
        addr,
        root,
        shutdown,
        handle,
    }
}

/// Protect `site` with the `admin` domain: user `alice` / `secret`,
/// every method allowed once authenticated.
pub async fn protect(site: &Entry) {
    let admin = site.parameters().child("auth/admin");
    admin.child("realm").write(b"Admins").await.unwrap();
    admin.child("Digest.users/alice").write(b"secret\n").await.unwrap();
    admin.child("default.perm").write(b"allow").await.unwrap();
}

fn md5_hex(parts: &[&str]) -> String {
    hex::encode(Md5::digest(parts.join(":").as_bytes()))
}

/// `Authorization` value answering a `WWW-Authenticate` challenge.
pub fn digest_answer(
    challenge: &str,
    method: &str,
    uri: &str,
    username: &str,
    password: &str,
) -> String {
    let c = parse_authorization(challenge).unwrap().remove(0);
    let realm = c.param("realm").unwrap();
    let nonce = c.param("nonce").unwrap();
    let opaque = c.param("opaque").unwrap();
    let (nc, cnonce) = ("00000001", "0a4f113b");

    let ha1 = md5_hex(&[username, realm, password]);
    let ha2 = md5_hex(&[method, uri]);
    let response = md5_hex(&[&ha1, nonce, nc, cnonce, "auth", &ha2]);

    format!(
        "Digest username=\"{username}\", realm=\"{realm}\", nonce=\"{nonce}\", uri=\"{uri}\", \
         algorithm=MD5, qop=auth, nc={nc}, cnonce=\"{cnonce}\", response=\"{response}\", \
         opaque=\"{opaque}\""
    )
}

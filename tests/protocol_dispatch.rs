//! Plaintext HTTP and TLS served on the same port.

use std::net::SocketAddr;

use smartweb::net::tls::load_tls_config;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsAcceptor;

mod common;

struct Certificate {
    pem: String,
    _dir: tempfile::TempDir,
    acceptor: TlsAcceptor,
}

fn localhost_certificate() -> Certificate {
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let cert_path = dir.path().join("cert.pem");
    let key_path = dir.path().join("key.pem");
    std::fs::write(&cert_path, cert.pem()).unwrap();
    std::fs::write(&key_path, key_pair.serialize_pem()).unwrap();

    Certificate {
        pem: cert.pem(),
        acceptor: load_tls_config(&cert_path, &key_path).unwrap(),
        _dir: dir,
    }
}

fn https_client(cert: &Certificate, addr: SocketAddr) -> reqwest::Client {
    reqwest::Client::builder()
        .add_root_certificate(reqwest::Certificate::from_pem(cert.pem.as_bytes()).unwrap())
        .resolve("localhost", addr)
        .build()
        .unwrap()
}

async fn raw_get(addr: SocketAddr, host: &str, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: {host}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

#[tokio::test]
async fn plaintext_and_tls_share_one_port() {
    let cert = localhost_certificate();
    let server = common::start_server(Some(cert.acceptor.clone())).await;
    let port = server.addr.port();

    server
        .site_for("example.org")
        .child("hello.txt")
        .write(b"plain")
        .await
        .unwrap();
    server
        .site_for(&format!("localhost:{port}"))
        .child("hello.txt")
        .write(b"secure")
        .await
        .unwrap();

    let plain = raw_get(server.addr, "example.org", "/hello.txt").await;
    assert!(plain.starts_with("HTTP/1.1 200"), "{plain}");
    assert!(plain.ends_with("plain"));

    let client = https_client(&cert, server.addr);
    let secure = client
        .get(format!("https://localhost:{port}/hello.txt"))
        .send()
        .await
        .unwrap();
    assert_eq!(secure.status(), reqwest::StatusCode::OK);
    assert_eq!(secure.text().await.unwrap(), "secure");

    server.stop().await;
}

#[tokio::test]
async fn tls_is_refused_without_certificate() {
    let cert = localhost_certificate();
    let server = common::start_server(None).await;

    let client = https_client(&cert, server.addr);
    let result = client
        .get(format!("https://localhost:{}/", server.addr.port()))
        .send()
        .await;
    assert!(result.is_err());

    // The plaintext side keeps working.
    let plain = raw_get(server.addr, "example.org", "/missing").await;
    assert!(plain.starts_with("HTTP/1.1 404"), "{plain}");

    server.stop().await;
}

#[tokio::test]
async fn silent_client_does_not_block_others() {
    let server = common::start_server(None).await;
    let _silent = TcpStream::connect(server.addr).await.unwrap();

    let plain = raw_get(server.addr, "example.org", "/").await;
    assert!(plain.starts_with("HTTP/1.1 404"), "{plain}");

    server.stop().await;
}

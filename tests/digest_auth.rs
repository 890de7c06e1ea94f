//! End-to-end Digest authentication and entry handling over HTTP.

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, WWW_AUTHENTICATE};
use reqwest::StatusCode;

mod common;

fn challenge(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(WWW_AUTHENTICATE)
        .expect("challenge header")
        .to_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn unprotected_site_is_open() {
    let server = common::start_server(None).await;
    let client = reqwest::Client::new();

    let put = client
        .put(server.url("/notes/today.txt"))
        .header(CONTENT_TYPE, "text/plain")
        .body("hello")
        .send()
        .await
        .unwrap();
    assert_eq!(put.status(), StatusCode::CREATED);
    assert!(put.headers().get(WWW_AUTHENTICATE).is_none());

    let get = client.get(server.url("/notes/today.txt")).send().await.unwrap();
    assert_eq!(get.status(), StatusCode::OK);
    assert_eq!(get.headers()[CONTENT_TYPE], "text/plain");
    assert_eq!(get.text().await.unwrap(), "hello");

    let replace = client
        .put(server.url("/notes/today.txt"))
        .body("again")
        .send()
        .await
        .unwrap();
    assert_eq!(replace.status(), StatusCode::NO_CONTENT);

    // Stored headers were replaced, so the type is guessed from the name.
    let get = client.get(server.url("/notes/today.txt")).send().await.unwrap();
    assert_eq!(get.headers()[CONTENT_TYPE], "text/plain; charset=utf-8");

    let delete = client.delete(server.url("/notes/")).send().await.unwrap();
    assert_eq!(delete.status(), StatusCode::NO_CONTENT);

    let gone = client.get(server.url("/notes/today.txt")).send().await.unwrap();
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);

    server.stop().await;
}

#[tokio::test]
async fn unsupported_method_is_rejected() {
    let server = common::start_server(None).await;
    let response = reqwest::Client::new()
        .post(server.url("/x"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    server.stop().await;
}

#[tokio::test]
async fn protected_site_challenges_then_admits() {
    let server = common::start_server(None).await;
    common::protect(&server.site()).await;
    server.site().child("page.html").write(b"<p>hi</p>").await.unwrap();
    let client = reqwest::Client::new();

    let denied = client.get(server.url("/page.html")).send().await.unwrap();
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);
    let first = challenge(&denied);
    assert!(first.starts_with("Digest realm=\"Admins\""));
    assert!(first.contains("qop=\"auth\""));

    let answer = common::digest_answer(&first, "GET", "/page.html", "alice", "secret");
    let admitted = client
        .get(server.url("/page.html"))
        .header(AUTHORIZATION, &answer)
        .send()
        .await
        .unwrap();
    assert_eq!(admitted.status(), StatusCode::OK);
    assert!(admitted.headers().get(WWW_AUTHENTICATE).is_some());
    assert_eq!(admitted.headers()[CONTENT_TYPE], "text/html; charset=utf-8");
    assert_eq!(admitted.text().await.unwrap(), "<p>hi</p>");

    // Nonces are single use.
    let replay = client
        .get(server.url("/page.html"))
        .header(AUTHORIZATION, &answer)
        .send()
        .await
        .unwrap();
    assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);
    assert!(challenge(&replay).contains("stale=\"true\""));

    server.stop().await;
}

#[tokio::test]
async fn wrong_password_is_unauthorized() {
    let server = common::start_server(None).await;
    common::protect(&server.site()).await;
    let client = reqwest::Client::new();

    let denied = client.get(server.url("/")).send().await.unwrap();
    let answer = common::digest_answer(&challenge(&denied), "GET", "/", "alice", "guess");
    let response = client
        .get(server.url("/"))
        .header(AUTHORIZATION, answer)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(!challenge(&response).contains("stale"));

    server.stop().await;
}

#[tokio::test]
async fn anonymous_read_with_authenticated_write() {
    let server = common::start_server(None).await;
    let site = server.site();
    common::protect(&site).await;
    site.parameters()
        .child("auth/anonymous/GET.perm")
        .write(b"allow")
        .await
        .unwrap();
    site.child("doc.txt").write(b"public").await.unwrap();
    let client = reqwest::Client::new();

    let read = client.get(server.url("/doc.txt")).send().await.unwrap();
    assert_eq!(read.status(), StatusCode::OK);
    assert_eq!(read.text().await.unwrap(), "public");

    let write = client.put(server.url("/doc.txt")).body("x").send().await.unwrap();
    assert_eq!(write.status(), StatusCode::UNAUTHORIZED);

    let answer = common::digest_answer(&challenge(&write), "PUT", "/doc.txt", "alice", "secret");
    let write = client
        .put(server.url("/doc.txt"))
        .header(AUTHORIZATION, answer)
        .body("private edit")
        .send()
        .await
        .unwrap();
    assert_eq!(write.status(), StatusCode::NO_CONTENT);
    assert_eq!(site.child("doc.txt").read().await.unwrap(), b"private edit");

    server.stop().await;
}

#[tokio::test]
async fn metadata_is_addressed_by_query() {
    let server = common::start_server(None).await;
    let client = reqwest::Client::new();

    let put = client
        .put(server.url("/photo.png?meta=caption"))
        .body("sunset")
        .send()
        .await
        .unwrap();
    assert_eq!(put.status(), StatusCode::CREATED);

    let caption = server.site().child("photo.png").parameters().child("caption");
    assert_eq!(caption.read().await.unwrap(), b"sunset");
    assert!(!server.site().child("photo.png").exists().await);

    server.stop().await;
}

#[tokio::test]
async fn acl_configuration_is_not_reachable_by_query() {
    let server = common::start_server(None).await;
    let site = server.site();
    common::protect(&site).await;
    site.parameters()
        .child("auth/anonymous/GET.perm")
        .write(b"allow")
        .await
        .unwrap();
    site.child("pub/")
        .parameters()
        .child("auth/anonymous/PUT.perm")
        .write(b"allow")
        .await
        .unwrap();
    let client = reqwest::Client::new();

    let read = client
        .get(server.url("/?meta=auth/admin/Digest.users/alice"))
        .send()
        .await
        .unwrap();
    assert_eq!(read.status(), StatusCode::FORBIDDEN);
    assert_ne!(read.text().await.unwrap(), "secret\n");

    let dotted = client
        .get(server.url("/?meta=x/../auth/admin/realm"))
        .send()
        .await
        .unwrap();
    assert_eq!(dotted.status(), StatusCode::FORBIDDEN);

    let write = client
        .put(server.url("/pub/?meta=auth/admin/Digest.users/mallory"))
        .body("pwned")
        .send()
        .await
        .unwrap();
    assert_eq!(write.status(), StatusCode::FORBIDDEN);
    let mallory = site
        .child("pub/")
        .parameters()
        .child("auth/admin/Digest.users/mallory");
    assert!(!mallory.exists().await);

    // Ordinary metadata under the same scope is still writable.
    let caption = client
        .put(server.url("/pub/?meta=caption"))
        .body("hello")
        .send()
        .await
        .unwrap();
    assert_eq!(caption.status(), StatusCode::CREATED);

    server.stop().await;
}

#[tokio::test]
async fn later_valid_credentials_win_over_stale_ones() {
    let server = common::start_server(None).await;
    common::protect(&server.site()).await;
    server.site().child("doc.txt").write(b"data").await.unwrap();
    let client = reqwest::Client::new();

    let denied = client.get(server.url("/doc.txt")).send().await.unwrap();
    let used = common::digest_answer(&challenge(&denied), "GET", "/doc.txt", "alice", "secret");
    let first = client
        .get(server.url("/doc.txt"))
        .header(AUTHORIZATION, &used)
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    // Two headers: the spent answer first, a fresh one second.
    let fresh = common::digest_answer(&challenge(&first), "GET", "/doc.txt", "alice", "secret");
    let response = client
        .get(server.url("/doc.txt"))
        .header(AUTHORIZATION, &used)
        .header(AUTHORIZATION, &fresh)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // One header carrying a bogus candidate and then a valid one.
    let bogus = "Digest username=\"alice\", nonce=\"bogus\", uri=\"/doc.txt\", \
                 algorithm=MD5, qop=auth, response=\"00\"";
    let next = common::digest_answer(&challenge(&response), "GET", "/doc.txt", "alice", "secret");
    let combined = client
        .get(server.url("/doc.txt"))
        .header(AUTHORIZATION, format!("{bogus}, {next}"))
        .send()
        .await
        .unwrap();
    assert_eq!(combined.status(), StatusCode::OK);
    assert_eq!(combined.text().await.unwrap(), "data");

    server.stop().await;
}

#[tokio::test]
async fn answer_for_another_path_is_rejected() {
    let server = common::start_server(None).await;
    common::protect(&server.site()).await;
    server.site().child("secret.txt").write(b"s").await.unwrap();
    let client = reqwest::Client::new();

    let denied = client.get(server.url("/secret.txt")).send().await.unwrap();
    let answer = common::digest_answer(&challenge(&denied), "GET", "/public.txt", "alice", "secret");
    let response = client
        .get(server.url("/secret.txt"))
        .header(AUTHORIZATION, answer)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    server.stop().await;
}

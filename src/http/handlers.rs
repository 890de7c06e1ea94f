//! Entry handler: the HTTP surface of the store.
//!
//! # Responsibilities
//! - GET/HEAD stream an entry's data with its stored headers
//! - PUT replaces an entry's data and records its `Content-Type`
//! - DELETE removes an entry with its metadata and children
//!
//! Stored response headers live under the `headers` metadata child of an
//! entry, one child per header name.

use std::io::SeekFrom;
use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{ConnectInfo, Request},
    http::{
        header::{CONTENT_LENGTH, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, StatusCode,
    },
    response::{IntoResponse, Response},
    Extension,
};
use futures_util::StreamExt;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use crate::auth::ResolvedEntry;
use crate::http::response::{
    content_type_from_bytes, content_type_from_name, HandlerError, SNIFF_LEN,
};
use crate::store::{Entry, StoreError};

/// Metadata child holding stored response headers.
const HEADERS: &str = "headers/";

/// Dispatch on the request method for the entry resolved by the auth layer.
pub async fn entry_handler(
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Extension(resolved): Extension<ResolvedEntry>,
    request: Request,
) -> Result<Response, HandlerError> {
    let entry = resolved.entry;
    tracing::debug!(
        peer_addr = %peer,
        method = %request.method(),
        entry = %entry,
        "Serving entry"
    );

    match *request.method() {
        Method::GET => get_entry(&entry, false).await,
        Method::HEAD => get_entry(&entry, true).await,
        Method::PUT => put_entry(&entry, request).await,
        Method::DELETE => {
            entry.delete_all().await?;
            Ok(StatusCode::NO_CONTENT.into_response())
        }
        _ => Ok(StatusCode::METHOD_NOT_ALLOWED.into_response()),
    }
}

async fn get_entry(entry: &Entry, head_only: bool) -> Result<Response, HandlerError> {
    let mut file = entry.open().await?;
    let len = file
        .metadata()
        .await
        .map_err(|e| StoreError::from_io(entry.data_path(), e))?
        .len();

    let mut response = Response::builder().status(StatusCode::OK);
    let mut has_content_type = false;
    for (name, value) in stored_headers(entry).await {
        has_content_type |= name == CONTENT_TYPE;
        response = response.header(name, value);
    }

    if !has_content_type {
        let mime = match content_type_from_name(entry.name()) {
            Some(mime) => mime,
            None => sniff_content_type(entry, &mut file).await?,
        };
        response = response.header(CONTENT_TYPE, mime.to_string());
    }
    response = response.header(CONTENT_LENGTH, len);

    let body = if head_only {
        Body::empty()
    } else {
        Body::from_stream(ReaderStream::new(file))
    };
    Ok(response.body(body)?)
}

/// Guess from the first bytes, leaving the file positioned at the start.
async fn sniff_content_type(
    entry: &Entry,
    file: &mut tokio::fs::File,
) -> Result<mime::Mime, HandlerError> {
    let io_err = |e: std::io::Error| StoreError::from_io(entry.data_path(), e);

    let mut head = Vec::with_capacity(SNIFF_LEN);
    (&mut *file)
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut head)
        .await
        .map_err(io_err)?;
    file.seek(SeekFrom::Start(0)).await.map_err(io_err)?;
    Ok(content_type_from_bytes(&head))
}

/// Response headers recorded for `entry`. Unreadable or invalid ones are
/// skipped, as is any stored `Content-Length`.
async fn stored_headers(entry: &Entry) -> Vec<(HeaderName, HeaderValue)> {
    let dir = entry.parameters().child(HEADERS);
    let children = match dir.children().await {
        Ok(children) => children,
        Err(e) => {
            tracing::warn!(entry = %entry, error = %e, "Failed to list stored headers");
            return Vec::new();
        }
    };

    let mut headers = Vec::with_capacity(children.len());
    for child in children {
        let Ok(name) = HeaderName::from_bytes(child.name().as_bytes()) else {
            continue;
        };
        if name == CONTENT_LENGTH {
            continue;
        }
        let value = match child.read().await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(header = %name, error = %e, "Failed to read stored header");
                continue;
            }
        };
        if let Ok(value) = HeaderValue::from_bytes(value.trim_ascii()) {
            headers.push((name, value));
        }
    }
    headers
}

async fn put_entry(entry: &Entry, request: Request) -> Result<Response, HandlerError> {
    let existed = entry.exists().await;
    let content_type = request.headers().get(CONTENT_TYPE).cloned();

    let mut writer = entry.create().await?;
    let mut body = request.into_body().into_data_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(HandlerError::Body)?;
        writer.write_all(&chunk).await?;
    }
    writer.commit().await?;

    // Stored headers describe the committed data only.
    let headers = entry.parameters().child(HEADERS);
    headers.delete_all().await?;
    if let Some(content_type) = content_type {
        headers
            .child(CONTENT_TYPE.as_str())
            .write(content_type.as_bytes())
            .await?;
    }

    tracing::info!(entry = %entry, replaced = existed, "Entry stored");
    let status = if existed {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::CREATED
    };
    Ok(status.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;

    fn put(content_type: &str, body: Body) -> Request {
        axum::http::Request::builder()
            .method(Method::PUT)
            .uri("/page")
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .unwrap()
    }

    async fn stored_content_type(entry: &Entry) -> Option<HeaderValue> {
        stored_headers(entry)
            .await
            .into_iter()
            .find(|(name, _)| *name == CONTENT_TYPE)
            .map(|(_, value)| value)
    }

    #[tokio::test]
    async fn put_records_content_type() {
        let dir = tempfile::tempdir().unwrap();
        let entry = Entry::root(dir.path()).child("page");

        let response = put_entry(&entry, put("text/markdown", Body::from("# hi")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(entry.read().await.unwrap(), b"# hi");
        assert_eq!(stored_content_type(&entry).await.unwrap(), "text/markdown");
    }

    #[tokio::test]
    async fn failed_upload_keeps_previous_data_and_headers() {
        let dir = tempfile::tempdir().unwrap();
        let entry = Entry::root(dir.path()).child("page");
        put_entry(&entry, put("text/plain", Body::from("old")))
            .await
            .unwrap();

        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"<html>partial")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ];
        let body = Body::from_stream(futures_util::stream::iter(chunks));
        let result = put_entry(&entry, put("text/html", body)).await;

        assert!(matches!(result, Err(HandlerError::Body(_))));
        assert_eq!(entry.read().await.unwrap(), b"old");
        assert_eq!(stored_content_type(&entry).await.unwrap(), "text/plain");
    }
}

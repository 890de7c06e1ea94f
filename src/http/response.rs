//! Response helpers: error mapping and content type guessing.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use mime::Mime;
use thiserror::Error;

use crate::store::StoreError;

/// Number of leading bytes inspected when guessing a content type.
pub const SNIFF_LEN: usize = 512;

/// Errors surfaced by entry handlers.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to read request body: {0}")]
    Body(axum::Error),

    #[error("failed to build response: {0}")]
    Http(#[from] axum::http::Error),
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        let status = match &self {
            HandlerError::Store(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            HandlerError::Body(_) => StatusCode::BAD_REQUEST,
            HandlerError::Store(_) | HandlerError::Http(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, status = %status, "Request rejected");
        }

        let reason = status.canonical_reason().unwrap_or("Error");
        (status, reason).into_response()
    }
}

/// Content type from the file extension of `name`, if it is a known one.
pub fn content_type_from_name(name: &str) -> Option<Mime> {
    let (_, ext) = name.rsplit_once('.')?;
    let mime = match ext.to_ascii_lowercase().as_str() {
        "html" | "htm" => mime::TEXT_HTML_UTF_8,
        "css" => mime::TEXT_CSS_UTF_8,
        "js" | "mjs" => mime::APPLICATION_JAVASCRIPT_UTF_8,
        "json" => mime::APPLICATION_JSON,
        "txt" => mime::TEXT_PLAIN_UTF_8,
        "xml" => mime::TEXT_XML,
        "csv" => mime::TEXT_CSV_UTF_8,
        "png" => mime::IMAGE_PNG,
        "jpg" | "jpeg" => mime::IMAGE_JPEG,
        "gif" => mime::IMAGE_GIF,
        "svg" => mime::IMAGE_SVG,
        "bmp" => mime::IMAGE_BMP,
        "pdf" => mime::APPLICATION_PDF,
        "woff" => mime::FONT_WOFF,
        "woff2" => mime::FONT_WOFF2,
        _ => return None,
    };
    Some(mime)
}

/// Content type from the leading bytes of a blob.
pub fn content_type_from_bytes(head: &[u8]) -> Mime {
    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n";
    const GIF87: &[u8] = b"GIF87a";
    const GIF89: &[u8] = b"GIF89a";
    const JPEG: &[u8] = b"\xff\xd8\xff";
    const PDF: &[u8] = b"%PDF-";

    if head.starts_with(PNG) {
        return mime::IMAGE_PNG;
    }
    if head.starts_with(GIF87) || head.starts_with(GIF89) {
        return mime::IMAGE_GIF;
    }
    if head.starts_with(JPEG) {
        return mime::IMAGE_JPEG;
    }
    if head.starts_with(PDF) {
        return mime::APPLICATION_PDF;
    }

    let text = match std::str::from_utf8(head) {
        Ok(text) => text,
        // A multi-byte character cut off by the sniff window is still text.
        Err(e) if e.error_len().is_none() => {
            std::str::from_utf8(&head[..e.valid_up_to()]).unwrap_or_default()
        }
        Err(_) => return mime::APPLICATION_OCTET_STREAM,
    };
    if text
        .chars()
        .any(|c| c.is_control() && !matches!(c, '\t' | '\n' | '\r' | '\x0c'))
    {
        return mime::APPLICATION_OCTET_STREAM;
    }

    let lead: String = text
        .trim_start()
        .chars()
        .take(14)
        .collect::<String>()
        .to_ascii_lowercase();
    if lead.starts_with("<!doctype html") || lead.starts_with("<html") {
        mime::TEXT_HTML_UTF_8
    } else {
        mime::TEXT_PLAIN_UTF_8
    }
}

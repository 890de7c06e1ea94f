//! Single-port HTTP/TLS dispatch.
//!
//! The first bytes of every connection are captured and classified: a TLS
//! record starts with a non-printable content type (`0x16` for a handshake)
//! while an HTTP request line is printable ASCII. The captured bytes are
//! replayed to whichever protocol handler takes the connection.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;

/// Upper bound on the bytes captured for classification.
pub const PEEK_LEN: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Http,
    Tls,
}

/// Plaintext iff every byte is printable ASCII or tab, CR, LF.
pub fn classify(prefix: &[u8]) -> Protocol {
    if prefix
        .iter()
        .all(|&b| matches!(b, b'\t' | b'\r' | b'\n') || (0x20..=0x7e).contains(&b))
    {
        Protocol::Http
    } else {
        Protocol::Tls
    }
}

/// Capture the first bytes of `stream`.
///
/// Waits for one byte, then takes whatever else is already buffered without
/// waiting.
pub async fn sniff(stream: &mut TcpStream) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; PEEK_LEN];
    stream.read_exact(&mut buf[..1]).await?;

    let extra = match stream.try_read(&mut buf[1..]) {
        Ok(n) => n,
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => 0,
        Err(e) => return Err(e),
    };
    buf.truncate(1 + extra);
    Ok(buf)
}

/// A stream that yields `prefix` before reading from `inner`.
#[derive(Debug)]
pub struct PrefixedStream<S> {
    prefix: Vec<u8>,
    pos: usize,
    inner: S,
}

impl<S> PrefixedStream<S> {
    pub fn new(prefix: Vec<u8>, inner: S) -> Self {
        Self {
            prefix,
            pos: 0,
            inner,
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for PrefixedStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.pos < this.prefix.len() {
            let rest = &this.prefix[this.pos..];
            let n = rest.len().min(buf.remaining());
            buf.put_slice(&rest[..n]);
            this.pos += n;
            if this.pos == this.prefix.len() {
                this.prefix = Vec::new();
                this.pos = 0;
            }
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for PrefixedStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }
}

/// A classified connection, ready for the HTTP server.
pub enum DispatchedStream {
    Plain(PrefixedStream<TcpStream>),
    Tls(Box<TlsStream<PrefixedStream<TcpStream>>>),
}

impl DispatchedStream {
    pub fn protocol(&self) -> Protocol {
        match self {
            DispatchedStream::Plain(_) => Protocol::Http,
            DispatchedStream::Tls(_) => Protocol::Tls,
        }
    }
}

impl AsyncRead for DispatchedStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            DispatchedStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            DispatchedStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for DispatchedStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            DispatchedStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            DispatchedStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            DispatchedStream::Plain(s) => Pin::new(s).poll_flush(cx),
            DispatchedStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            DispatchedStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            DispatchedStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Error type for dispatch.
#[derive(Debug)]
pub enum DispatchError {
    /// Reading the first bytes failed.
    Sniff(io::Error),
    /// The client speaks TLS but no certificate is configured.
    TlsUnavailable,
    /// The TLS handshake failed.
    Handshake(io::Error),
}

impl std::fmt::Display for DispatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchError::Sniff(e) => write!(f, "Failed to read connection prefix: {}", e),
            DispatchError::TlsUnavailable => write!(f, "TLS client but TLS is not configured"),
            DispatchError::Handshake(e) => write!(f, "TLS handshake failed: {}", e),
        }
    }
}

impl std::error::Error for DispatchError {}

/// Classifies accepted connections and starts TLS where needed.
#[derive(Clone, Default)]
pub struct Dispatcher {
    acceptor: Option<TlsAcceptor>,
}

impl Dispatcher {
    pub fn new(acceptor: Option<TlsAcceptor>) -> Self {
        Self { acceptor }
    }

    pub fn tls_enabled(&self) -> bool {
        self.acceptor.is_some()
    }

    /// Sniff `stream` and hand back a stream that replays what was read.
    pub async fn dispatch(&self, mut stream: TcpStream) -> Result<DispatchedStream, DispatchError> {
        let prefix = sniff(&mut stream).await.map_err(DispatchError::Sniff)?;
        let protocol = classify(&prefix);
        let stream = PrefixedStream::new(prefix, stream);

        match protocol {
            Protocol::Http => Ok(DispatchedStream::Plain(stream)),
            Protocol::Tls => {
                let acceptor = self.acceptor.as_ref().ok_or(DispatchError::TlsUnavailable)?;
                let tls = acceptor
                    .accept(stream)
                    .await
                    .map_err(DispatchError::Handshake)?;
                Ok(DispatchedStream::Tls(Box::new(tls)))
            }
        }
    }
}

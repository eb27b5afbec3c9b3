//! Byte-stream transport over a plain or TLS-secured socket.
//!
//! A [`Transport`] is fixed as plain or secure when it is built. Before any
//! I/O it must be turned into a [`Stream`]: secure transports through
//! [`Transport::handshake`], plain ones through [`Transport::establish`].
//! The stream is then split so that one read and one write can be
//! outstanding at the same time.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf, ReadHalf, WriteHalf};
use tokio_rustls::TlsAcceptor;
use tokio_rustls::server::TlsStream;

use crate::error::{ConnectionError, ConnectionResult};

/// Any socket-like object the transport can run over.
pub trait Io: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> Io for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

pub type BoxedIo = Box<dyn Io>;

enum Kind {
    Plain(BoxedIo),
    Secure { acceptor: TlsAcceptor, io: BoxedIo },
}

/// An accepted socket that has not yet been used for I/O.
pub struct Transport {
    peer: SocketAddr,
    kind: Kind,
}

impl Transport {
    pub fn plain(io: impl Io, peer: SocketAddr) -> Self {
        Self {
            peer,
            kind: Kind::Plain(Box::new(io)),
        }
    }

    pub fn secure(io: impl Io, peer: SocketAddr, acceptor: TlsAcceptor) -> Self {
        Self {
            peer,
            kind: Kind::Secure {
                acceptor,
                io: Box::new(io),
            },
        }
    }

    pub fn remote_address(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_secure(&self) -> bool {
        matches!(self.kind, Kind::Secure { .. })
    }

    /// Runs the server side of the TLS handshake.
    pub async fn handshake(self) -> ConnectionResult<Stream> {
        match self.kind {
            Kind::Secure { acceptor, io } => acceptor
                .accept(io)
                .await
                .map(|tls| Stream::Secure(Box::new(tls)))
                .map_err(ConnectionError::Handshake),
            Kind::Plain(_) => Err(ConnectionError::Config("handshake on a plain transport")),
        }
    }

    /// Makes a plain transport ready for I/O.
    pub fn establish(self) -> ConnectionResult<Stream> {
        match self.kind {
            Kind::Plain(io) => Ok(Stream::Plain(io)),
            Kind::Secure { .. } => Err(ConnectionError::Config(
                "secure transport used before its handshake",
            )),
        }
    }

    /// Handshakes when secure, establishes directly when plain.
    pub async fn open(self) -> ConnectionResult<Stream> {
        if self.is_secure() {
            self.handshake().await
        } else {
            self.establish()
        }
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("peer", &self.peer)
            .field("secure", &self.is_secure())
            .finish()
    }
}

/// A transport ready for reading and writing.
pub enum Stream {
    Plain(BoxedIo),
    Secure(Box<TlsStream<BoxedIo>>),
}

impl Stream {
    pub fn into_split(self) -> (TransportReader, TransportWriter) {
        let (read, write) = tokio::io::split(self);
        (TransportReader { inner: read }, TransportWriter { inner: write })
    }
}

impl AsyncRead for Stream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Plain(io) => Pin::new(io).poll_read(cx, buf),
            Stream::Secure(tls) => Pin::new(tls).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Stream::Plain(io) => Pin::new(io).poll_write(cx, buf),
            Stream::Secure(tls) => Pin::new(tls).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Plain(io) => Pin::new(io).poll_flush(cx),
            Stream::Secure(tls) => Pin::new(tls).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Plain(io) => Pin::new(io).poll_shutdown(cx),
            Stream::Secure(tls) => Pin::new(tls).poll_shutdown(cx),
        }
    }
}

/// Read side of an established stream.
pub struct TransportReader {
    inner: ReadHalf<Stream>,
}

impl TransportReader {
    /// Reads whatever is available, up to `chunk.len()` bytes.
    /// Returns 0 once the peer has closed its side.
    pub async fn read_some(&mut self, chunk: &mut [u8]) -> io::Result<usize> {
        self.inner.read(chunk).await
    }
}

/// Write side of an established stream.
pub struct TransportWriter {
    inner: WriteHalf<Stream>,
}

impl TransportWriter {
    /// Writes the whole buffer and flushes it.
    pub async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write_all(buf).await?;
        self.inner.flush().await?;
        Ok(buf.len())
    }

    /// Half-closes the connection; the peer sees EOF.
    pub async fn shutdown_write(&mut self) -> io::Result<()> {
        self.inner.shutdown().await
    }
}

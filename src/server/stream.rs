//! Network stream abstraction for TCP and TLS connections
//!
//! `NetworkStream` represents either a plain TCP connection or a
//! TLS-encrypted one, so handshake and relay code can work with streams
//! generically without caring about the underlying transport.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream as ClientTlsStream;
use tokio_rustls::server::TlsStream as ServerTlsStream;

/// A network stream that is either plain TCP or TLS-encrypted
///
/// The TLS variants are boxed to reduce the size difference between
/// variants, as a TLS stream is significantly larger than a `TcpStream`.
pub enum NetworkStream {
    /// Plain TCP connection
    Tcp(TcpStream),
    /// TLS-encrypted connection terminated by the proxy (frontend side)
    ServerTls(Box<ServerTlsStream<TcpStream>>),
    /// TLS-encrypted connection opened by the proxy (backend side)
    ClientTls(Box<ClientTlsStream<TcpStream>>),
}

impl NetworkStream {
    /// Wrap a plain TCP stream
    pub fn tcp(stream: TcpStream) -> Self {
        NetworkStream::Tcp(stream)
    }

    /// Check if this stream is TLS-encrypted
    pub fn is_encrypted(&self) -> bool {
        !matches!(self, NetworkStream::Tcp(_))
    }

    /// Get the negotiated TLS protocol version, if encrypted
    pub fn tls_version(&self) -> Option<&'static str> {
        let version = match self {
            NetworkStream::Tcp(_) => return None,
            NetworkStream::ServerTls(tls) => tls.get_ref().1.protocol_version(),
            NetworkStream::ClientTls(tls) => tls.get_ref().1.protocol_version(),
        };
        version.map(|v| match v {
            rustls::ProtocolVersion::TLSv1_2 => "TLSv1.2",
            rustls::ProtocolVersion::TLSv1_3 => "TLSv1.3",
            _ => "TLS (unknown version)",
        })
    }

    /// Extract the TCP stream for a TLS upgrade
    ///
    /// Returns `Err(self)` if the stream is already encrypted.
    pub fn into_tcp(self) -> Result<TcpStream, Self> {
        match self {
            NetworkStream::Tcp(stream) => Ok(stream),
            other => Err(other),
        }
    }
}

impl AsyncRead for NetworkStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            NetworkStream::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            NetworkStream::ServerTls(stream) => Pin::new(stream).poll_read(cx, buf),
            NetworkStream::ClientTls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for NetworkStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            NetworkStream::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            NetworkStream::ServerTls(stream) => Pin::new(stream).poll_write(cx, buf),
            NetworkStream::ClientTls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            NetworkStream::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            NetworkStream::ServerTls(stream) => Pin::new(stream).poll_flush(cx),
            NetworkStream::ClientTls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            NetworkStream::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            NetworkStream::ServerTls(stream) => Pin::new(stream).poll_shutdown(cx),
            NetworkStream::ClientTls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

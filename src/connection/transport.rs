//! Transport abstraction (TCP with optional TLS)

use crate::connection::TlsConfig;
use crate::{Error, Result};
use sha2::Digest;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;

/// Byte stream to the remote endpoint: plain or TLS-encrypted
#[allow(clippy::large_enum_variant)]
pub enum Transport {
    /// Plain TCP connection (possibly tunnelled through a SOCKS5 proxy)
    Plain(TcpStream),
    /// TLS-encrypted TCP connection
    Tls(tokio_rustls::client::TlsStream<TcpStream>),
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Plain(_) => f.write_str("Transport::Plain(TcpStream)"),
            Transport::Tls(_) => f.write_str("Transport::Tls(TlsStream)"),
        }
    }
}

impl Transport {
    /// Whether the transport is TLS-encrypted
    pub fn is_tls(&self) -> bool {
        matches!(self, Transport::Tls(_))
    }

    /// Address of the socket peer (the proxy, when tunnelled)
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        match self {
            Transport::Plain(stream) => stream.peer_addr().ok(),
            Transport::Tls(stream) => stream.get_ref().0.peer_addr().ok(),
        }
    }

    /// Upgrade a plain TCP transport to TLS.
    ///
    /// The peer certificate is verified against `server_name`. When the
    /// handshake fails the raw socket is shut down before the error is
    /// returned, so no half-negotiated socket outlives the attempt.
    pub async fn upgrade_to_tls(self, tls_config: &TlsConfig, server_name: &str) -> Result<Self> {
        let tcp_stream = match self {
            Transport::Plain(stream) => stream,
            Transport::Tls(_) => {
                return Err(Error::Config("transport is already TLS-encrypted".into()))
            }
        };

        let server_name = crate::connection::parse_server_name(server_name)?;
        let connector = tokio_rustls::TlsConnector::from(tls_config.client_config());

        match connector.connect(server_name, tcp_stream).into_fallible().await {
            Ok(tls_stream) => Ok(Transport::Tls(tls_stream)),
            Err((err, mut tcp_stream)) => {
                let _ = tcp_stream.shutdown().await;
                Err(Error::Tls(format!("handshake failed: {}", err)))
            }
        }
    }

    /// SHA-256 of the DER-encoded peer leaf certificate.
    ///
    /// Returns `None` for plain TCP connections.
    pub fn peer_certificate_fingerprint(&self) -> Option<[u8; 32]> {
        match self {
            Transport::Plain(_) => None,
            Transport::Tls(stream) => {
                let (_tcp, conn) = stream.get_ref();
                let certs = conn.peer_certificates()?;
                let leaf = certs.first()?;
                Some(sha2::Sha256::digest(leaf.as_ref()).into())
            }
        }
    }
}

impl AsyncRead for Transport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Transport::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Transport::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Transport::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Transport::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

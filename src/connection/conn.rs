//! Connection handle returned to callers

use super::state::ConnectionState;
use super::transport::Transport;
use crate::{Error, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{watch, Mutex};
use tokio::task::AbortHandle;

/// State shared between a [`Connection`] and its close-watcher
#[derive(Debug)]
pub(crate) struct Shared {
    writer: Mutex<Option<WriteHalf<Transport>>>,
    state: watch::Sender<ConnectionState>,
}

impl Shared {
    /// Move to `next` if the state machine allows it
    pub(crate) fn mark(&self, next: ConnectionState) {
        self.state.send_if_modified(|current| {
            if current.can_transition_to(next) {
                *current = next;
                true
            } else {
                false
            }
        });
    }

    /// Shut down and drop the write half, recording `reason`.
    ///
    /// Closing twice is a no-op.
    pub(crate) async fn close(&self, reason: ConnectionState) -> Result<()> {
        let writer = self.writer.lock().await.take();
        self.mark(reason);

        match writer {
            Some(mut writer) => {
                writer.shutdown().await?;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

/// A live stream to the backend.
///
/// The read side belongs to a background watcher that notices when the
/// server closes the connection; the owner of the handle writes. Once the
/// peer has closed, writes fail with [`Error::ConnectionClosed`].
///
/// Dropping the handle stops the watcher and releases the socket.
#[derive(Debug)]
pub struct Connection {
    shared: Arc<Shared>,
    watcher: Option<AbortHandle>,
    endpoint: String,
    tls: bool,
    peer_addr: Option<SocketAddr>,
    fingerprint: Option<[u8; 32]>,
}

impl Connection {
    /// Split `transport` into a handle (write side) and the read side for the watcher
    pub(crate) fn split(
        transport: Transport,
        endpoint: String,
    ) -> (Self, ReadHalf<Transport>, Arc<Shared>) {
        let tls = transport.is_tls();
        let peer_addr = transport.peer_addr();
        let fingerprint = transport.peer_certificate_fingerprint();

        let (reader, writer) = tokio::io::split(transport);
        let (state, _) = watch::channel(ConnectionState::Open);
        let shared = Arc::new(Shared {
            writer: Mutex::new(Some(writer)),
            state,
        });

        let conn = Self {
            shared: shared.clone(),
            watcher: None,
            endpoint,
            tls,
            peer_addr,
            fingerprint,
        };
        (conn, reader, shared)
    }

    pub(crate) fn attach_watcher(&mut self, handle: AbortHandle) {
        self.watcher = Some(handle);
    }

    /// Write all bytes to the stream
    pub async fn write_all(&self, buf: &[u8]) -> Result<()> {
        let mut writer = self.shared.writer.lock().await;
        let writer = writer.as_mut().ok_or(Error::ConnectionClosed)?;
        writer.write_all(buf).await?;
        Ok(())
    }

    /// Flush the stream
    pub async fn flush(&self) -> Result<()> {
        let mut writer = self.shared.writer.lock().await;
        let writer = writer.as_mut().ok_or(Error::ConnectionClosed)?;
        writer.flush().await?;
        Ok(())
    }

    /// Close the connection from our side and stop watching it.
    ///
    /// Closing an already-closed connection does nothing.
    pub async fn close(&self) -> Result<()> {
        if let Some(watcher) = &self.watcher {
            watcher.abort();
        }
        self.shared.close(ConnectionState::Closed).await
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Whether the connection has been closed by either side
    pub fn is_closed(&self) -> bool {
        self.state().is_closed()
    }

    /// Wait until the connection is closed by either side
    pub async fn closed(&self) {
        let mut rx = self.shared.state.subscribe();
        // The sender lives in `shared`, which we hold, so this cannot fail
        let _ = rx.wait_for(|state| state.is_closed()).await;
    }

    /// `host:port` this connection was made to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Whether the stream is TLS-encrypted
    pub fn is_tls(&self) -> bool {
        self.tls
    }

    /// Address of the socket peer (the proxy, when tunnelled)
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// SHA-256 of the server's leaf certificate, for TLS connections
    pub fn peer_certificate_fingerprint(&self) -> Option<[u8; 32]> {
        self.fingerprint
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(watcher) = &self.watcher {
            watcher.abort();
        }
    }
}

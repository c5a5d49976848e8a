//! Close-watcher: notices when the server closes a handed-out connection

use super::diagnostics::{Diagnostic, DiagnosticSink};
use crate::connection::{Connection, ConnectionState, Shared, Transport};
use crate::metrics::counters;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, ReadHalf};

/// Wrap `transport` in a [`Connection`] and start watching its read side.
pub(crate) fn spawn(
    transport: Transport,
    endpoint: String,
    sink: Arc<dyn DiagnosticSink>,
) -> Connection {
    let (mut conn, reader, shared) = Connection::split(transport, endpoint.clone());
    let handle = tokio::spawn(watch(reader, shared, endpoint, sink));
    conn.attach_watcher(handle.abort_handle());
    conn
}

/// Read one byte at a time until the peer closes or the read fails.
///
/// Bytes the server pushes unprompted are discarded. EOF closes our side so
/// the owner's next write fails instead of hanging. Any other error stops
/// the watch and leaves the stream to the owner.
async fn watch(
    mut reader: ReadHalf<Transport>,
    shared: Arc<Shared>,
    endpoint: String,
    sink: Arc<dyn DiagnosticSink>,
) {
    let mut buf = [0u8; 1];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(_) => continue,
            // TLS peers that drop TCP without close_notify
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => {
                counters::watcher_error();
                sink.emit(&Diagnostic::WatcherFailed {
                    endpoint: &endpoint,
                    error: &e,
                });
                shared.mark(ConnectionState::Broken);
                return;
            }
        }
    }

    counters::peer_closed();
    sink.emit(&Diagnostic::PeerClosed {
        endpoint: &endpoint,
    });
    // Shutdown may fail once the peer is gone; the write half is dropped either way
    let _ = shared.close(ConnectionState::PeerClosed).await;
}

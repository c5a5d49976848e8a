//! Connection manager
//!
//! This module handles:
//! * The acquisition loop (dial, optional TLS, retry with backoff)
//! * Serializing acquisitions per endpoint
//! * Watching handed-out connections for server-side close

mod backoff;
mod config;
mod diagnostics;
mod watcher;

pub use backoff::{BackoffPolicy, DEFAULT_BACKOFF_UNIT, DEFAULT_MAX_BACKOFF};
pub use config::{ManagerConfig, ManagerConfigBuilder, DEFAULT_CONNECT_TIMEOUT};
pub use diagnostics::{Diagnostic, DiagnosticSink, TracingSink};

use crate::connection::{Connection, Dialer, DirectDialer, Socks5Dialer, Transport};
use crate::metrics::counters;
use crate::Result;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::Instrument;

/// Mutable acquisition state, only touched with the manager lock held
#[derive(Debug, Default)]
struct RetryState {
    /// Failed attempts since the last success
    retry_count: u32,
    first_attempt_logged: bool,
}

/// Hands out connections to one remote endpoint.
///
/// Acquisition never fails: it retries with backoff until a connection is
/// established. Concurrent callers are served one at a time, so a down
/// endpoint sees a single stream of attempts rather than one per caller.
pub struct ConnectionManager {
    endpoint: String,
    config: ManagerConfig,
    sink: Arc<dyn DiagnosticSink>,
    state: Mutex<RetryState>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("endpoint", &self.endpoint)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Create a manager reporting diagnostics through `tracing`
    pub fn new(config: ManagerConfig) -> Self {
        Self::with_sink(config, Arc::new(TracingSink))
    }

    /// Create a manager reporting diagnostics to `sink`
    pub fn with_sink(config: ManagerConfig, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            endpoint: config.endpoint(),
            config,
            sink,
            state: Mutex::new(RetryState::default()),
        }
    }

    /// `host:port` connections are made to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Configuration in use
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Failed attempts since the last success.
    ///
    /// Waits for any acquisition in progress to finish.
    pub async fn retry_count(&self) -> u32 {
        self.state.lock().await.retry_count
    }

    /// Get a new connection, waiting as long as it takes.
    ///
    /// Proxy, dial and TLS failures are reported as diagnostics and retried
    /// after [`BackoffPolicy::delay`] of the failure count. Only one
    /// acquisition runs at a time; other callers wait for the lock.
    ///
    /// Dropping the returned future abandons the acquisition.
    pub async fn new_connection(&self) -> Connection {
        let mut state = self.state.lock().await;

        loop {
            if !state.first_attempt_logged {
                self.sink.emit(&Diagnostic::Connecting {
                    endpoint: &self.endpoint,
                    proxy: self.config.socks_proxy(),
                });
                state.first_attempt_logged = true;
            }

            state.retry_count = state.retry_count.saturating_add(1);
            counters::attempt_started();

            let attempt = self
                .attempt()
                .instrument(tracing::debug_span!(
                    "connect",
                    endpoint = %self.endpoint,
                    attempt = state.retry_count
                ))
                .await;

            match attempt {
                Ok(conn) => {
                    let attempts = std::mem::take(&mut state.retry_count);
                    counters::established(conn.is_tls());
                    self.sink.emit(&Diagnostic::Established {
                        endpoint: &self.endpoint,
                        tls: conn.is_tls(),
                        attempts,
                    });
                    return conn;
                }
                Err(err) => {
                    counters::attempt_failed(err.category());
                    self.sink.emit(&Diagnostic::AttemptFailed {
                        endpoint: &self.endpoint,
                        error: &err,
                        retry_count: state.retry_count,
                    });
                    if !err.is_retriable() {
                        tracing::error!(
                            endpoint = %self.endpoint,
                            error = %err,
                            "configuration error, retrying will not clear it"
                        );
                    }

                    let delay = self.config.backoff.delay(state.retry_count);
                    self.sink.emit(&Diagnostic::BackingOff {
                        delay,
                        retry_count: state.retry_count,
                    });
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Like [`new_connection`](Self::new_connection), but gives up when
    /// `shutdown` completes first.
    ///
    /// Returns `None` if the acquisition was abandoned. The retry count keeps
    /// the failures seen so far.
    pub async fn new_connection_until<F>(&self, shutdown: F) -> Option<Connection>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            conn = self.new_connection() => Some(conn),
            _ = shutdown => {
                tracing::debug!(endpoint = %self.endpoint, "connection acquisition abandoned");
                None
            }
        }
    }

    /// Close a connection from our side
    pub async fn close_connection(&self, conn: &Connection) {
        if let Err(e) = conn.close().await {
            tracing::debug!(endpoint = %conn.endpoint(), error = %e, "error while closing connection");
        }
    }

    /// One dial + optional TLS upgrade
    async fn attempt(&self) -> Result<Connection> {
        let dialer = self.dialer()?;
        let stream = dialer
            .dial(&self.config.server_name, self.config.server_port)
            .await?;

        let transport = match &self.config.tls {
            Some(tls) => {
                Transport::Plain(stream)
                    .upgrade_to_tls(tls, &self.config.server_name)
                    .await?
            }
            None => Transport::Plain(stream),
        };

        if let Some(fingerprint) = transport.peer_certificate_fingerprint() {
            tracing::debug!(
                endpoint = %self.endpoint,
                fingerprint = %hex::encode(fingerprint),
                "tls handshake complete"
            );
        }

        Ok(watcher::spawn(
            transport,
            self.endpoint.clone(),
            self.sink.clone(),
        ))
    }

    /// Dialer for this attempt; a bad proxy address fails the attempt
    fn dialer(&self) -> Result<Arc<dyn Dialer>> {
        if let Some(dialer) = &self.config.dialer {
            return Ok(dialer.clone());
        }

        let timeout = self.config.connect_timeout;
        match &self.config.socks_proxy {
            Some(proxy) => Ok(Arc::new(Socks5Dialer::new(proxy, timeout)?)),
            None => Ok(Arc::new(DirectDialer::new(timeout))),
        }
    }
}

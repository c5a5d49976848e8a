//! Diagnostic events and where they go

use crate::Error;
use std::fmt;
use std::io;
use std::time::Duration;
use tracing::Level;

/// Something worth telling the operator about
#[derive(Debug)]
pub enum Diagnostic<'a> {
    /// First acquisition attempt of a manager
    Connecting {
        /// Target `host:port`
        endpoint: &'a str,
        /// SOCKS5 proxy in use, if any
        proxy: Option<&'a str>,
    },
    /// An attempt failed at proxy setup, dial, or TLS handshake
    AttemptFailed {
        /// Target `host:port`
        endpoint: &'a str,
        /// What went wrong
        error: &'a Error,
        /// Consecutive failures so far, this one included
        retry_count: u32,
    },
    /// Sleeping before the next attempt
    BackingOff {
        /// Sleep length
        delay: Duration,
        /// Consecutive failures so far
        retry_count: u32,
    },
    /// A connection was handed out
    Established {
        /// Target `host:port`
        endpoint: &'a str,
        /// Whether TLS is in use
        tls: bool,
        /// Attempts it took, the successful one included
        attempts: u32,
    },
    /// The peer closed a handed-out connection
    PeerClosed {
        /// Target `host:port`
        endpoint: &'a str,
    },
    /// The close-watcher hit a read error and stopped
    WatcherFailed {
        /// Target `host:port`
        endpoint: &'a str,
        /// Read error
        error: &'a io::Error,
    },
}

impl Diagnostic<'_> {
    /// Severity of the event
    pub fn level(&self) -> Level {
        match self {
            Diagnostic::Connecting { .. } => Level::INFO,
            Diagnostic::AttemptFailed { .. } | Diagnostic::WatcherFailed { .. } => Level::WARN,
            Diagnostic::BackingOff { .. }
            | Diagnostic::Established { .. }
            | Diagnostic::PeerClosed { .. } => Level::DEBUG,
        }
    }
}

impl fmt::Display for Diagnostic<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::Connecting {
                endpoint,
                proxy: Some(proxy),
            } => write!(f, "connecting to the backend: {} via socks5://{}", endpoint, proxy),
            Diagnostic::Connecting {
                endpoint,
                proxy: None,
            } => write!(f, "connecting to the backend: {}", endpoint),
            Diagnostic::AttemptFailed { endpoint, error, .. } => {
                write!(f, "connection to {} failed: {}", endpoint, error)
            }
            Diagnostic::BackingOff { delay, .. } => {
                write!(f, "retrying in {:?}", delay)
            }
            Diagnostic::Established { endpoint, tls, .. } => {
                let transport = if *tls { "tls" } else { "tcp" };
                write!(f, "connected to {} over {}", endpoint, transport)
            }
            Diagnostic::PeerClosed { endpoint } => {
                write!(f, "connection to {} closed by server", endpoint)
            }
            Diagnostic::WatcherFailed { endpoint, error } => {
                write!(f, "stopped watching connection to {}: {}", endpoint, error)
            }
        }
    }
}

/// The "emit diagnostic" capability consumed by the manager
pub trait DiagnosticSink: Send + Sync {
    /// Record one event
    fn emit(&self, diagnostic: &Diagnostic<'_>);
}

/// Sends diagnostics to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn emit(&self, diagnostic: &Diagnostic<'_>) {
        match diagnostic {
            Diagnostic::Connecting { endpoint, proxy } => {
                tracing::info!(endpoint, proxy, "{}", diagnostic);
            }
            Diagnostic::AttemptFailed {
                endpoint,
                error,
                retry_count,
            } => {
                tracing::warn!(
                    endpoint,
                    retry_count,
                    stage = error.category(),
                    "{}",
                    diagnostic
                );
            }
            Diagnostic::BackingOff { delay, retry_count } => {
                tracing::debug!(delay_ms = delay.as_millis() as u64, retry_count, "{}", diagnostic);
            }
            Diagnostic::Established {
                endpoint,
                tls,
                attempts,
            } => {
                tracing::debug!(endpoint, tls, attempts, "{}", diagnostic);
            }
            Diagnostic::PeerClosed { endpoint } => {
                tracing::debug!(endpoint, "{}", diagnostic);
            }
            Diagnostic::WatcherFailed { endpoint, error } => {
                tracing::warn!(endpoint, error = %error, "{}", diagnostic);
            }
        }
    }
}

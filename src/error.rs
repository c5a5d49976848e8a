//! Error types

use std::io;
use thiserror::Error;

/// Errors raised while establishing or using a connection
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error on an established stream
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// SOCKS5 proxy setup or negotiation failed
    #[error("socks5 proxy error: {0}")]
    Proxy(String),

    /// TCP dial failed (DNS, refused, unreachable)
    #[error("dial {target} failed: {source}")]
    Dial {
        /// Address being dialed
        target: String,
        /// Underlying cause
        #[source]
        source: io::Error,
    },

    /// TLS setup or handshake failed
    #[error("tls error: {0}")]
    Tls(String),

    /// Operation did not complete in time
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// What was being attempted
        operation: &'static str,
        /// Configured limit
        after: std::time::Duration,
    },

    /// The connection has been closed, locally or by the peer
    #[error("connection closed")]
    ConnectionClosed,
}

impl Error {
    /// Short label for diagnostics and metrics
    pub fn category(&self) -> &'static str {
        match self {
            Error::Io(_) => "io",
            Error::Config(_) => "config",
            Error::Proxy(_) => "proxy",
            Error::Dial { .. } => "dial",
            Error::Tls(_) => "tls",
            Error::Timeout { .. } => "timeout",
            Error::ConnectionClosed => "closed",
        }
    }

    /// Whether a fresh acquisition attempt could succeed after this error.
    ///
    /// Configuration errors are permanent; everything network-related is not.
    pub fn is_retriable(&self) -> bool {
        !matches!(self, Error::Config(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

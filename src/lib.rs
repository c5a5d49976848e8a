//! intake-connect: resilient outbound connections
//!
//! A [`ConnectionManager`] hands out live streams to one remote endpoint.
//! Each acquisition dials directly or through a SOCKS5 proxy, optionally
//! upgrades to TLS, and retries with a bounded linear backoff until it
//! succeeds. Every returned [`Connection`] is watched in the background so
//! that a server-side close becomes visible to the owner of the handle.
//!
//! ```no_run
//! # async fn example() -> intake_connect::Result<()> {
//! use intake_connect::{ConnectionManager, ManagerConfig};
//!
//! let config = ManagerConfig::builder("intake.example.com", 10516)
//!     .socks_proxy("127.0.0.1:1080")
//!     .build()?;
//! let manager = ConnectionManager::new(config);
//!
//! let conn = manager.new_connection().await;
//! conn.write_all(b"payload\n").await?;
//! manager.close_connection(&conn).await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod connection;
pub mod error;
pub mod manager;
pub mod metrics;

pub use connection::{Connection, ConnectionState, TlsConfig};
pub use error::{Error, Result};
pub use manager::{
    BackoffPolicy, ConnectionManager, Diagnostic, DiagnosticSink, ManagerConfig,
    ManagerConfigBuilder, TracingSink,
};

//! Connection building blocks
//!
//! This module handles:
//! * Dialing the target directly or through a SOCKS5 proxy
//! * TLS configuration and the client handshake
//! * The handle handed to callers and its lifecycle

mod conn;
mod dialer;
pub mod socks5;
mod state;
mod tls;
mod transport;

pub(crate) use conn::Shared;
pub use conn::Connection;
pub(crate) use dialer::{join_host_port, normalize_proxy_address};
pub use dialer::{Dialer, DirectDialer, Socks5Dialer};
pub use state::ConnectionState;
pub use tls::{parse_server_name, TlsConfig, TlsConfigBuilder};
pub use transport::Transport;

//! Dialers: how a raw TCP stream to the target is obtained

use super::socks5;
use crate::{Error, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;

/// Opens a TCP stream that reaches `host:port`
#[async_trait]
pub trait Dialer: Send + Sync + std::fmt::Debug {
    /// Dial the target
    async fn dial(&self, host: &str, port: u16) -> Result<TcpStream>;
}

async fn connect_with_timeout(addr: &str, timeout: Duration) -> Result<TcpStream> {
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(source)) => Err(Error::Dial {
            target: addr.to_string(),
            source,
        }),
        Err(_) => Err(Error::Timeout {
            operation: "dial",
            after: timeout,
        }),
    }
}

/// Direct TCP dial with a connect timeout
#[derive(Debug, Clone)]
pub struct DirectDialer {
    timeout: Duration,
}

impl DirectDialer {
    /// Create a dialer giving up after `timeout`
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Dialer for DirectDialer {
    async fn dial(&self, host: &str, port: u16) -> Result<TcpStream> {
        connect_with_timeout(&join_host_port(host, port), self.timeout).await
    }
}

/// Dial through a SOCKS5 proxy without proxy authentication
#[derive(Debug, Clone)]
pub struct Socks5Dialer {
    proxy: String,
    timeout: Duration,
}

impl Socks5Dialer {
    /// Create a dialer for the proxy at `proxy` (`host:port`, optionally
    /// prefixed with `socks5://`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Proxy`] if the address is not `host:port`.
    pub fn new(proxy: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            proxy: normalize_proxy_address(proxy)?,
            timeout,
        })
    }

    /// Proxy address being used
    pub fn proxy(&self) -> &str {
        &self.proxy
    }
}

#[async_trait]
impl Dialer for Socks5Dialer {
    async fn dial(&self, host: &str, port: u16) -> Result<TcpStream> {
        let mut stream = connect_with_timeout(&self.proxy, self.timeout).await?;

        match tokio::time::timeout(self.timeout, socks5::connect(&mut stream, host, port)).await {
            Ok(Ok(())) => Ok(stream),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::Timeout {
                operation: "socks5 handshake",
                after: self.timeout,
            }),
        }
    }
}

/// Strip an optional `socks5://` scheme and check for `host:port`
pub(crate) fn normalize_proxy_address(proxy: &str) -> Result<String> {
    let addr = proxy.trim();
    let addr = addr.strip_prefix("socks5://").unwrap_or(addr);

    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| Error::Proxy(format!("proxy address '{}' is not host:port", proxy)))?;
    let host = match host.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
        Some(bracketed) => bracketed,
        None if host.contains(':') => {
            return Err(Error::Proxy(format!(
                "proxy address '{}' has an unbracketed IPv6 host",
                proxy
            )))
        }
        None => host,
    };
    if host.is_empty() {
        return Err(Error::Proxy(format!("proxy address '{}' has no host", proxy)));
    }
    port.parse::<u16>()
        .map_err(|_| Error::Proxy(format!("proxy address '{}' has an invalid port", proxy)))?;

    Ok(addr.to_string())
}

/// `host:port`, bracketing IPv6 literals
pub(crate) fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

//! Manager configuration

use super::backoff::BackoffPolicy;
use crate::connection::{join_host_port, parse_server_name, Dialer, TlsConfig};
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;

/// Default TCP connect timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

/// Configuration of a [`ConnectionManager`](super::ConnectionManager).
///
/// Use [`ManagerConfig::builder`] to create one.
#[derive(Clone)]
pub struct ManagerConfig {
    pub(crate) server_name: String,
    pub(crate) server_port: u16,
    pub(crate) insecure: bool,
    pub(crate) socks_proxy: Option<String>,
    pub(crate) connect_timeout: Duration,
    pub(crate) backoff: BackoffPolicy,
    /// Present exactly when TLS is enabled
    pub(crate) tls: Option<TlsConfig>,
    pub(crate) dialer: Option<Arc<dyn Dialer>>,
}

impl ManagerConfig {
    /// Start configuring a manager for `server_name:server_port`
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let config = ManagerConfig::builder("intake.example.com", 10516)
    ///     .socks_proxy("127.0.0.1:1080")
    ///     .build()?;
    /// ```
    pub fn builder(server_name: impl Into<String>, server_port: u16) -> ManagerConfigBuilder {
        ManagerConfigBuilder {
            server_name: server_name.into(),
            server_port,
            insecure: false,
            socks_proxy: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            backoff: BackoffPolicy::default(),
            tls: None,
            dialer: None,
        }
    }

    /// `host:port` being connected to
    pub fn endpoint(&self) -> String {
        join_host_port(&self.server_name, self.server_port)
    }

    /// TLS verification name
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Port being connected to
    pub fn server_port(&self) -> u16 {
        self.server_port
    }

    /// Whether TLS is disabled
    pub fn insecure(&self) -> bool {
        self.insecure
    }

    /// SOCKS5 proxy address, if one is configured
    pub fn socks_proxy(&self) -> Option<&str> {
        self.socks_proxy.as_deref()
    }

    /// TCP connect timeout
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Backoff between attempts
    pub fn backoff(&self) -> BackoffPolicy {
        self.backoff
    }
}

impl std::fmt::Debug for ManagerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagerConfig")
            .field("server_name", &self.server_name)
            .field("server_port", &self.server_port)
            .field("insecure", &self.insecure)
            .field("socks_proxy", &self.socks_proxy)
            .field("connect_timeout", &self.connect_timeout)
            .field("backoff", &self.backoff)
            .field("tls", &self.tls)
            .field("dialer", &self.dialer)
            .finish()
    }
}

/// Builder for [`ManagerConfig`]
#[derive(Clone)]
pub struct ManagerConfigBuilder {
    server_name: String,
    server_port: u16,
    insecure: bool,
    socks_proxy: Option<String>,
    connect_timeout: Duration,
    backoff: BackoffPolicy,
    tls: Option<TlsConfig>,
    dialer: Option<Arc<dyn Dialer>>,
}

impl ManagerConfigBuilder {
    /// Disable TLS entirely (local/dev use)
    ///
    /// Default: false
    pub fn insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    /// Route dials through the SOCKS5 proxy at `proxy` (`host:port`).
    ///
    /// An empty string means dial directly.
    pub fn socks_proxy(mut self, proxy: impl Into<String>) -> Self {
        let proxy = proxy.into();
        self.socks_proxy = if proxy.trim().is_empty() {
            None
        } else {
            Some(proxy)
        };
        self
    }

    /// Set the TCP connect timeout
    ///
    /// Default: 20 seconds
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the backoff policy
    ///
    /// Default: 2 seconds per retry, capped at 30 seconds
    pub fn backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Use a specific TLS configuration instead of the system roots
    pub fn tls_config(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Replace the built-in direct/SOCKS5 dialing.
    ///
    /// When set, the proxy address is only reported in diagnostics.
    pub fn dialer(mut self, dialer: Arc<dyn Dialer>) -> Self {
        self.dialer = Some(dialer);
        self
    }

    /// Validate and build the configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the server name is empty or not usable for
    /// TLS, or if the system root certificates cannot be loaded, and
    /// [`Error::Proxy`] if the proxy address is not `host:port`.
    pub fn build(self) -> Result<ManagerConfig> {
        if self.server_name.trim().is_empty() {
            return Err(Error::Config("server name must not be empty".into()));
        }

        let tls = if self.insecure {
            None
        } else {
            parse_server_name(&self.server_name)?;
            match self.tls {
                Some(tls) => Some(tls),
                None => Some(TlsConfig::builder().build()?),
            }
        };

        let socks_proxy = self
            .socks_proxy
            .as_deref()
            .map(crate::connection::normalize_proxy_address)
            .transpose()?;

        Ok(ManagerConfig {
            server_name: self.server_name,
            server_port: self.server_port,
            insecure: self.insecure,
            socks_proxy,
            connect_timeout: self.connect_timeout,
            backoff: self.backoff,
            tls,
            dialer: self.dialer,
        })
    }
}

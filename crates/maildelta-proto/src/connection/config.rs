//! Connection configuration types.

use std::time::Duration;

use crate::types::Protocol;

/// Connection security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Security {
    /// No encryption. **Not recommended outside tests.**
    None,
    /// TLS from the start.
    #[default]
    Implicit,
}

impl Security {
    /// Returns true if the socket is wrapped in TLS.
    #[must_use]
    pub const fn is_tls(self) -> bool {
        matches!(self, Self::Implicit)
    }
}

/// Parameters for opening one mail connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Security mode.
    pub security: Security,
    /// Protocol spoken on the socket.
    pub protocol: Protocol,
    /// Limit for TCP connect plus TLS handshake.
    pub connect_timeout: Duration,
}

impl ConnectionConfig {
    /// Creates a configuration with implicit TLS on the protocol's default port.
    #[must_use]
    pub fn new(host: impl Into<String>, protocol: Protocol) -> Self {
        ConfigBuilder::new(host, protocol).build()
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder(host: impl Into<String>, protocol: Protocol) -> ConfigBuilder {
        ConfigBuilder::new(host, protocol)
    }
}

/// Builder for [`ConnectionConfig`].
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    host: String,
    port: Option<u16>,
    security: Security,
    protocol: Protocol,
    connect_timeout: Duration,
}

impl ConfigBuilder {
    /// Creates a new builder with the given hostname.
    #[must_use]
    pub fn new(host: impl Into<String>, protocol: Protocol) -> Self {
        Self {
            host: host.into(),
            port: None,
            security: Security::Implicit,
            protocol,
            connect_timeout: Duration::from_secs(30),
        }
    }

    /// Sets the port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the security mode.
    #[must_use]
    pub const fn security(mut self, security: Security) -> Self {
        self.security = security;
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> ConnectionConfig {
        ConnectionConfig {
            host: self.host,
            port: self
                .port
                .unwrap_or_else(|| self.protocol.default_port(self.security.is_tls())),
            security: self.security,
            protocol: self.protocol,
            connect_timeout: self.connect_timeout,
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_config_new() {
        let config = ConnectionConfig::new("imap.example.com", Protocol::Imap);
        assert_eq!(config.host, "imap.example.com");
        assert_eq!(config.port, 993);
        assert_eq!(config.security, Security::Implicit);
    }

    #[test]
    fn test_config_builder() {
        let config = ConnectionConfig::builder("pop.example.com", Protocol::Pop3)
            .port(1995)
            .connect_timeout(Duration::from_secs(10))
            .build();

        assert_eq!(config.port, 1995);
        assert_eq!(config.protocol, Protocol::Pop3);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_config_builder_default_port() {
        let plain_pop = ConnectionConfig::builder("pop.example.com", Protocol::Pop3)
            .security(Security::None)
            .build();
        assert_eq!(plain_pop.port, 110);

        let tls_pop = ConnectionConfig::new("pop.example.com", Protocol::Pop3);
        assert_eq!(tls_pop.port, 995);

        let plain_imap = ConnectionConfig::builder("imap.example.com", Protocol::Imap)
            .security(Security::None)
            .build();
        assert_eq!(plain_imap.port, 143);
    }
}

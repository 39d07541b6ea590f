//! Server configuration.

use std::net::{IpAddr, SocketAddr};

use s4_settings::RelaySettings;

use crate::error::ServerError;
use crate::relay::RelayConfig;

/// Configuration for the relay server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` for auto-assign).
    pub port: u16,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Relay engine tuning.
    pub relay: RelayConfig,
}

impl ServerConfig {
    /// Derive from loaded settings.
    pub fn from_settings(settings: &RelaySettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            max_message_size: settings.server.max_message_size,
            relay: RelayConfig::from(settings),
        }
    }

    /// Parsed bind address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ServerError> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|_| ServerError::InvalidAddress(format!("{}:{}", self.host, self.port)))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_message_size: 1024 * 1024,
            relay: RelayConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::time::Duration;

    #[test]
    fn default_binds_loopback_ephemeral() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.bind_addr().unwrap(), "127.0.0.1:0".parse().unwrap());
    }

    #[test]
    fn from_settings_copies_values() {
        let mut settings = RelaySettings::default();
        settings.server.port = 4100;
        settings.relay.heartbeat_interval_ms = 500;
        let cfg = ServerConfig::from_settings(&settings);
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 4100);
        assert_eq!(cfg.relay.heartbeat_interval, Duration::from_millis(500));
    }

    #[test]
    fn hostname_is_rejected() {
        let cfg = ServerConfig {
            host: "localhost".into(),
            ..ServerConfig::default()
        };
        assert_matches!(cfg.bind_addr(), Err(ServerError::InvalidAddress(_)));
    }

    #[test]
    fn ipv6_host_is_accepted() {
        let cfg = ServerConfig {
            host: "::1".into(),
            port: 9000,
            ..ServerConfig::default()
        };
        assert_eq!(cfg.bind_addr().unwrap().port(), 9000);
    }
}

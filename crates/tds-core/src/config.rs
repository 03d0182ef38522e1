//! Pipeline configuration knobs.

use std::time::Duration;

use tds_protocol::packet::DEFAULT_PACKET_SIZE;
use tds_tls::TlsConfig;

const MIN_PACKET_SIZE: usize = 512;
const MAX_PACKET_SIZE: usize = 32767;

/// Configuration consumed by the connection pipeline itself.
///
/// This is narrower than an upper layer's connection-string-level config:
/// it only carries the knobs the packet codec, TLS bridge, and dispatcher
/// need directly.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Maximum packet size the codec will accept or emit.
    pub max_packet_size: usize,
    /// TLS configuration. `None` means "no TLS configured"; if the server
    /// requests encryption and this is absent, the handshake fails with
    /// [`crate::CoreError::Protocol`].
    pub tls: Option<TlsConfig>,
    /// Timeout for establishing the initial TCP connection (enforced by
    /// the caller that owns the socket, not this crate).
    pub connect_timeout: Duration,
    /// Timeout for completing the TLS handshake once started.
    pub handshake_timeout: Duration,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            max_packet_size: DEFAULT_PACKET_SIZE,
            tls: None,
            connect_timeout: Duration::from_secs(15),
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

impl CoreConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum packet size, clamped to the negotiable TDS range
    /// (512-32767 bytes).
    #[must_use]
    pub fn with_max_packet_size(mut self, size: usize) -> Self {
        self.max_packet_size = size.clamp(MIN_PACKET_SIZE, MAX_PACKET_SIZE);
        self
    }

    /// Set the TLS configuration.
    #[must_use]
    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Set the TCP connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the TLS handshake timeout.
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_packet_size_is_tds_default() {
        let config = CoreConfig::default();
        assert_eq!(config.max_packet_size, DEFAULT_PACKET_SIZE);
        assert!(config.tls.is_none());
    }

    #[test]
    fn max_packet_size_clamps_to_negotiable_range() {
        let config = CoreConfig::new().with_max_packet_size(100);
        assert_eq!(config.max_packet_size, MIN_PACKET_SIZE);

        let config = CoreConfig::new().with_max_packet_size(100_000);
        assert_eq!(config.max_packet_size, MAX_PACKET_SIZE);
    }
}

//! Error taxonomy for the connection pipeline.

use std::sync::Arc;

use thiserror::Error;

/// Stable error kinds surfaced by the connection pipeline.
///
/// Variant names are part of the public contract that tests and upper
/// layers key off of; do not rename without updating callers.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// A malformed frame, illegal state transition, or invalid configuration.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The connection closed while requests were still in flight.
    #[error("connection closed")]
    ConnectionClosed,

    /// The TLS engine rejected the handshake or a record.
    #[error("TLS failure: {0}")]
    Tls(#[from] Arc<tds_tls::TlsError>),

    /// An I/O failure on the underlying transport.
    #[error("transport error: {0}")]
    Transport(#[from] Arc<std::io::Error>),
}

impl CoreError {
    /// Build a [`CoreError::Protocol`] from a displayable cause.
    pub fn protocol(detail: impl Into<String>) -> Self {
        Self::Protocol(detail.into())
    }

    /// Whether this error is fatal for the connection (all variants are,
    /// but this method documents the policy from the error handling design
    /// rather than leaving it implicit at call sites).
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        true
    }
}

impl From<tds_codec::CodecError> for CoreError {
    fn from(e: tds_codec::CodecError) -> Self {
        match e {
            tds_codec::CodecError::Io(io) => Self::Transport(io),
            other => Self::Protocol(other.to_string()),
        }
    }
}

impl From<tds_tls::TlsError> for CoreError {
    fn from(e: tds_tls::TlsError) -> Self {
        Self::Tls(Arc::new(e))
    }
}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Transport(Arc::new(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_error_formats_detail() {
        let err = CoreError::protocol("bad packet length");
        assert_eq!(err.to_string(), "protocol error: bad packet length");
    }

    #[test]
    fn clone_preserves_variant() {
        let err = CoreError::ConnectionClosed;
        let cloned = err.clone();
        assert!(matches!(cloned, CoreError::ConnectionClosed));
    }
}

//! Errors produced by the packet framing layer.

use std::sync::Arc;

use thiserror::Error;

/// Errors that can occur while framing or deframing TDS packets.
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    /// The packet header's declared length was smaller than the header itself.
    #[error("invalid packet header")]
    InvalidHeader,

    /// The packet header declared a length larger than the configured maximum.
    #[error("packet too large: {size} bytes exceeds max {max}")]
    PacketTooLarge {
        /// Declared packet size in bytes.
        size: usize,
        /// Configured maximum packet size.
        max: usize,
    },

    /// A field in the packet header could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] tds_protocol::ProtocolError),

    /// The underlying transport was closed while packets were still expected.
    #[error("connection closed")]
    ConnectionClosed,

    /// The underlying transport returned an I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] Arc<std::io::Error>),
}

impl From<std::io::Error> for CodecError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(Arc::new(e))
    }
}

//! Errors produced while parsing or building TDS protocol structures.
//!
//! This crate is IO-agnostic, so `ProtocolError` never wraps an I/O error;
//! it only describes malformed or unrecognized wire data.

use crate::prelude::*;

#[cfg(feature = "std")]
use thiserror::Error;

/// Errors that can occur while decoding or encoding TDS wire structures.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(Error))]
pub enum ProtocolError {
    /// Not enough bytes were available to decode a fixed-size structure.
    #[cfg_attr(
        feature = "std",
        error("incomplete data: expected at least {expected} bytes, got {actual}")
    )]
    IncompletePacket {
        /// Minimum number of bytes required.
        expected: usize,
        /// Number of bytes actually available.
        actual: usize,
    },

    /// Ran out of bytes while decoding a variable-length field.
    #[cfg_attr(feature = "std", error("unexpected end of buffer"))]
    UnexpectedEof,

    /// An unrecognized packet type byte.
    #[cfg_attr(feature = "std", error("invalid packet type: 0x{0:02X}"))]
    InvalidPacketType(u8),

    /// An unrecognized packet status bit pattern.
    #[cfg_attr(feature = "std", error("invalid packet status flags: 0x{0:02X}"))]
    InvalidPacketStatus(u8),

    /// An unrecognized PreLogin option token.
    #[cfg_attr(feature = "std", error("invalid prelogin option: 0x{0:02X}"))]
    InvalidPreloginOption(u8),

    /// A field held a value outside its documented range.
    #[cfg_attr(feature = "std", error("invalid field {field}: {reason}"))]
    InvalidField {
        /// Name of the offending field.
        field: String,
        /// Human-readable explanation.
        reason: String,
    },
}

#[cfg(not(feature = "std"))]
impl core::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::IncompletePacket { expected, actual } => write!(
                f,
                "incomplete data: expected at least {expected} bytes, got {actual}"
            ),
            Self::UnexpectedEof => write!(f, "unexpected end of buffer"),
            Self::InvalidPacketType(b) => write!(f, "invalid packet type: 0x{b:02X}"),
            Self::InvalidPacketStatus(b) => write!(f, "invalid packet status flags: 0x{b:02X}"),
            Self::InvalidPreloginOption(b) => write!(f, "invalid prelogin option: 0x{b:02X}"),
            Self::InvalidField { field, reason } => {
                write!(f, "invalid field {field}: {reason}")
            }
        }
    }
}

//! # mssql-codec
//!
//! Async framing layer for TDS packet handling.
//!
//! This crate transforms raw byte streams into high-level TDS packets,
//! handling packet reassembly across TCP segment boundaries and packet
//! continuation for large messages.
//!
//! ## Features
//!
//! - Packet reassembly across TCP segments
//! - Message reassembly from multiple packets
//! - IO splitting for cancellation safety (ADR-005)
//! - Integration with tokio-util's codec framework
//!
//! ## Architecture
//!
//! The codec layer sits between raw TCP streams and the higher-level client:
//!
//! ```text
//! TCP Stream → TdsCodec (packet framing) → MessageAssembler → Client
//! ```
//!
//! `PacketReader`/`PacketWriter` provide split I/O for callers that need to
//! send an out-of-band Attention packet while blocked reading a large
//! result set; `PacketStream` provides the combined form for callers that
//! own the transport exclusively.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod framed;
pub mod message;
pub mod packet_codec;

pub use error::CodecError;
pub use framed::{PacketReader, PacketStream, PacketWriter};
pub use message::{Message, MessageAssembler};
pub use packet_codec::{Packet, TdsCodec};

//! # tds-protocol
//!
//! Pure implementation of the MS-TDS (Tabular Data Stream) protocol used by
//! Microsoft SQL Server.
//!
//! This crate provides `no_std` compatible packet structures and
//! serialization for the packet, PreLogin, and LOGIN7 layers of TDS
//! protocol versions 7.4 through 8.0.
//!
//! ## Features
//!
//! - `std` (default): Enable standard library support
//! - `alloc`: Enable allocation without full std (requires `alloc` crate)
//!
//! ## Design Philosophy
//!
//! This crate is intentionally IO-agnostic. It contains no networking logic and
//! makes no assumptions about the async runtime. Higher-level crates build upon
//! this foundation to provide async I/O capabilities.
//!
//! ## Example
//!
//! ```rust,ignore
//! use tds_protocol::{PacketHeader, PacketType, PacketStatus};
//!
//! let header = PacketHeader {
//!     packet_type: PacketType::SqlBatch,
//!     status: PacketStatus::END_OF_MESSAGE,
//!     length: 100,
//!     spid: 0,
//!     packet_id: 1,
//!     window: 0,
//! };
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

#[cfg(feature = "alloc")]
extern crate alloc;

mod prelude;

pub mod codec;
pub mod error;
pub mod login7;
pub mod packet;
pub mod prelogin;
pub mod sql_batch;
pub mod version;

pub use error::ProtocolError;
pub use login7::{
    FeatureExtension, FeatureId, Login7, OptionFlags1, OptionFlags2, OptionFlags3, TypeFlags,
};
pub use packet::{
    PacketHeader, PacketStatus, PacketType, DEFAULT_PACKET_SIZE, MAX_PACKET_SIZE,
    PACKET_HEADER_SIZE,
};
pub use prelogin::{EncryptionLevel, PreLogin, PreLoginOption};
pub use sql_batch::{encode_sql_batch, encode_sql_batch_with_transaction, SqlBatch};
pub use version::{SqlServerVersion, TdsVersion};

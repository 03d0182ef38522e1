//! Connection pipeline for the Tabular Data Stream protocol: packet
//! framing, the login/TLS-upgrade handshake, and the single-writer request
//! dispatcher.
//!
//! This crate owns the wire-level conversation with a TDS server from the
//! moment a duplex byte stream is handed to it until the connection closes.
//! It does not open sockets, resolve DNS, configure TLS trust roots beyond
//! accepting an already-built engine, or interpret message payloads above
//! the packet layer (no token parsing, no row materialization, no
//! query-level API) — those are the concerns of a layer above this one.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod request;
pub mod state;
pub mod transport;

pub use config::CoreConfig;
pub use connection::Connection;
pub use dispatcher::{Dispatcher, DispatcherCommand, TlsUpgradeParams};
pub use error::CoreError;
pub use request::{
    AttentionRequest, Login7Request, Packet, PreLoginRequest, Request, RequestKind,
    RequestOutcome, SqlBatchRequest,
};
pub use state::ConnectionState;
pub use transport::Transport;

//! # tds-testing
//!
//! Test infrastructure for exercising the TDS connection pipeline without a
//! real SQL Server instance.
//!
//! ## Features
//!
//! - Mock TDS server that completes the PRELOGIN/LOGIN7 handshake and then
//!   replays a scripted sequence of packets
//! - Packet recording for regression tests
//!
//! ## Example
//!
//! ```rust,ignore
//! use tds_testing::mock_server::MockTdsServer;
//!
//! #[tokio::test]
//! async fn test_with_mock_server() {
//!     let server = MockTdsServer::builder()
//!         .with_server_name("MockServer")
//!         .build()
//!         .await
//!         .unwrap();
//!
//!     let addr = server.addr();
//!     // Connect your client to addr...
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod mock_server;

pub use mock_server::{
    MockServerBuilder, MockServerConfig, MockServerError, MockTdsServer, PacketRecorder,
    RecordedPacket, ScriptStep,
};

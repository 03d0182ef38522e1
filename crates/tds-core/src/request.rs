//! Request delegates: the units of work the dispatcher drives.
//!
//! The set of request kinds the pipeline understands is closed, so it is
//! modeled as a tagged enum rather than `dyn Trait` — the same choice the
//! rest of this stack makes for its other closed variant sets.

use bytes::{Bytes, BytesMut};
use tds_protocol::login7::Login7;
use tds_protocol::packet::{PacketHeader, PacketStatus, PacketType};
use tds_protocol::prelogin::PreLogin;
use tds_protocol::sql_batch::encode_sql_batch;

use crate::error::CoreError;

/// One wire packet, ready for the codec.
pub type Packet = tds_codec::packet_codec::Packet;

/// What a request wants the dispatcher to do after handling one inbound
/// packet.
#[derive(Debug)]
pub enum RequestOutcome {
    /// Send these packets and keep the request active, awaiting more
    /// inbound packets.
    Send(Vec<Packet>),
    /// Keep the request active without sending anything; more packets of
    /// the current message are still expected.
    AwaitMore,
    /// Ask the dispatcher to install a TLS engine before anything else
    /// proceeds. This is the `sslKickoff` sentinel from the wire protocol
    /// point of view — it never appears as an actual packet type, only as
    /// this in-process signal.
    InstallTls,
    /// The request is complete.
    Complete,
}

/// A unit of work the dispatcher drives to completion.
///
/// Implementors produce the initial outbound packets, consume inbound
/// packets one at a time, and report completion.
pub trait Request: Send {
    /// Produce the initial outbound packet sequence.
    fn start(&mut self) -> Vec<Packet>;

    /// Consume one inbound packet, optionally producing more outbound
    /// packets or reporting completion.
    fn respond(&mut self, packet: &Packet) -> Result<RequestOutcome, CoreError>;

    /// Emit a descriptive trace event for this request. Purely diagnostic.
    fn log(&self);
}

fn single_packet(packet_type: PacketType, payload: Bytes) -> Packet {
    let header = PacketHeader::new(packet_type, PacketStatus::END_OF_MESSAGE, 0);
    Packet::new(header, BytesMut::from(&payload[..]))
}

/// Sends the initial PRELOGIN packet and interprets the server's response.
pub struct PreLoginRequest {
    prelogin: PreLogin,
    buffer: BytesMut,
}

impl PreLoginRequest {
    /// Build a request that sends `prelogin` as the outbound PRELOGIN
    /// packet.
    #[must_use]
    pub fn new(prelogin: PreLogin) -> Self {
        Self {
            prelogin,
            buffer: BytesMut::new(),
        }
    }
}

impl Request for PreLoginRequest {
    fn start(&mut self) -> Vec<Packet> {
        vec![single_packet(PacketType::PreLogin, self.prelogin.encode())]
    }

    fn respond(&mut self, packet: &Packet) -> Result<RequestOutcome, CoreError> {
        self.buffer.extend_from_slice(&packet.payload);
        if !packet.is_end_of_message() {
            return Ok(RequestOutcome::AwaitMore);
        }

        let response = PreLogin::decode(self.buffer.split().freeze())
            .map_err(|e| CoreError::protocol(format!("invalid PRELOGIN response: {e}")))?;

        if response.encryption.is_required() {
            Ok(RequestOutcome::InstallTls)
        } else {
            Ok(RequestOutcome::Complete)
        }
    }

    fn log(&self) {
        tracing::debug!(encryption = ?self.prelogin.encryption, "submitting PRELOGIN request");
    }
}

/// Sends the LOGIN7 packet and waits for the server's login response.
pub struct Login7Request {
    login: Login7,
}

impl Login7Request {
    /// Build a request that sends `login` as the outbound LOGIN7 packet.
    #[must_use]
    pub fn new(login: Login7) -> Self {
        Self { login }
    }
}

impl Request for Login7Request {
    fn start(&mut self) -> Vec<Packet> {
        vec![single_packet(PacketType::Tds7Login, self.login.encode())]
    }

    fn respond(&mut self, packet: &Packet) -> Result<RequestOutcome, CoreError> {
        // The core does not interpret LOGINACK/ENVCHANGE/DONE tokens; it
        // only needs to know the response finished, which the packet
        // framing layer already tells us via end-of-message.
        if packet.is_end_of_message() {
            Ok(RequestOutcome::Complete)
        } else {
            Ok(RequestOutcome::AwaitMore)
        }
    }

    fn log(&self) {
        tracing::debug!("submitting LOGIN7 request");
    }
}

/// Sends a SQL batch and waits for the server's result stream to finish.
///
/// Row and token interpretation is out of scope here: the request is
/// complete as soon as the framing layer reports end-of-message.
pub struct SqlBatchRequest {
    sql: String,
}

impl SqlBatchRequest {
    /// Build a request that sends `sql` as a SQL_BATCH packet.
    #[must_use]
    pub fn new(sql: impl Into<String>) -> Self {
        Self { sql: sql.into() }
    }
}

impl Request for SqlBatchRequest {
    fn start(&mut self) -> Vec<Packet> {
        vec![single_packet(PacketType::SqlBatch, encode_sql_batch(&self.sql))]
    }

    fn respond(&mut self, packet: &Packet) -> Result<RequestOutcome, CoreError> {
        if packet.is_end_of_message() {
            Ok(RequestOutcome::Complete)
        } else {
            Ok(RequestOutcome::AwaitMore)
        }
    }

    fn log(&self) {
        tracing::debug!(sql_len = self.sql.len(), "submitting SQL batch request");
    }
}

/// Sends an ATTENTION (cancel) signal for the currently executing request.
pub struct AttentionRequest;

impl Request for AttentionRequest {
    fn start(&mut self) -> Vec<Packet> {
        let header = PacketHeader::new(
            PacketType::Attention,
            PacketStatus::END_OF_MESSAGE,
            0,
        );
        vec![Packet::new(header, BytesMut::new())]
    }

    fn respond(&mut self, packet: &Packet) -> Result<RequestOutcome, CoreError> {
        if packet.is_end_of_message() {
            Ok(RequestOutcome::Complete)
        } else {
            Ok(RequestOutcome::AwaitMore)
        }
    }

    fn log(&self) {
        tracing::debug!("submitting ATTENTION request");
    }
}

/// The closed set of request kinds the dispatcher drives.
pub enum RequestKind {
    /// PRELOGIN exchange.
    PreLogin(PreLoginRequest),
    /// LOGIN7 exchange.
    Login7(Login7Request),
    /// SQL batch execution.
    SqlBatch(SqlBatchRequest),
    /// Cancellation signal.
    Attention(AttentionRequest),
}

impl Request for RequestKind {
    fn start(&mut self) -> Vec<Packet> {
        match self {
            Self::PreLogin(r) => r.start(),
            Self::Login7(r) => r.start(),
            Self::SqlBatch(r) => r.start(),
            Self::Attention(r) => r.start(),
        }
    }

    fn respond(&mut self, packet: &Packet) -> Result<RequestOutcome, CoreError> {
        match self {
            Self::PreLogin(r) => r.respond(packet),
            Self::Login7(r) => r.respond(packet),
            Self::SqlBatch(r) => r.respond(packet),
            Self::Attention(r) => r.respond(packet),
        }
    }

    fn log(&self) {
        match self {
            Self::PreLogin(r) => r.log(),
            Self::Login7(r) => r.log(),
            Self::SqlBatch(r) => r.log(),
            Self::Attention(r) => r.log(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tds_protocol::prelogin::EncryptionLevel;

    fn prelogin_response_packet(encryption: EncryptionLevel) -> Packet {
        let response = PreLogin::new().with_encryption(encryption);
        single_packet(PacketType::PreLogin, response.encode())
    }

    #[test]
    fn prelogin_without_encryption_completes_directly() {
        let mut request = PreLoginRequest::new(PreLogin::new());
        let packets = request.start();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].header.packet_type, PacketType::PreLogin);

        let response = prelogin_response_packet(EncryptionLevel::NotSupported);
        let outcome = request.respond(&response).unwrap();
        assert!(matches!(outcome, RequestOutcome::Complete));
    }

    #[test]
    fn prelogin_with_required_encryption_requests_tls() {
        let mut request = PreLoginRequest::new(PreLogin::new());
        request.start();

        let response = prelogin_response_packet(EncryptionLevel::Required);
        let outcome = request.respond(&response).unwrap();
        assert!(matches!(outcome, RequestOutcome::InstallTls));
    }

    #[test]
    fn login7_completes_on_end_of_message() {
        let mut request = Login7Request::new(Login7::new());
        request.start();

        let header = PacketHeader::new(PacketType::TabularResult, PacketStatus::END_OF_MESSAGE, 0);
        let response = Packet::new(header, BytesMut::from(&b""[..]));
        let outcome = request.respond(&response).unwrap();
        assert!(matches!(outcome, RequestOutcome::Complete));
    }

    #[test]
    fn sql_batch_awaits_more_until_end_of_message() {
        let mut request = SqlBatchRequest::new("SELECT 1");
        request.start();

        let header = PacketHeader::new(PacketType::TabularResult, PacketStatus::NORMAL, 0);
        let partial = Packet::new(header, BytesMut::from(&b"partial"[..]));
        let outcome = request.respond(&partial).unwrap();
        assert!(matches!(outcome, RequestOutcome::AwaitMore));
    }
}

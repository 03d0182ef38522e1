//! Mock TDS server for exercising the connection pipeline in tests.
//!
//! This is a packet-level server: it understands PRELOGIN and LOGIN7
//! framing well enough to complete a handshake, and otherwise replies with
//! whatever raw bytes a test script hands it. It does not interpret SQL
//! batches or decode result sets — that belongs to layers above the core
//! pipeline this crate supports.
//!
//! ## Example
//!
//! ```rust,ignore
//! use tds_testing::mock_server::MockTdsServer;
//!
//! #[tokio::test]
//! async fn test_handshake() {
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

use bytes::{BufMut, Bytes, BytesMut};
use rustls::pki_types::PrivatePkcs8KeyDer;
use rustls::ServerConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tds_protocol::{PacketHeader, PacketStatus, PacketType, PACKET_HEADER_SIZE};
use tds_tls::TlsPreloginWrapper;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Mutex};
use tokio_rustls::TlsAcceptor;

/// Error type for mock server operations.
#[derive(Debug, Error)]
pub enum MockServerError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Server already stopped.
    #[error("server already stopped")]
    Stopped,

    /// TLS setup or handshake error.
    #[error("TLS error: {0}")]
    Tls(String),
}

/// Result type for mock server operations.
pub type Result<T> = std::result::Result<T, MockServerError>;

/// A single scripted reply: bytes to send back after the next inbound
/// packet of the expected type is read.
#[derive(Debug, Clone)]
pub struct ScriptStep {
    /// Packet type the server expects to read before replying.
    pub expect: PacketType,
    /// Packet type to reply with.
    pub reply_type: PacketType,
    /// Raw payload to send as the reply (header is added by the server).
    pub payload: Bytes,
}

impl ScriptStep {
    /// Build a script step.
    #[must_use]
    pub fn new(expect: PacketType, reply_type: PacketType, payload: impl Into<Bytes>) -> Self {
        Self {
            expect,
            reply_type,
            payload: payload.into(),
        }
    }
}

/// Configuration captured by [`MockServerBuilder`].
#[derive(Clone)]
pub struct MockServerConfig {
    server_name: String,
    tds_version: u32,
    prelogin_encrypt: u8,
    post_login_script: Vec<ScriptStep>,
    require_tls: bool,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            server_name: "MockServer".to_string(),
            tds_version: 0x7400_0004,
            prelogin_encrypt: 0x02, // ENCRYPT_NOT_SUP
            post_login_script: Vec::new(),
            require_tls: false,
        }
    }
}

/// Builder for [`MockTdsServer`].
#[derive(Default)]
pub struct MockServerBuilder {
    config: MockServerConfig,
}

impl MockServerBuilder {
    /// Set the server name advertised in LOGINACK.
    #[must_use]
    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.config.server_name = name.into();
        self
    }

    /// Set the TDS version advertised in LOGINACK.
    #[must_use]
    pub fn with_tds_version(mut self, version: u32) -> Self {
        self.config.tds_version = version;
        self
    }

    /// Set the ENCRYPTION byte returned in the PRELOGIN response.
    #[must_use]
    pub fn with_prelogin_encrypt(mut self, value: u8) -> Self {
        self.config.prelogin_encrypt = value;
        self
    }

    /// Append a scripted request/reply pair to run after LOGIN7 completes.
    #[must_use]
    pub fn with_script_step(mut self, step: ScriptStep) -> Self {
        self.config.post_login_script.push(step);
        self
    }

    /// Require the client to complete a TLS handshake, tunneled inside
    /// PRELOGIN packets, before LOGIN7. The server advertises ENCRYPT_ON
    /// and serves a freshly generated self-signed certificate for
    /// `"localhost"`; clients must connect with certificate validation
    /// disabled (`TlsConfig::trust_server_certificate`).
    #[must_use]
    pub fn with_tls_required(mut self) -> Self {
        self.config.prelogin_encrypt = 0x01; // ENCRYPT_ON
        self.config.require_tls = true;
        self
    }

    /// Start the server.
    pub async fn build(self) -> Result<MockTdsServer> {
        MockTdsServer::start(self.config).await
    }
}

/// A mock TDS server that speaks just enough of the protocol to complete a
/// handshake and then replay a scripted sequence of packets.
pub struct MockTdsServer {
    addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
    connection_count: Arc<Mutex<usize>>,
}

impl MockTdsServer {
    /// Start building a mock server.
    #[must_use]
    pub fn builder() -> MockServerBuilder {
        MockServerBuilder::default()
    }

    async fn start(config: MockServerConfig) -> Result<Self> {
        let tls_acceptor = if config.require_tls {
            Some(build_self_signed_tls_acceptor()?)
        } else {
            None
        };

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (shutdown_tx, _) = broadcast::channel(1);
        let config = Arc::new(config);
        let connection_count = Arc::new(Mutex::new(0usize));

        let server = Self {
            addr,
            shutdown_tx: shutdown_tx.clone(),
            connection_count: connection_count.clone(),
        };

        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _peer)) => {
                                let config = config.clone();
                                let tls_acceptor = tls_acceptor.clone();
                                let count = connection_count.clone();
                                tokio::spawn(async move {
                                    *count.lock().await += 1;
                                    if let Err(e) = handle_connection(stream, config, tls_acceptor).await {
                                        tracing::debug!("mock server connection error: {e}");
                                    }
                                    let mut c = count.lock().await;
                                    *c = c.saturating_sub(1);
                                });
                            }
                            Err(e) => {
                                tracing::error!("mock server accept error: {e}");
                                break;
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });

        Ok(server)
    }

    /// The server's listening address.
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Host string for client configuration.
    #[must_use]
    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    /// Listening port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Current number of accepted connections still being served.
    pub async fn connection_count(&self) -> usize {
        *self.connection_count.lock().await
    }

    /// Stop accepting new connections.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

impl Drop for MockTdsServer {
    fn drop(&mut self) {
        self.stop();
    }
}

struct RawPacket {
    packet_type: PacketType,
    payload: Bytes,
}

/// Build a `TlsAcceptor` serving a freshly generated self-signed
/// certificate for `"localhost"`. A fresh key pair is generated per
/// server instance; nothing is persisted to disk.
fn build_self_signed_tls_acceptor() -> Result<TlsAcceptor> {
    let _ = rustls::crypto::ring::default_provider().install_default();

    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
        .map_err(|e| MockServerError::Tls(e.to_string()))?;
    let cert_der = certified.cert.der().clone();
    let key_der = PrivatePkcs8KeyDer::from(certified.key_pair.serialize_der());

    let server_config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![cert_der], key_der.into())
        .map_err(|e| MockServerError::Tls(e.to_string()))?;

    Ok(TlsAcceptor::from(Arc::new(server_config)))
}

async fn read_packet<T: AsyncRead + Unpin>(stream: &mut T) -> Result<RawPacket> {
    let mut header_buf = [0u8; PACKET_HEADER_SIZE];
    stream.read_exact(&mut header_buf).await?;

    let mut cursor = &header_buf[..];
    let header =
        PacketHeader::decode(&mut cursor).map_err(|e| MockServerError::Protocol(e.to_string()))?;

    let mut full_payload = BytesMut::new();
    let mut header = header;
    loop {
        let payload_len = header.payload_length();
        let mut payload = vec![0u8; payload_len];
        if payload_len > 0 {
            stream.read_exact(&mut payload).await?;
        }
        full_payload.extend_from_slice(&payload);

        if header.is_end_of_message() {
            break;
        }

        let mut next_header_buf = [0u8; PACKET_HEADER_SIZE];
        stream.read_exact(&mut next_header_buf).await?;
        let mut cursor = &next_header_buf[..];
        header = PacketHeader::decode(&mut cursor)
            .map_err(|e| MockServerError::Protocol(e.to_string()))?;
    }

    Ok(RawPacket {
        packet_type: header.packet_type,
        payload: full_payload.freeze(),
    })
}

async fn write_packet<T: AsyncWrite + Unpin>(
    stream: &mut T,
    packet_type: PacketType,
    payload: &[u8],
) -> Result<()> {
    let total_len = PACKET_HEADER_SIZE + payload.len();
    let header = PacketHeader {
        packet_type,
        status: PacketStatus::END_OF_MESSAGE,
        length: total_len as u16,
        spid: 0,
        packet_id: 1,
        window: 0,
    };

    let mut buf = BytesMut::with_capacity(total_len);
    header.encode(&mut buf);
    buf.extend_from_slice(payload);

    stream.write_all(&buf).await?;
    stream.flush().await?;
    Ok(())
}

async fn handle_connection(
    mut stream: TcpStream,
    config: Arc<MockServerConfig>,
    tls_acceptor: Option<TlsAcceptor>,
) -> Result<()> {
    let prelogin = read_packet(&mut stream).await?;
    if prelogin.packet_type != PacketType::PreLogin {
        return Err(MockServerError::Protocol(format!(
            "expected PreLogin, got {:?}",
            prelogin.packet_type
        )));
    }
    send_prelogin_response(&mut stream, &config).await?;

    match tls_acceptor {
        Some(acceptor) => {
            // From here on, handshake bytes and (once complete) LOGIN7 and
            // the script all travel tunneled inside PRELOGIN packets, then
            // as TLS application data, exactly as the client's
            // `TlsPreloginWrapper` expects on its side of the same wire.
            let wrapper = TlsPreloginWrapper::new(stream);
            let mut tls_stream = acceptor
                .accept(wrapper)
                .await
                .map_err(|e| MockServerError::Tls(e.to_string()))?;
            tls_stream.get_mut().0.handshake_complete();
            run_login_and_script(&mut tls_stream, &config).await
        }
        None => run_login_and_script(&mut stream, &config).await,
    }
}

async fn run_login_and_script<T>(stream: &mut T, config: &MockServerConfig) -> Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let login = read_packet(stream).await?;
    if login.packet_type != PacketType::Tds7Login {
        return Err(MockServerError::Protocol(format!(
            "expected Tds7Login, got {:?}",
            login.packet_type
        )));
    }
    send_login_response(stream, config).await?;

    for step in &config.post_login_script {
        let packet = match read_packet(stream).await {
            Ok(p) => p,
            Err(MockServerError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e),
        };

        if packet.packet_type != step.expect {
            return Err(MockServerError::Protocol(format!(
                "expected {:?}, got {:?}",
                step.expect, packet.packet_type
            )));
        }

        write_packet(stream, step.reply_type, &step.payload).await?;
    }

    Ok(())
}

/// Encode a minimal PRELOGIN response: VERSION + ENCRYPTION options only.
async fn send_prelogin_response<T: AsyncWrite + Unpin>(
    stream: &mut T,
    config: &MockServerConfig,
) -> Result<()> {
    let mut response = BytesMut::new();

    response.put_u8(0x00); // VERSION token
    response.put_u16(11); // offset
    response.put_u16(6); // length

    response.put_u8(0x01); // ENCRYPTION token
    response.put_u16(17);
    response.put_u16(1);

    response.put_u8(0xFF); // terminator

    response.put_u8(16);
    response.put_u8(0);
    response.put_u16_le(0);
    response.put_u16_le(0);

    response.put_u8(config.prelogin_encrypt);

    write_packet(stream, PacketType::PreLogin, &response).await
}

/// Encode a minimal LOGINACK + DONE response body.
async fn send_login_response<T: AsyncWrite + Unpin>(
    stream: &mut T,
    config: &MockServerConfig,
) -> Result<()> {
    let mut response = BytesMut::new();
    encode_login_ack(&mut response, &config.server_name, config.tds_version);
    encode_done(&mut response);
    write_packet(stream, PacketType::TabularResult, &response).await
}

const TOKEN_LOGIN_ACK: u8 = 0xAD;
const TOKEN_DONE: u8 = 0xFD;

fn encode_login_ack(dst: &mut BytesMut, server_name: &str, tds_version: u32) {
    let name_utf16: Vec<u16> = server_name.encode_utf16().collect();
    let data_len = 1 + 4 + 1 + name_utf16.len() * 2 + 4;

    dst.put_u8(TOKEN_LOGIN_ACK);
    dst.put_u16_le(data_len as u16);
    dst.put_u8(1); // interface: SQL
    dst.put_u32_le(tds_version);

    dst.put_u8(name_utf16.len() as u8);
    for c in &name_utf16 {
        dst.put_u16_le(*c);
    }

    dst.put_u32_le(0x1000_0000); // program version 16.0.0.0
}

fn encode_done(dst: &mut BytesMut) {
    dst.put_u8(TOKEN_DONE);
    dst.put_u16_le(0); // status
    dst.put_u16_le(0); // cur_cmd
    dst.put_u64_le(0); // row count
}

/// A packet captured by [`PacketRecorder`].
#[derive(Debug, Clone)]
pub struct RecordedPacket {
    /// `true` if the packet travelled server-to-client.
    pub from_server: bool,
    /// Raw packet bytes, header included.
    pub data: Bytes,
}

/// Records packets exchanged during a session for later inspection or
/// replay.
#[derive(Debug, Default)]
pub struct PacketRecorder {
    packets: Vec<RecordedPacket>,
}

impl PacketRecorder {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one packet.
    pub fn record(&mut self, from_server: bool, data: Bytes) {
        self.packets.push(RecordedPacket { from_server, data });
    }

    /// All packets recorded so far, in order.
    #[must_use]
    pub fn packets(&self) -> &[RecordedPacket] {
        &self.packets
    }
}

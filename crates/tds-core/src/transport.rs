//! The transport stack the dispatcher reads and writes through.
//!
//! Modeled as an explicit enum of transformer stages rather than a stack
//! of boxed trait objects: the dispatcher holds exactly one `Transport`
//! and swaps it in a single assignment when the TLS handshake completes.

use futures_util::{SinkExt, StreamExt};
use tds_codec::framed::PacketStream;
use tds_codec::packet_codec::{Packet, TdsCodec};
use tds_tls::{TlsConnector, TlsPreloginWrapper};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::client::TlsStream;

use crate::error::CoreError;

/// The connection's current transport stage.
pub enum Transport<S> {
    /// Plaintext TDS packets directly over the raw stream.
    Plain(PacketStream<S>),
    /// A TLS handshake is in progress, tunneled through PRELOGIN packets.
    TlsHandshaking(TlsPreloginWrapper<S>),
    /// The TLS handshake completed; packets now travel as TLS application
    /// data.
    TlsEstablished(PacketStream<TlsStream<TlsPreloginWrapper<S>>>),
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Begin a TLS handshake tunneled inside PRELOGIN packets.
    ///
    /// Takes ownership of the raw stream underlying the current `Plain`
    /// stage (any bytes already buffered by the packet codec at this
    /// point belong to the PRELOGIN response that triggered the upgrade,
    /// and have already been consumed by the active request before this
    /// is called).
    pub fn begin_tls_handshake(self) -> Result<Self, CoreError> {
        match self {
            Self::Plain(stream) => {
                let raw = stream.into_inner();
                Ok(Self::TlsHandshaking(TlsPreloginWrapper::new(raw)))
            }
            other => Ok(other),
        }
    }

    /// Drive the rustls handshake to completion through the PRELOGIN
    /// wrapper, then swap in the post-handshake transport.
    ///
    /// This is the single atomic reconfiguration point: on success, every
    /// subsequent packet travels through fresh codec instances positioned
    /// after the TLS engine.
    pub async fn complete_tls_handshake(
        self,
        connector: &TlsConnector,
        server_name: &str,
        max_packet_size: usize,
    ) -> Result<Self, CoreError> {
        let wrapper = match self {
            Self::TlsHandshaking(wrapper) => wrapper,
            other => return Ok(other),
        };

        let mut tls_stream = connector.connect(wrapper, server_name).await?;
        tls_stream.get_mut().0.handshake_complete();

        let codec = TdsCodec::new().with_max_packet_size(max_packet_size);
        Ok(Self::TlsEstablished(PacketStream::with_codec(tls_stream, codec)))
    }

    /// Read the next packet, whichever stage is active.
    ///
    /// Returns `Ok(None)` on a clean stream close. Must not be called
    /// while `TlsHandshaking`; the handshake consumes its own bytes
    /// directly through the wrapper.
    pub async fn read_packet(&mut self) -> Result<Option<Packet>, CoreError> {
        match self {
            Self::Plain(stream) => Ok(stream.next().await.transpose()?),
            Self::TlsEstablished(stream) => Ok(stream.next().await.transpose()?),
            Self::TlsHandshaking(_) => Ok(None),
        }
    }

    /// Write one packet and flush it, whichever stage is active.
    pub async fn write_packet(&mut self, packet: Packet) -> Result<(), CoreError> {
        match self {
            Self::Plain(stream) => {
                stream.send(packet).await?;
                Ok(())
            }
            Self::TlsEstablished(stream) => {
                stream.send(packet).await?;
                Ok(())
            }
            Self::TlsHandshaking(_) => Err(CoreError::protocol(
                "cannot write ordinary packets while a TLS handshake is in progress",
            )),
        }
    }
}

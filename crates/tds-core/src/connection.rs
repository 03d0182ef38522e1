//! The public entry point: spawns the dispatcher task and exposes a
//! handle for submitting requests to it.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::CoreConfig;
use crate::dispatcher::{Dispatcher, DispatcherCommand, TlsUpgradeParams};
use crate::error::CoreError;
use crate::request::{Packet, RequestKind};
use crate::transport::Transport;
use tds_codec::framed::PacketStream;
use tds_codec::packet_codec::TdsCodec;
use tds_tls::TlsConnector;

/// A handle to a running connection pipeline.
///
/// Cloning a `Connection` is cheap: every clone shares the same dispatcher
/// task through the command channel, matching the one-writer-many-readers
/// shape the pipeline is built around.
#[derive(Clone)]
pub struct Connection {
    command_tx: mpsc::UnboundedSender<DispatcherCommand>,
}

impl Connection {
    /// Start the dispatcher over an already-connected, not-yet-authenticated
    /// transport (this crate never opens sockets or resolves TLS trust
    /// roots itself; that is the caller's responsibility).
    ///
    /// Returns the connection handle and the `tokio::task` join handle for
    /// the dispatcher loop, so the caller can await or abort it.
    pub fn spawn<S>(stream: S, config: &CoreConfig) -> Result<(Self, JoinHandle<()>), CoreError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (idle_tx, _idle_rx) = broadcast::channel(16);
        Self::spawn_with_idle_channel(stream, config, Some(idle_tx))
    }

    /// As [`Connection::spawn`], but also returns a broadcast receiver for
    /// packets that arrive while the request queue is empty (server-pushed
    /// notifications outside any client-initiated exchange).
    pub fn spawn_with_idle_packets<S>(
        stream: S,
        config: &CoreConfig,
    ) -> Result<(Self, JoinHandle<()>, broadcast::Receiver<Packet>), CoreError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (idle_tx, idle_rx) = broadcast::channel(16);
        let (connection, join) = Self::spawn_with_idle_channel(stream, config, Some(idle_tx))?;
        Ok((connection, join, idle_rx))
    }

    fn spawn_with_idle_channel<S>(
        stream: S,
        config: &CoreConfig,
        idle_packets: Option<broadcast::Sender<Packet>>,
    ) -> Result<(Self, JoinHandle<()>), CoreError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let codec = TdsCodec::new().with_max_packet_size(config.max_packet_size);
        let transport = Transport::Plain(PacketStream::with_codec(stream, codec));

        let tls = match &config.tls {
            Some(tls_config) => Some(TlsUpgradeParams {
                server_name: tls_config
                    .server_name
                    .clone()
                    .unwrap_or_default(),
                connector: TlsConnector::new(tls_config.clone())?,
            }),
            None => None,
        };

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(
            transport,
            tls,
            config.max_packet_size,
            command_rx,
            idle_packets,
        );
        let join = tokio::spawn(dispatcher.run());

        Ok((Self { command_tx }, join))
    }

    /// Submit a request and await its completion.
    ///
    /// Requests are served strictly one at a time, in submission order;
    /// this call returns once the dispatcher has sent the request's
    /// initial packets, driven it through the server's response, and
    /// confirmed completion (or encountered a fatal error).
    pub async fn submit(&self, request: RequestKind) -> Result<(), CoreError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(DispatcherCommand::Submit {
                request,
                reply: reply_tx,
            })
            .map_err(|_| CoreError::ConnectionClosed)?;

        reply_rx.await.unwrap_or(Err(CoreError::ConnectionClosed))
    }

    /// Close the connection, failing any requests still in flight with
    /// [`CoreError::ConnectionClosed`].
    pub fn close(&self) {
        let _ = self.command_tx.send(DispatcherCommand::Close);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::request::PreLoginRequest;
    use tds_protocol::prelogin::{EncryptionLevel, PreLogin};
    use tokio::io::duplex;

    #[tokio::test]
    async fn close_before_response_fails_pending_submit() {
        let (client, server) = duplex(4096);
        drop(server);

        let config = CoreConfig::default();
        let (connection, join) = Connection::spawn(client, &config).unwrap();

        let request = RequestKind::PreLogin(PreLoginRequest::new(
            PreLogin::new().with_encryption(EncryptionLevel::NotSupported),
        ));
        let result = connection.submit(request).await;
        assert!(result.is_err());

        let _ = join.await;
    }
}

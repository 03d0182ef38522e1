//! The request dispatcher: the single task that owns the queue, the
//! connection state, and the transport.
//!
//! Grounded on the command-channel-plus-oneshot shape of an actor-style
//! connection worker, adapted from a dedicated OS thread to a single
//! cooperative `tokio::task`.

use std::collections::VecDeque;

use tds_tls::TlsConnector;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::error::CoreError;
use crate::request::{Packet, Request, RequestKind, RequestOutcome};
use crate::state::ConnectionState;
use crate::transport::Transport;

/// A message the dispatcher loop consumes.
pub enum DispatcherCommand {
    /// Enqueue a new request.
    Submit {
        /// The request delegate to drive.
        request: RequestKind,
        /// Signaled exactly once when the request completes or fails.
        reply: oneshot::Sender<Result<(), CoreError>>,
    },
    /// Close the connection; fail every queued request.
    Close,
}

struct RequestContext {
    request: RequestKind,
    reply: oneshot::Sender<Result<(), CoreError>>,
}

/// Static parameters the dispatcher needs to drive a TLS upgrade, supplied
/// once at construction.
pub struct TlsUpgradeParams {
    /// Connector used to perform the rustls handshake.
    pub connector: TlsConnector,
    /// Server name for SNI / certificate validation.
    pub server_name: String,
}

/// Owns the request queue, connection state, and transport for one
/// connection. Runs as a single `tokio::task`; all mutable state below is
/// private to that task.
pub struct Dispatcher<S> {
    queue: VecDeque<RequestContext>,
    state: ConnectionState,
    transport: Option<Transport<S>>,
    tls: Option<TlsUpgradeParams>,
    max_packet_size: usize,
    command_rx: mpsc::UnboundedReceiver<DispatcherCommand>,
    idle_packets: Option<broadcast::Sender<Packet>>,
}

impl<S> Dispatcher<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Create a dispatcher over `transport`. `tls` is `None` when the
    /// caller has not configured TLS; a subsequent `sslKickoff` then fails
    /// with a protocol error instead of silently skipping encryption.
    /// `max_packet_size` is re-applied to the codec built for the
    /// post-handshake transport, so the negotiated packet size limit
    /// still holds after a TLS upgrade.
    #[must_use]
    pub fn new(
        transport: Transport<S>,
        tls: Option<TlsUpgradeParams>,
        max_packet_size: usize,
        command_rx: mpsc::UnboundedReceiver<DispatcherCommand>,
        idle_packets: Option<broadcast::Sender<Packet>>,
    ) -> Self {
        Self {
            queue: VecDeque::new(),
            state: ConnectionState::Start,
            transport: Some(transport),
            tls,
            max_packet_size,
            command_rx,
            idle_packets,
        }
    }

    /// Run the dispatcher loop to completion (returns once the connection
    /// closes, whether cleanly or due to a fatal error).
    pub async fn run(mut self) {
        loop {
            let transport = match self.transport.as_mut() {
                Some(t) => t,
                None => break,
            };

            tokio::select! {
                biased;

                command = self.command_rx.recv() => {
                    match command {
                        Some(DispatcherCommand::Submit { request, reply }) => {
                            self.enqueue(request, reply).await;
                        }
                        Some(DispatcherCommand::Close) | None => {
                            self.close(CoreError::ConnectionClosed).await;
                            break;
                        }
                    }
                }

                packet = transport.read_packet() => {
                    match packet {
                        Ok(Some(packet)) => self.handle_inbound(packet).await,
                        Ok(None) => {
                            self.close(CoreError::ConnectionClosed).await;
                            break;
                        }
                        Err(e) => {
                            self.close(e).await;
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn enqueue(&mut self, request: RequestKind, reply: oneshot::Sender<Result<(), CoreError>>) {
        request.log();
        let was_idle = self.queue.is_empty();
        self.queue.push_back(RequestContext { request, reply });
        if was_idle {
            self.start_active().await;
        }
    }

    async fn start_active(&mut self) {
        let Some(ctx) = self.queue.front_mut() else {
            return;
        };
        let packets = ctx.request.start();
        if let Err(e) = self.write_all(packets).await {
            self.fail_active(e).await;
        }
    }

    async fn write_all(&mut self, packets: Vec<Packet>) -> Result<(), CoreError> {
        for packet in packets {
            self.state = self.state.on_outbound(packet.header.packet_type);
            let transport = self.transport.as_mut().expect("transport present while running");
            transport.write_packet(packet).await?;
        }
        Ok(())
    }

    async fn handle_inbound(&mut self, packet: Packet) {
        if self.queue.is_empty() {
            if let Some(tx) = &self.idle_packets {
                let _ = tx.send(packet);
            }
            return;
        }

        self.state = self.state.on_inbound(packet.header.packet_type);

        let outcome = {
            let ctx = self.queue.front_mut().expect("queue non-empty");
            ctx.request.respond(&packet)
        };

        match outcome {
            Ok(RequestOutcome::AwaitMore) => {}
            Ok(RequestOutcome::Send(packets)) => {
                if let Err(e) = self.write_all(packets).await {
                    self.fail_active(e).await;
                }
            }
            Ok(RequestOutcome::InstallTls) => {
                self.install_tls().await;
            }
            Ok(RequestOutcome::Complete) => {
                self.complete_active(Ok(())).await;
            }
            Err(e) => {
                self.fail_active(e).await;
            }
        }
    }

    async fn install_tls(&mut self) {
        if !self.state.can_start_tls_upgrade() {
            self.fail_active(CoreError::protocol(
                "TLS upgrade requested outside the PRELOGIN response state",
            ))
            .await;
            return;
        }

        let Some(params) = self.tls.as_ref() else {
            self.fail_active(CoreError::protocol(
                "Encryption was requested but a TLS configuration was not provided.",
            ))
            .await;
            return;
        };

        self.state = ConnectionState::SslHandshakeStarted;
        let transport = self.transport.take().expect("transport present while running");

        let transport = match transport.begin_tls_handshake() {
            Ok(t) => t,
            Err(e) => {
                self.fail_active(e).await;
                return;
            }
        };

        match transport
            .complete_tls_handshake(&params.connector, &params.server_name, self.max_packet_size)
            .await
        {
            Ok(t) => {
                self.transport = Some(t);
                self.state = ConnectionState::SslHandshakeComplete;
                self.complete_active(Ok(())).await;
            }
            Err(e) => {
                self.transport = None;
                self.fail_active(e).await;
            }
        }
    }

    async fn complete_active(&mut self, result: Result<(), CoreError>) {
        if let Some(ctx) = self.queue.pop_front() {
            let _ = ctx.reply.send(result);
        }
        self.start_active().await;
    }

    async fn fail_active(&mut self, error: CoreError) {
        if let Some(ctx) = self.queue.pop_front() {
            let _ = ctx.reply.send(Err(error.clone()));
        }
        self.close(error).await;
    }

    async fn close(&mut self, error: CoreError) {
        while let Some(ctx) = self.queue.pop_front() {
            let _ = ctx.reply.send(Err(error.clone()));
        }
        self.transport = None;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::request::PreLoginRequest;
    use crate::transport::Transport;
    use tds_codec::framed::PacketStream;
    use tds_protocol::packet::DEFAULT_PACKET_SIZE;
    use tds_protocol::prelogin::{EncryptionLevel, PreLogin};
    use tokio::io::duplex;

    #[tokio::test]
    async fn close_fails_queued_requests() {
        let (client, _server) = duplex(4096);
        let transport = Transport::Plain(PacketStream::new(client));
        let (_cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let mut dispatcher = Dispatcher::new(transport, None, DEFAULT_PACKET_SIZE, cmd_rx, None);

        let (reply_tx, reply_rx) = oneshot::channel();
        let request = RequestKind::PreLogin(PreLoginRequest::new(
            PreLogin::new().with_encryption(EncryptionLevel::NotSupported),
        ));
        dispatcher.enqueue(request, reply_tx).await;
        dispatcher.close(CoreError::ConnectionClosed).await;

        let result = reply_rx.await.unwrap();
        assert!(matches!(result, Err(CoreError::ConnectionClosed)));
    }
}

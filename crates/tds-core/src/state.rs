//! Connection lifecycle state.

use tds_protocol::packet::PacketType;

/// The connection's position in the login lifecycle.
///
/// States are totally ordered; the connection only ever moves forward.
/// Represented as a flat runtime enum rather than a type-state, since the
/// dispatcher itself must inspect and branch on the current state at
/// runtime (it isn't known at compile time which packets arrive when).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectionState {
    /// No packets exchanged yet.
    Start,
    /// The initial PRELOGIN packet has been sent.
    SentInitialPreLogin,
    /// The server's PRELOGIN response has been received.
    ReceivedPreLoginResponse,
    /// The TLS handshake has been kicked off.
    SslHandshakeStarted,
    /// The TLS handshake completed and the transport is now encrypted.
    SslHandshakeComplete,
    /// The LOGIN7 packet has been sent.
    SentLogin,
    /// The server's login response has been received; the connection is
    /// ready to carry application requests.
    LoggedIn,
}

impl ConnectionState {
    /// Whether a TLS upgrade may be started from this state.
    #[must_use]
    pub fn can_start_tls_upgrade(self) -> bool {
        self == Self::ReceivedPreLoginResponse
    }

    /// Advance the state given the direction and packet type observed.
    ///
    /// Only the edges the pipeline enforces are modeled here; any other
    /// `(state, packet_type)` pair leaves the state unchanged. TLS-engine
    /// driven transitions (`sslHandshakeStarted` -> `sslHandshakeComplete`)
    /// and the internal `sslKickoff` sentinel are applied directly by the
    /// dispatcher rather than through this table, since they don't
    /// correspond to an observed wire packet.
    #[must_use]
    pub fn on_outbound(self, packet_type: PacketType) -> Self {
        match (self, packet_type) {
            (Self::Start, PacketType::PreLogin) => Self::SentInitialPreLogin,
            (state, PacketType::Tds7Login) if state >= Self::ReceivedPreLoginResponse => {
                Self::SentLogin
            }
            (state, _) => state,
        }
    }

    /// Advance the state given an inbound packet type.
    #[must_use]
    pub fn on_inbound(self, packet_type: PacketType) -> Self {
        match (self, packet_type) {
            (Self::SentInitialPreLogin, PacketType::PreLogin) => Self::ReceivedPreLoginResponse,
            (_, PacketType::TabularResult) => Self::LoggedIn,
            (state, _) => state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_ordering_is_total() {
        assert!(ConnectionState::Start < ConnectionState::SentInitialPreLogin);
        assert!(ConnectionState::SentInitialPreLogin < ConnectionState::ReceivedPreLoginResponse);
        assert!(ConnectionState::ReceivedPreLoginResponse < ConnectionState::SslHandshakeStarted);
        assert!(ConnectionState::SslHandshakeStarted < ConnectionState::SslHandshakeComplete);
        assert!(ConnectionState::SslHandshakeComplete < ConnectionState::SentLogin);
        assert!(ConnectionState::SentLogin < ConnectionState::LoggedIn);
    }

    #[test]
    fn prelogin_sent_advances_state() {
        let state = ConnectionState::Start.on_outbound(PacketType::PreLogin);
        assert_eq!(state, ConnectionState::SentInitialPreLogin);
    }

    #[test]
    fn prelogin_response_advances_state() {
        let state =
            ConnectionState::SentInitialPreLogin.on_inbound(PacketType::PreLogin);
        assert_eq!(state, ConnectionState::ReceivedPreLoginResponse);
    }

    #[test]
    fn tls_upgrade_only_allowed_after_prelogin_response() {
        assert!(!ConnectionState::Start.can_start_tls_upgrade());
        assert!(ConnectionState::ReceivedPreLoginResponse.can_start_tls_upgrade());
        assert!(!ConnectionState::SslHandshakeStarted.can_start_tls_upgrade());
    }

    #[test]
    fn login_sent_requires_prior_prelogin_response() {
        let unchanged = ConnectionState::Start.on_outbound(PacketType::Tds7Login);
        assert_eq!(unchanged, ConnectionState::Start);

        let advanced =
            ConnectionState::ReceivedPreLoginResponse.on_outbound(PacketType::Tds7Login);
        assert_eq!(advanced, ConnectionState::SentLogin);
    }

    #[test]
    fn login_response_reaches_logged_in() {
        let state = ConnectionState::SentLogin.on_inbound(PacketType::TabularResult);
        assert_eq!(state, ConnectionState::LoggedIn);
    }
}

//! Client connection lifecycle.

/// Connection state.
///
/// Moves forward only, `Connecting -> HandshakeSent -> Open -> Closing -> Closed`,
/// except that any state may drop straight to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ConnectionState {
    /// Transport connect in flight.
    #[default]
    Connecting,
    /// Upgrade request written, waiting for the response.
    HandshakeSent,
    /// Handshake accepted; frames flow both ways.
    Open,
    /// A Close frame was sent or received; waiting for the transport to finish.
    Closing,
    /// Terminal.
    Closed,
}

impl ConnectionState {
    /// Whether moving from `self` to `next` respects the lifecycle order.
    #[must_use]
    pub const fn can_transition_to(self, next: ConnectionState) -> bool {
        match (self, next) {
            (ConnectionState::Closed, _) => false,
            (_, ConnectionState::Closed) => true,
            (ConnectionState::Connecting, ConnectionState::HandshakeSent)
            | (ConnectionState::HandshakeSent, ConnectionState::Open)
            | (ConnectionState::Open, ConnectionState::Closing) => true,
            _ => false,
        }
    }

    /// Everything except `Closed`.
    #[must_use]
    #[inline]
    pub const fn is_active(&self) -> bool {
        !matches!(self, ConnectionState::Closed)
    }

    /// Application data may be sent only while `Open`.
    #[must_use]
    #[inline]
    pub const fn can_send(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ConnectionState::Connecting => "Connecting",
            ConnectionState::HandshakeSent => "HandshakeSent",
            ConnectionState::Open => "Open",
            ConnectionState::Closing => "Closing",
            ConnectionState::Closed => "Closed",
        })
    }
}

//! Events reported to the application.

use crate::error::Error;
use crate::message::CloseFrame;

/// Something the application should hear about, in stream order.
///
/// `Disconnect` is always the last event of a connection and is reported
/// exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Event {
    /// Handshake accepted; the connection is open.
    Connect,
    /// A complete text message.
    Message(String),
    /// A complete binary message.
    Binary(Vec<u8>),
    /// Ping from the server. The Pong reply is already queued.
    Ping(Vec<u8>),
    /// Pong from the server.
    Pong(Vec<u8>),
    /// The server started or completed the closing handshake.
    Close(Option<CloseFrame>),
    /// A fatal failure. `Disconnect` follows.
    Error(Error),
    /// The connection is closed.
    Disconnect,
}

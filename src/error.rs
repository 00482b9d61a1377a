//! Error types for the WebSocket client.
//!
//! Errors fall into three families that match how the connection reacts:
//! handshake errors end the connection attempt, protocol errors end an open
//! connection, and transport errors are passed through from the byte stream.

use thiserror::Error;

use crate::connection::ConnectionState;
use crate::message::CloseCode;

/// Result type alias for WebSocket operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures while validating the server's upgrade response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum HandshakeError {
    /// The status line did not match `HTTP/<version> <code> <reason>`.
    #[error("The server responded with a malformed handshake")]
    MalformedResponse,

    /// The server answered with something other than `101`.
    #[error("The server responded with an unexpected status code: {code} {reason}")]
    UnexpectedStatus {
        /// Numeric status code.
        code: u16,
        /// Reason phrase from the status line.
        reason: String,
    },

    /// `Upgrade` header missing or not `websocket`.
    #[error("The response handshake's Upgrade header is invalid")]
    InvalidUpgradeHeader,

    /// `Connection` header missing or not `upgrade`.
    #[error("The response handshake's Connection header is invalid")]
    InvalidConnectionHeader,

    /// `Sec-WebSocket-Accept` missing or not derived from our key.
    #[error("The Sec-WebSocket-Accept value is invalid in the response handshake")]
    InvalidAcceptKey,

    /// No header terminator within the configured handshake size.
    #[error("Handshake response too large: {size} bytes (max: {max})")]
    ResponseTooLarge {
        /// Bytes buffered so far.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// A caller-supplied request header contains CR or LF.
    #[error("Invalid value for request header {header}: contains CR or LF")]
    InvalidHeaderValue {
        /// Offending header name.
        header: String,
    },

    /// The server did not answer within the handshake timeout.
    #[error("Handshake timed out")]
    Timeout,
}

/// Framing violations detected on an open connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProtocolError {
    /// Reserved bits set without a negotiated extension.
    #[error("Reserved bits set without negotiated extension")]
    ReservedBitsSet,

    /// Server-to-client frame carried a mask.
    #[error("Server frame must not be masked")]
    MaskedServerFrame,

    /// Client-to-server frame arrived without a mask.
    #[error("Client frame must be masked")]
    UnmaskedClientFrame,

    /// Control frame declared more than 125 payload bytes.
    #[error("Control frame payload too large: {0} bytes (max: 125)")]
    OversizedControlFrame(u64),

    /// 64-bit length with the most significant bit set.
    #[error("Invalid extended payload length")]
    InvalidExtendedLength,

    /// A new data frame started while a fragmented message was open.
    #[error("Data frame started while a fragmented message is in progress")]
    UnexpectedFragmentStart,

    /// Continuation frame without a fragmented message to continue.
    #[error("Unexpected continuation frame")]
    UnexpectedContinuation,

    /// Opcode 0x3-0x7 or 0xB-0xF.
    #[error("Reserved opcode: {0:#x}")]
    ReservedOpcode(u8),

    /// Control frame with FIN=0.
    #[error("Control frames cannot be fragmented")]
    FragmentedControlFrame,

    /// Frame payload exceeds the configured maximum.
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge {
        /// Declared payload size.
        size: u64,
        /// Maximum allowed size.
        max: usize,
    },

    /// Reassembled message exceeds the configured maximum.
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge {
        /// Size so far.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Fragmented message split over too many frames.
    #[error("Too many fragments: {count} (max: {max})")]
    TooManyFragments {
        /// Fragment count so far.
        count: usize,
        /// Maximum allowed fragments.
        max: usize,
    },

    /// Text message is not valid UTF-8.
    #[error("Invalid UTF-8 in text message")]
    InvalidUtf8,

    /// Close frame body is malformed.
    #[error("Invalid close frame payload")]
    InvalidClosePayload,
}

impl ProtocolError {
    /// Close status to report to the peer when this error ends the connection.
    #[must_use]
    pub const fn close_code(&self) -> CloseCode {
        match self {
            ProtocolError::InvalidUtf8 => CloseCode::InvalidPayload,
            ProtocolError::FrameTooLarge { .. }
            | ProtocolError::MessageTooLarge { .. }
            | ProtocolError::TooManyFragments { .. } => CloseCode::MessageTooBig,
            _ => CloseCode::ProtocolError,
        }
    }
}

/// Errors that can occur during WebSocket operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Upgrade handshake failed.
    #[error("Handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    /// Peer violated the framing protocol.
    #[error("Protocol violation: {0}")]
    Protocol(#[from] ProtocolError),

    /// Transport failure, passed through verbatim.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Connection has been closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Close code that must not appear in a Close frame.
    #[error("Invalid close code: {0}")]
    InvalidCloseCode(u16),

    /// The operating system's random source failed.
    #[error("Random source unavailable: {0}")]
    Entropy(String),

    /// Operation not valid in the current connection state.
    #[error("Operation not permitted in state {0}")]
    InvalidState(ConnectionState),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

impl From<getrandom::Error> for Error {
    fn from(err: getrandom::Error) -> Self {
        Error::Entropy(err.to_string())
    }
}

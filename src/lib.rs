//! # wsclient - WebSocket client protocol engine
//!
//! `wsclient` implements the client side of RFC 6455 over any reliable,
//! ordered byte stream.
//!
//! ## Layers
//!
//! - [`protocol`]: sans-io handshake, frame codec and stream reassembly
//! - [`connection`]: the [`ConnectionController`] state machine, also sans-io
//! - [`client`]: [`WebSocketClient`], a tokio driver for the controller
//!   (feature `async-tokio`, on by default)
//!
//! The protocol core never blocks and never assumes how many bytes a read
//! delivers: frames split across reads, or several frames in one read, come
//! out as the same sequence of events.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use wsclient::{Config, ConnectionOptions, Event, WebSocketClient};
//!
//! let options = ConnectionOptions::new("localhost", 9001);
//! let mut client = WebSocketClient::connect(options, Config::default()).await?;
//! while let Some(event) = client.next_event().await {
//!     println!("{event:?}");
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod event;
pub mod message;
pub mod protocol;

#[cfg(feature = "async-tokio")]
pub mod client;

#[cfg(feature = "async-tokio")]
pub use client::WebSocketClient;
pub use config::{Config, ConnectionOptions, Limits, Timeouts};
pub use connection::{ConnectionController, ConnectionState, Role};
pub use error::{Error, HandshakeError, ProtocolError, Result};
pub use event::Event;
pub use message::{CloseCode, CloseFrame, Message};
pub use protocol::{OpCode, WS_GUID, compute_accept_key};

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn test_public_types_are_send() {
        assert_send::<Error>();
        assert_send::<Config>();
        assert_send::<ConnectionOptions>();
        assert_send::<Event>();
        assert_send::<Message>();
        assert_send::<CloseFrame>();
        assert_send::<ConnectionController>();
    }

    #[test]
    fn test_public_types_are_sync() {
        assert_sync::<Error>();
        assert_sync::<Config>();
        assert_sync::<ConnectionOptions>();
        assert_sync::<Event>();
        assert_sync::<Message>();
        assert_sync::<CloseFrame>();
        assert_sync::<ConnectionController>();
    }

    #[cfg(feature = "async-tokio")]
    #[test]
    fn test_client_is_send() {
        assert_send::<WebSocketClient<tokio::net::TcpStream>>();
    }
}

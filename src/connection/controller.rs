//! Sans-io connection state machine.
//!
//! [`ConnectionController`] never touches a socket. The transport reports what
//! happened through the `on_*` callbacks; the controller answers with bytes to
//! write ([`poll_transmit`](ConnectionController::poll_transmit)), events for
//! the application ([`poll_event`](ConnectionController::poll_event)) and a
//! request to shut the transport down
//! ([`wants_shutdown`](ConnectionController::wants_shutdown)).

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};

use crate::config::{Config, ConnectionOptions};
use crate::connection::fragmenter::MessageFragmenter;
use crate::connection::{ConnectionState, Role};
use crate::error::{Error, HandshakeError, Result};
use crate::event::Event;
use crate::message::{CloseCode, CloseFrame, Message};
use crate::protocol::frame::MAX_HEADER_SIZE;
use crate::protocol::handshake::ClientHandshake;
use crate::protocol::{Frame, FrameEncoder, Inbound, OpCode, StreamReassembler};

/// Drives one client connection from transport connect to `Closed`.
#[derive(Debug)]
pub struct ConnectionController {
    options: ConnectionOptions,
    config: Config,
    state: ConnectionState,
    handshake: Option<ClientHandshake>,
    reassembler: StreamReassembler,
    encoder: FrameEncoder,
    /// A Close frame has been queued, by us or as an echo.
    close_sent: bool,
    outbound: BytesMut,
    events: VecDeque<Event>,
    shutdown_requested: bool,
}

impl ConnectionController {
    #[must_use]
    pub fn new(options: ConnectionOptions, config: Config) -> Self {
        let reassembler = StreamReassembler::with_role(Role::Client, &config);
        Self {
            options,
            config,
            state: ConnectionState::Connecting,
            handshake: None,
            reassembler,
            encoder: FrameEncoder::new(Role::Client),
            close_sent: false,
            outbound: BytesMut::new(),
            events: VecDeque::new(),
            shutdown_requested: false,
        }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The transport connected: queue the upgrade request.
    pub fn on_connect(&mut self) {
        if self.state != ConnectionState::Connecting {
            tracing::warn!(state = %self.state, "transport connect reported twice");
            return;
        }

        let prepared = ClientHandshake::new().and_then(|handshake| {
            let request = handshake.build_request(&self.options)?;
            Ok((handshake, request))
        });

        match prepared {
            Ok((handshake, request)) => {
                self.outbound.extend_from_slice(&request);
                self.handshake = Some(handshake);
                self.transition(ConnectionState::HandshakeSent);
            }
            Err(err) => self.fail(err),
        }
    }

    /// Bytes arrived from the transport.
    pub fn on_data(&mut self, chunk: &[u8]) {
        match self.state {
            ConnectionState::Connecting => {
                tracing::warn!("data received before transport connect, dropping");
                return;
            }
            ConnectionState::Closed => return,
            _ => {}
        }

        if let Err(err) = self.reassembler.extend(chunk) {
            self.fail(err);
            return;
        }

        while self.state.is_active() {
            match self.reassembler.next_event() {
                Ok(Some(Inbound::HandshakeResponse(head))) => self.on_handshake_response(&head),
                Ok(Some(Inbound::Message(message))) => self.on_message(message),
                Ok(None) => break,
                Err(err) => self.fail(err),
            }
        }
    }

    /// The transport closed.
    pub fn on_close(&mut self) {
        match self.state {
            ConnectionState::Closed => {}
            ConnectionState::Connecting | ConnectionState::HandshakeSent => {
                self.outbound.clear();
                self.fail(Error::ConnectionClosed);
            }
            ConnectionState::Open | ConnectionState::Closing => {
                self.outbound.clear();
                self.enter_closed();
            }
        }
    }

    /// The transport failed. The reason is surfaced verbatim.
    pub fn on_error(&mut self, reason: impl Into<String>) {
        self.outbound.clear();
        self.fail(Error::Transport(reason.into()));
    }

    /// No complete handshake response arrived in time.
    pub fn on_handshake_timeout(&mut self) {
        if self.state == ConnectionState::HandshakeSent {
            self.fail(HandshakeError::Timeout.into());
        }
    }

    /// Give up on the closing handshake and drop the connection.
    pub fn force_close(&mut self) {
        if self.state.is_active() {
            tracing::warn!(state = %self.state, "forcing connection closed");
            self.outbound.clear();
            self.enter_closed();
        }
    }

    /// Queue a text message, fragmented if larger than `fragment_size`.
    ///
    /// # Errors
    ///
    /// - `Error::ConnectionClosed` once closing has begun
    /// - `Error::InvalidState` before the handshake completes
    /// - `Error::Entropy` if no masking key could be drawn
    pub fn send_text(&mut self, text: &str) -> Result<()> {
        self.send_data(OpCode::Text, Bytes::copy_from_slice(text.as_bytes()))
    }

    /// Queue a binary message, fragmented if larger than `fragment_size`.
    ///
    /// # Errors
    ///
    /// Same as [`send_text`](Self::send_text).
    pub fn send_binary(&mut self, data: &[u8]) -> Result<()> {
        self.send_data(OpCode::Binary, Bytes::copy_from_slice(data))
    }

    /// Queue a Ping.
    ///
    /// # Errors
    ///
    /// `Error::Protocol` if `payload` exceeds 125 bytes, otherwise as
    /// [`send_text`](Self::send_text).
    pub fn ping(&mut self, payload: &[u8]) -> Result<()> {
        self.ensure_open()?;
        self.queue_frame(Frame::ping(Bytes::copy_from_slice(payload)))
    }

    /// Queue an unsolicited Pong.
    ///
    /// # Errors
    ///
    /// Same as [`ping`](Self::ping).
    pub fn pong(&mut self, payload: &[u8]) -> Result<()> {
        self.ensure_open()?;
        self.queue_frame(Frame::pong(Bytes::copy_from_slice(payload)))
    }

    /// Start the closing handshake.
    ///
    /// Data frames received afterwards are dropped; the connection closes when
    /// the server echoes the Close or the transport goes away.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidState` unless the connection is `Open`
    /// - `Error::InvalidCloseCode` for a code that may not be sent
    /// - `Error::Protocol` if `reason` exceeds 123 bytes
    pub fn close(&mut self, code: CloseCode, reason: &str) -> Result<()> {
        if self.state != ConnectionState::Open {
            return Err(Error::InvalidState(self.state));
        }
        if code.is_reserved() || !code.is_valid() {
            return Err(Error::InvalidCloseCode(code.as_u16()));
        }

        self.queue_frame(Frame::close(Some(code.as_u16()), reason))?;
        self.close_sent = true;
        self.transition(ConnectionState::Closing);
        Ok(())
    }

    /// Take everything queued for the transport.
    pub fn poll_transmit(&mut self) -> Option<Bytes> {
        if self.outbound.is_empty() {
            None
        } else {
            Some(self.outbound.split().freeze())
        }
    }

    /// Take the next event for the application.
    pub fn poll_event(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    /// Whether the transport should be shut down once queued bytes are written.
    #[must_use]
    pub fn wants_shutdown(&self) -> bool {
        self.shutdown_requested
    }

    fn on_handshake_response(&mut self, head: &[u8]) {
        let Some(handshake) = self.handshake.take() else {
            self.fail(Error::InvalidState(self.state));
            return;
        };

        match handshake.validate_response(head) {
            Ok(()) => {
                tracing::debug!(host = %self.options.host, path = %self.options.path, "handshake accepted");
                self.transition(ConnectionState::Open);
                self.reassembler.begin_frames();
                self.events.push_back(Event::Connect);
            }
            Err(err) => self.fail(err.into()),
        }
    }

    fn on_message(&mut self, message: Message) {
        if self.state == ConnectionState::Closing {
            match message {
                Message::Close(frame) => {
                    tracing::debug!("closing handshake complete");
                    self.events.push_back(Event::Close(frame));
                    self.reassembler.halt();
                    self.shutdown_requested = true;
                }
                other => {
                    tracing::trace!(control = other.is_control(), "dropping message received while closing");
                }
            }
            return;
        }

        match message {
            Message::Text(text) => self.events.push_back(Event::Message(text)),
            Message::Binary(data) => self.events.push_back(Event::Binary(data)),
            Message::Ping(payload) => {
                if let Err(err) = self.queue_frame(Frame::pong(payload.clone())) {
                    self.fail(err);
                    return;
                }
                self.events.push_back(Event::Ping(payload));
            }
            Message::Pong(payload) => self.events.push_back(Event::Pong(payload)),
            Message::Close(frame) => self.on_peer_close(frame),
        }
    }

    fn on_peer_close(&mut self, frame: Option<CloseFrame>) {
        let echo = Frame::close(frame.as_ref().map(|f| f.code.as_u16()), "");
        if let Err(err) = self.queue_frame(echo) {
            self.fail(err);
            return;
        }
        self.close_sent = true;
        self.reassembler.halt();
        self.transition(ConnectionState::Closing);
        self.events.push_back(Event::Close(frame));
    }

    fn send_data(&mut self, opcode: OpCode, payload: Bytes) -> Result<()> {
        self.ensure_open()?;

        let fragmenter = MessageFragmenter::new(payload, opcode, self.config.fragment_size);
        if fragmenter.needs_fragmentation() {
            tracing::debug!(
                %opcode,
                len = fragmenter.remaining(),
                frames = fragmenter.len(),
                "fragmenting outgoing message"
            );
        }

        // Encode the whole message before queueing any of it.
        let mut encoded =
            BytesMut::with_capacity(fragmenter.remaining() + fragmenter.len() * MAX_HEADER_SIZE);
        for frame in fragmenter {
            self.encoder.encode(frame, &mut encoded)?;
        }
        self.outbound.extend_from_slice(&encoded);
        Ok(())
    }

    fn queue_frame(&mut self, frame: Frame) -> Result<()> {
        self.encoder.encode(frame, &mut self.outbound)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state.can_send() {
            return Ok(());
        }
        match self.state {
            ConnectionState::Closing | ConnectionState::Closed => Err(Error::ConnectionClosed),
            other => Err(Error::InvalidState(other)),
        }
    }

    fn fail(&mut self, err: Error) {
        if self.state == ConnectionState::Closed {
            return;
        }
        tracing::warn!(state = %self.state, error = %err, "closing connection after fatal error");

        if let Error::Protocol(protocol) = &err {
            if self.state == ConnectionState::Open && !self.close_sent {
                let code = protocol.close_code().as_u16();
                match self.queue_frame(Frame::close(Some(code), "")) {
                    Ok(()) => self.close_sent = true,
                    Err(close_err) => {
                        tracing::warn!(error = %close_err, "could not queue close frame");
                    }
                }
            }
        }

        self.events.push_back(Event::Error(err));
        self.enter_closed();
    }

    fn enter_closed(&mut self) {
        self.reassembler.halt();
        self.handshake = None;
        self.transition(ConnectionState::Closed);
        self.shutdown_requested = true;
        self.events.push_back(Event::Disconnect);
    }

    fn transition(&mut self, next: ConnectionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid transition {} -> {}",
            self.state,
            next
        );
        tracing::debug!(from = %self.state, to = %next, "connection state changed");
        self.state = next;
    }
}

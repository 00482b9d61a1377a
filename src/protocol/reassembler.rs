//! Incoming byte stream to handshake response and messages.
//!
//! The transport delivers bytes in chunks whose boundaries have nothing to do
//! with the protocol. [`StreamReassembler`] buffers them and hands out one
//! [`Inbound`] event at a time: first the handshake response head, then
//! complete messages. Nothing is lost or repeated however the stream is split.

use bytes::{Buf, Bytes, BytesMut};

use crate::config::{Config, Limits};
use crate::connection::Role;
use crate::error::{Error, HandshakeError, Result};
use crate::message::Message;
use crate::protocol::assembler::MessageAssembler;
use crate::protocol::frame::{Decoded, FrameDecoder};

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// An event recovered from the byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Response head up to, not including, the blank line.
    HandshakeResponse(Bytes),
    /// A complete data message or a control message.
    Message(Message),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Handshake,
    Frames,
    Halted,
}

/// Owns the receive buffer of one connection.
///
/// Bytes between `cursor` and the end of `buffer` are received but not yet
/// decoded. The consumed prefix is discarded once it is all of the buffer or
/// reaches `compact_threshold`, so the buffer holds roughly one in-flight
/// frame plus whatever backlog the transport delivered.
#[derive(Debug)]
pub struct StreamReassembler {
    buffer: BytesMut,
    cursor: usize,
    /// Bytes after `cursor` already searched for the header terminator.
    scanned: usize,
    phase: Phase,
    decoder: FrameDecoder,
    assembler: MessageAssembler,
    limits: Limits,
    compact_threshold: usize,
    failure: Option<Error>,
}

impl StreamReassembler {
    /// Reassembler for the client end of a connection.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self::with_role(Role::Client, config)
    }

    /// Reassembler decoding frames as `role` receives them.
    #[must_use]
    pub fn with_role(role: Role, config: &Config) -> Self {
        Self {
            buffer: BytesMut::with_capacity(config.read_buffer_size),
            cursor: 0,
            scanned: 0,
            phase: Phase::Handshake,
            decoder: FrameDecoder::new(role, config.limits.clone()),
            assembler: MessageAssembler::new(config.limits.clone()),
            limits: config.limits.clone(),
            compact_threshold: config.compact_threshold,
            failure: None,
        }
    }

    /// Append a chunk delivered by the transport.
    ///
    /// Chunks arriving after [`halt`](Self::halt) are dropped.
    ///
    /// # Errors
    ///
    /// Returns the stored error if decoding already failed.
    pub fn extend(&mut self, chunk: &[u8]) -> Result<()> {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        if self.phase != Phase::Halted {
            self.buffer.extend_from_slice(chunk);
        }
        Ok(())
    }

    /// Produce the next event the buffered bytes allow, or `None` until more
    /// bytes arrive.
    ///
    /// # Errors
    ///
    /// A handshake size violation or protocol error is fatal: it is returned
    /// now and on every later call, and no further bytes are processed.
    pub fn next_event(&mut self) -> Result<Option<Inbound>> {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }

        let result = match self.phase {
            Phase::Handshake => self.next_handshake(),
            Phase::Frames => self.next_message(),
            Phase::Halted => Ok(None),
        };

        if let Err(err) = &result {
            self.failure = Some(err.clone());
            self.discard();
        }
        result
    }

    /// Switch from handshake text to frame decoding. Bytes already buffered
    /// after the response head are decoded as frames.
    pub fn begin_frames(&mut self) {
        if self.phase == Phase::Handshake {
            self.phase = Phase::Frames;
            self.scanned = 0;
        }
    }

    /// Stop producing events and drop buffered data.
    pub fn halt(&mut self) {
        self.phase = Phase::Halted;
        self.discard();
    }

    /// Bytes received but not yet turned into events.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len() - self.cursor
    }

    /// Whether a fragmented message is in progress.
    #[must_use]
    pub fn is_assembling(&self) -> bool {
        self.assembler.is_assembling()
    }

    fn next_handshake(&mut self) -> Result<Option<Inbound>> {
        let pending = &self.buffer[self.cursor..];
        // The terminator may straddle the previous scan boundary.
        let start = self.scanned.saturating_sub(HEADER_TERMINATOR.len() - 1);

        let found = pending[start..]
            .windows(HEADER_TERMINATOR.len())
            .position(|w| w == HEADER_TERMINATOR)
            .map(|pos| start + pos);

        let Some(end) = found else {
            self.scanned = pending.len();
            // The tail may be the start of the terminator, so only the rest
            // is certain to belong to the head.
            let head_len = pending.len().saturating_sub(HEADER_TERMINATOR.len() - 1);
            if head_len > self.limits.max_handshake_size {
                return Err(HandshakeError::ResponseTooLarge {
                    size: head_len,
                    max: self.limits.max_handshake_size,
                }
                .into());
            }
            return Ok(None);
        };

        if end > self.limits.max_handshake_size {
            return Err(HandshakeError::ResponseTooLarge {
                size: end,
                max: self.limits.max_handshake_size,
            }
            .into());
        }

        let head = Bytes::copy_from_slice(&pending[..end]);
        self.cursor += end + HEADER_TERMINATOR.len();
        self.scanned = 0;
        self.compact();

        tracing::trace!(len = head.len(), "handshake response head received");
        Ok(Some(Inbound::HandshakeResponse(head)))
    }

    fn next_message(&mut self) -> Result<Option<Inbound>> {
        loop {
            match self.decoder.decode(&self.buffer[self.cursor..])? {
                Decoded::Incomplete { needed } => {
                    tracing::trace!(buffered = self.buffered(), needed, "waiting for frame bytes");
                    self.compact();
                    return Ok(None);
                }
                Decoded::Frame { frame, consumed } => {
                    tracing::trace!(
                        opcode = %frame.opcode,
                        fin = frame.fin,
                        len = frame.payload().len(),
                        "decoded frame"
                    );
                    self.cursor += consumed;
                    self.compact();

                    if let Some(message) = self.assembler.push(frame)? {
                        return Ok(Some(Inbound::Message(message)));
                    }
                }
            }
        }
    }

    fn compact(&mut self) {
        debug_assert!(self.cursor <= self.buffer.len());
        if self.cursor == self.buffer.len() {
            self.buffer.clear();
            self.cursor = 0;
        } else if self.cursor >= self.compact_threshold {
            self.buffer.advance(self.cursor);
            self.cursor = 0;
        }
    }

    fn discard(&mut self) {
        self.buffer.clear();
        self.cursor = 0;
        self.scanned = 0;
        self.assembler.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtocolError;
    use crate::protocol::{Frame, OpCode};

    fn frames_reassembler(config: &Config) -> StreamReassembler {
        let mut reassembler = StreamReassembler::new(config);
        reassembler.begin_frames();
        reassembler
    }

    fn encoded(frame: &Frame) -> Vec<u8> {
        let mut buf = BytesMut::new();
        frame.encode(&mut buf);
        buf.to_vec()
    }

    fn drain(reassembler: &mut StreamReassembler) -> Vec<Inbound> {
        let mut events = Vec::new();
        while let Some(event) = reassembler.next_event().unwrap() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_handshake_head_then_frames_in_one_chunk() {
        let mut reassembler = StreamReassembler::new(&Config::default());
        let mut data = b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\n\r\n".to_vec();
        data.extend(encoded(&Frame::text("hi")));
        reassembler.extend(&data).unwrap();

        let head = reassembler.next_event().unwrap();
        assert_eq!(
            head,
            Some(Inbound::HandshakeResponse(Bytes::from_static(
                b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket"
            )))
        );

        // Frame bytes are not decoded until the handshake is accepted.
        assert_eq!(reassembler.next_event().unwrap(), None);
        assert_eq!(reassembler.buffered(), 4);

        reassembler.begin_frames();
        assert_eq!(
            reassembler.next_event().unwrap(),
            Some(Inbound::Message(Message::Text("hi".into())))
        );
        assert_eq!(reassembler.buffered(), 0);
    }

    #[test]
    fn test_handshake_terminator_split_across_chunks() {
        let mut reassembler = StreamReassembler::new(&Config::default());
        reassembler.extend(b"HTTP/1.1 101 OK\r\n\r").unwrap();
        assert_eq!(reassembler.next_event().unwrap(), None);
        reassembler.extend(b"\n").unwrap();
        assert_eq!(
            reassembler.next_event().unwrap(),
            Some(Inbound::HandshakeResponse(Bytes::from_static(
                b"HTTP/1.1 101 OK"
            )))
        );
    }

    #[test]
    fn test_handshake_too_large() {
        let config = Config::new().with_limits(Limits::new(1024, 1024, 4, 16));
        let mut reassembler = StreamReassembler::new(&config);
        reassembler.extend(&[b'a'; 20]).unwrap();
        assert_eq!(
            reassembler.next_event(),
            Err(Error::Handshake(HandshakeError::ResponseTooLarge {
                size: 17,
                max: 16
            }))
        );
    }

    #[test]
    fn test_handshake_at_limit_with_split_terminator() {
        let config = Config::new().with_limits(Limits::new(1024, 1024, 4, 16));
        let head = b"HTTP/1.1 101 OKK";
        assert_eq!(head.len(), 16);

        let mut whole = StreamReassembler::new(&config);
        whole.extend(head).unwrap();
        whole.extend(b"\r\n\r\n").unwrap();
        let expected = Some(Inbound::HandshakeResponse(Bytes::from_static(head)));
        assert_eq!(whole.next_event().unwrap(), expected);

        let mut split = StreamReassembler::new(&config);
        split.extend(head).unwrap();
        split.extend(b"\r\n\r").unwrap();
        assert_eq!(split.next_event().unwrap(), None);
        split.extend(b"\n").unwrap();
        assert_eq!(split.next_event().unwrap(), expected);
    }

    #[test]
    fn test_handshake_one_past_limit_fails_before_terminator() {
        let config = Config::new().with_limits(Limits::new(1024, 1024, 4, 16));
        let mut reassembler = StreamReassembler::new(&config);
        reassembler.extend(b"HTTP/1.1 101 OKKK\r\n\r").unwrap();
        assert_eq!(
            reassembler.next_event(),
            Err(Error::Handshake(HandshakeError::ResponseTooLarge {
                size: 17,
                max: 16
            }))
        );
    }

    #[test]
    fn test_byte_at_a_time_delivery() {
        let mut reassembler = frames_reassembler(&Config::default());
        let mut data = encoded(&Frame::binary(vec![7u8; 300]));
        data.extend(encoded(&Frame::ping("p")));

        let mut events = Vec::new();
        for byte in &data {
            reassembler.extend(std::slice::from_ref(byte)).unwrap();
            events.extend(drain(&mut reassembler));
        }

        assert_eq!(
            events,
            vec![
                Inbound::Message(Message::Binary(vec![7u8; 300])),
                Inbound::Message(Message::Ping(b"p".to_vec())),
            ]
        );
        assert_eq!(reassembler.buffered(), 0);
    }

    #[test]
    fn test_several_frames_in_one_chunk_keep_order() {
        let mut reassembler = frames_reassembler(&Config::default());
        let mut data = Vec::new();
        for text in ["one", "two", "three"] {
            data.extend(encoded(&Frame::text(text)));
        }
        data.extend(&encoded(&Frame::text("four"))[..3]);
        reassembler.extend(&data).unwrap();

        let texts: Vec<Inbound> = drain(&mut reassembler);
        assert_eq!(
            texts,
            vec![
                Inbound::Message(Message::Text("one".into())),
                Inbound::Message(Message::Text("two".into())),
                Inbound::Message(Message::Text("three".into())),
            ]
        );
        assert_eq!(reassembler.buffered(), 3);
    }

    #[test]
    fn test_compaction_bounds_buffer() {
        let config = Config::new().with_compact_threshold(16);
        let mut reassembler = frames_reassembler(&config);

        // Each round leaves a partial frame behind so the buffer never empties.
        let frame = encoded(&Frame::binary(vec![1u8; 10]));
        let mut stream = Vec::new();
        for _ in 0..100 {
            stream.extend(&frame);
        }
        for chunk in stream.chunks(17) {
            reassembler.extend(chunk).unwrap();
            drain(&mut reassembler);
            assert!(reassembler.cursor < 16);
            assert!(reassembler.buffer.len() < 16 + 17);
        }
        assert_eq!(reassembler.buffered(), 0);
    }

    #[test]
    fn test_fragmented_message_with_interleaved_ping() {
        let mut reassembler = frames_reassembler(&Config::default());
        let mut data = encoded(&Frame::new(false, OpCode::Text, "Hel"));
        data.extend(encoded(&Frame::ping("mid")));
        data.extend(encoded(&Frame::new(true, OpCode::Continuation, "lo")));
        reassembler.extend(&data).unwrap();

        assert_eq!(
            reassembler.next_event().unwrap(),
            Some(Inbound::Message(Message::Ping(b"mid".to_vec())))
        );
        assert!(reassembler.is_assembling());
        assert_eq!(
            reassembler.next_event().unwrap(),
            Some(Inbound::Message(Message::Text("Hello".into())))
        );
        assert!(!reassembler.is_assembling());
    }

    #[test]
    fn test_protocol_error_is_sticky() {
        let mut reassembler = frames_reassembler(&Config::default());
        let mut data = encoded(&Frame::text("ok"));
        data.extend([0xC2, 0x00]);
        data.extend(encoded(&Frame::text("never")));
        reassembler.extend(&data).unwrap();

        assert!(reassembler.next_event().unwrap().is_some());
        let expected: Result<Option<Inbound>> =
            Err(Error::Protocol(ProtocolError::ReservedBitsSet));
        assert_eq!(reassembler.next_event(), expected);
        assert_eq!(reassembler.next_event(), expected);
        assert_eq!(reassembler.extend(b"more"), expected.map(|_| ()));
        assert_eq!(reassembler.buffered(), 0);
    }

    #[test]
    fn test_unexpected_continuation_surfaces() {
        let mut reassembler = frames_reassembler(&Config::default());
        reassembler
            .extend(&encoded(&Frame::new(true, OpCode::Continuation, "x")))
            .unwrap();
        assert_eq!(
            reassembler.next_event(),
            Err(Error::Protocol(ProtocolError::UnexpectedContinuation))
        );
    }

    #[test]
    fn test_halt_stops_dispatch_of_buffered_frames() {
        let mut reassembler = frames_reassembler(&Config::default());
        let mut data = encoded(&Frame::text("a"));
        data.extend(encoded(&Frame::text("b")));
        reassembler.extend(&data).unwrap();

        assert!(reassembler.next_event().unwrap().is_some());
        reassembler.halt();
        assert_eq!(reassembler.next_event().unwrap(), None);
        reassembler.extend(&encoded(&Frame::text("c"))).unwrap();
        assert_eq!(reassembler.next_event().unwrap(), None);
        assert_eq!(reassembler.buffered(), 0);
    }
}

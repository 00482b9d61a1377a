//! Message reassembly from data frames (RFC 6455 Section 5.4).

use bytes::BytesMut;

use crate::config::Limits;
use crate::error::ProtocolError;
use crate::message::{CloseFrame, Message};
use crate::protocol::{Frame, OpCode};

/// A fragmented message in progress.
#[derive(Debug)]
struct FragmentAccumulator {
    opcode: OpCode,
    buffer: BytesMut,
    fragment_count: usize,
}

/// Turns decoded frames into complete messages.
///
/// At most one fragmented message is open at a time. Control frames pass
/// straight through without touching it.
#[derive(Debug)]
pub struct MessageAssembler {
    current: Option<FragmentAccumulator>,
    limits: Limits,
}

impl MessageAssembler {
    #[must_use]
    pub fn new(limits: Limits) -> Self {
        Self {
            current: None,
            limits,
        }
    }

    /// Add a frame. Returns the message it completes, if any.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::UnexpectedFragmentStart` for a Text/Binary frame while a message is open
    /// - `ProtocolError::UnexpectedContinuation` for a Continuation frame with nothing open
    /// - `ProtocolError::MessageTooLarge` / `TooManyFragments` when limits are exceeded
    /// - `ProtocolError::InvalidUtf8` if a completed text message is not UTF-8
    /// - `ProtocolError::InvalidClosePayload` for a malformed Close body
    pub fn push(&mut self, frame: Frame) -> Result<Option<Message>, ProtocolError> {
        match frame.opcode {
            OpCode::Ping => Ok(Some(Message::Ping(frame.into_payload().to_vec()))),
            OpCode::Pong => Ok(Some(Message::Pong(frame.into_payload().to_vec()))),
            OpCode::Close => Ok(Some(Message::Close(CloseFrame::from_payload(
                frame.payload(),
            )?))),
            OpCode::Text | OpCode::Binary => {
                if self.current.is_some() {
                    return Err(ProtocolError::UnexpectedFragmentStart);
                }
                self.limits.check_message_size(frame.payload().len())?;

                if frame.fin {
                    return complete(frame.opcode, frame.into_payload().to_vec()).map(Some);
                }

                self.limits.check_fragment_count(1)?;
                self.current = Some(FragmentAccumulator {
                    opcode: frame.opcode,
                    buffer: BytesMut::from(frame.payload()),
                    fragment_count: 1,
                });
                Ok(None)
            }
            OpCode::Continuation => {
                let acc = self
                    .current
                    .as_mut()
                    .ok_or(ProtocolError::UnexpectedContinuation)?;

                self.limits.check_fragment_count(acc.fragment_count + 1)?;
                self.limits
                    .check_message_size(acc.buffer.len() + frame.payload().len())?;

                acc.buffer.extend_from_slice(frame.payload());
                acc.fragment_count += 1;

                if !frame.fin {
                    return Ok(None);
                }

                match self.current.take() {
                    Some(acc) => complete(acc.opcode, acc.buffer.to_vec()).map(Some),
                    None => Err(ProtocolError::UnexpectedContinuation),
                }
            }
        }
    }

    /// Whether a fragmented message is open.
    #[must_use]
    pub fn is_assembling(&self) -> bool {
        self.current.is_some()
    }

    /// Drop any partial message.
    pub fn reset(&mut self) {
        self.current = None;
    }
}

fn complete(opcode: OpCode, payload: Vec<u8>) -> Result<Message, ProtocolError> {
    match opcode {
        OpCode::Text => String::from_utf8(payload)
            .map(Message::Text)
            .map_err(|_| ProtocolError::InvalidUtf8),
        _ => Ok(Message::Binary(payload)),
    }
}

//! WebSocket frame encoding and decoding (RFC 6455 Section 5.2).
//!
//! Decoding works on a byte window that may hold less than one frame, exactly
//! one frame, or one frame followed by the start of the next. The decoder never
//! consumes bytes until a whole frame is present and never reads past the frame
//! boundary.

use bytes::{BufMut, Bytes, BytesMut};

use crate::config::Limits;
use crate::connection::Role;
use crate::error::{ProtocolError, Result};
use crate::protocol::OpCode;
use crate::protocol::mask::{apply_mask_fast, generate_mask};

/// Maximum payload size for control frames.
pub const MAX_CONTROL_FRAME_PAYLOAD: usize = 125;

/// Largest possible header: 2 fixed bytes, 8 length bytes, 4 mask bytes.
pub const MAX_HEADER_SIZE: usize = 14;

/// A WebSocket frame.
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-------+-+-------------+-------------------------------+
/// |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
/// |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
/// |N|V|V|V|       |S|             |   (if payload len==126/127)   |
/// | |1|2|3|       |K|             |                               |
/// +-+-+-+-+-------+-+-------------+-------------------------------+
/// |                   Masking key (if MASK set)                   |
/// +---------------------------------------------------------------+
/// |                          Payload data                         |
/// +---------------------------------------------------------------+
/// ```
///
/// The payload is always held unmasked; `mask` records the key that was (or
/// will be) applied on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment flag.
    pub fin: bool,
    /// Reserved bit 1. Must be 0 without extensions.
    pub rsv1: bool,
    /// Reserved bit 2. Must be 0 without extensions.
    pub rsv2: bool,
    /// Reserved bit 3. Must be 0 without extensions.
    pub rsv3: bool,
    /// Frame opcode.
    pub opcode: OpCode,
    /// Masking key, present iff the MASK bit is set.
    pub mask: Option<[u8; 4]>,
    payload: Bytes,
}

impl Frame {
    /// Create an unmasked frame with clear reserved bits.
    #[must_use]
    pub fn new(fin: bool, opcode: OpCode, payload: impl Into<Bytes>) -> Self {
        Self {
            fin,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            opcode,
            mask: None,
            payload: payload.into(),
        }
    }

    /// Create a final text frame.
    #[must_use]
    pub fn text(data: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Text, data)
    }

    /// Create a final binary frame.
    #[must_use]
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Binary, data)
    }

    /// Create a close frame with optional status code and reason.
    #[must_use]
    pub fn close(code: Option<u16>, reason: &str) -> Self {
        let payload = match code {
            Some(code) => {
                let mut data = BytesMut::with_capacity(2 + reason.len());
                data.put_u16(code);
                data.put_slice(reason.as_bytes());
                data.freeze()
            }
            None => Bytes::new(),
        };
        Self::new(true, OpCode::Close, payload)
    }

    /// Create a ping frame.
    #[must_use]
    pub fn ping(data: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Ping, data)
    }

    /// Create a pong frame.
    #[must_use]
    pub fn pong(data: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Pong, data)
    }

    /// Set the masking key used when the frame is encoded.
    #[must_use]
    pub fn with_mask(mut self, mask: [u8; 4]) -> Self {
        self.mask = Some(mask);
        self
    }

    #[inline]
    #[must_use]
    pub fn is_masked(&self) -> bool {
        self.mask.is_some()
    }

    /// The unmasked payload.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[must_use]
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Check the constraints every emitted frame must satisfy.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::ReservedBitsSet` if any RSV bit is set
    /// - `ProtocolError::FragmentedControlFrame` if a control frame has FIN=0
    /// - `ProtocolError::OversizedControlFrame` if a control payload exceeds 125 bytes
    pub fn validate(&self) -> std::result::Result<(), ProtocolError> {
        if self.rsv1 || self.rsv2 || self.rsv3 {
            return Err(ProtocolError::ReservedBitsSet);
        }

        if self.opcode.is_control() {
            if !self.fin {
                return Err(ProtocolError::FragmentedControlFrame);
            }
            if self.payload.len() > MAX_CONTROL_FRAME_PAYLOAD {
                return Err(ProtocolError::OversizedControlFrame(
                    self.payload.len() as u64,
                ));
            }
        }

        Ok(())
    }

    /// Number of bytes [`Frame::encode`] will write.
    #[must_use]
    pub fn wire_size(&self) -> usize {
        let payload_len = self.payload.len();
        let extended_len_size = if payload_len <= 125 {
            0
        } else if payload_len <= 65535 {
            2
        } else {
            8
        };
        let mask_size = if self.mask.is_some() { 4 } else { 0 };
        2 + extended_len_size + mask_size + payload_len
    }

    /// Append the wire form of this frame to `dst`, masking with `self.mask`.
    pub fn encode(&self, dst: &mut BytesMut) {
        let payload_len = self.payload.len();
        dst.reserve(self.wire_size());

        let mut byte0 = self.opcode.as_u8();
        if self.fin {
            byte0 |= 0x80;
        }
        if self.rsv1 {
            byte0 |= 0x40;
        }
        if self.rsv2 {
            byte0 |= 0x20;
        }
        if self.rsv3 {
            byte0 |= 0x10;
        }
        dst.put_u8(byte0);

        let mask_bit = if self.mask.is_some() { 0x80 } else { 0x00 };
        if payload_len <= 125 {
            dst.put_u8(mask_bit | payload_len as u8);
        } else if payload_len <= 65535 {
            dst.put_u8(mask_bit | 126);
            dst.put_u16(payload_len as u16);
        } else {
            dst.put_u8(mask_bit | 127);
            dst.put_u64(payload_len as u64);
        }

        match self.mask {
            Some(mask) => {
                dst.put_slice(&mask);
                let start = dst.len();
                dst.put_slice(&self.payload);
                apply_mask_fast(&mut dst[start..], mask);
            }
            None => dst.put_slice(&self.payload),
        }
    }
}

/// Outcome of decoding one frame from a byte window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A whole frame was present.
    Frame {
        /// The decoded frame, payload unmasked.
        frame: Frame,
        /// Window bytes occupied by the frame.
        consumed: usize,
    },
    /// The window ends before the frame does; nothing was consumed.
    Incomplete {
        /// Minimum number of additional bytes before retrying is useful.
        needed: usize,
    },
}

/// Stateless frame decoder for one direction of a connection.
///
/// A client-role decoder rejects masked frames; a server-role decoder
/// rejects unmasked ones and removes the mask.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    role: Role,
    limits: Limits,
}

impl FrameDecoder {
    #[must_use]
    pub fn new(role: Role, limits: Limits) -> Self {
        Self { role, limits }
    }

    /// Decode the frame at the start of `window`.
    ///
    /// Header checks run as soon as the bytes they need are present, so a
    /// malformed header is reported without waiting for its payload.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::ReservedBitsSet` if any RSV bit is set
    /// - `ProtocolError::ReservedOpcode` for opcodes 0x3-0x7 and 0xB-0xF
    /// - `ProtocolError::MaskedServerFrame` / `UnmaskedClientFrame` on a masking direction violation
    /// - `ProtocolError::FragmentedControlFrame` if a control frame has FIN=0
    /// - `ProtocolError::InvalidExtendedLength` if a 64-bit length has its top bit set
    /// - `ProtocolError::OversizedControlFrame` if a control frame declares more than 125 bytes
    /// - `ProtocolError::FrameTooLarge` if the payload exceeds `max_frame_size`
    pub fn decode(&self, window: &[u8]) -> std::result::Result<Decoded, ProtocolError> {
        if window.len() < 2 {
            return Ok(Decoded::Incomplete {
                needed: 2 - window.len(),
            });
        }

        let byte0 = window[0];
        let byte1 = window[1];

        let fin = (byte0 & 0x80) != 0;
        if byte0 & 0x70 != 0 {
            return Err(ProtocolError::ReservedBitsSet);
        }
        let opcode = OpCode::from_u8(byte0)?;

        let masked = (byte1 & 0x80) != 0;
        if masked != self.role.expects_masked() {
            return Err(if masked {
                ProtocolError::MaskedServerFrame
            } else {
                ProtocolError::UnmaskedClientFrame
            });
        }

        if opcode.is_control() && !fin {
            return Err(ProtocolError::FragmentedControlFrame);
        }

        let (payload_len, len_end) = match byte1 & 0x7F {
            len @ 0..=125 => (u64::from(len), 2),
            126 => {
                if window.len() < 4 {
                    return Ok(Decoded::Incomplete {
                        needed: 4 - window.len(),
                    });
                }
                (u64::from(u16::from_be_bytes([window[2], window[3]])), 4)
            }
            _ => {
                if window.len() < 10 {
                    return Ok(Decoded::Incomplete {
                        needed: 10 - window.len(),
                    });
                }
                let mut len_bytes = [0u8; 8];
                len_bytes.copy_from_slice(&window[2..10]);
                let len = u64::from_be_bytes(len_bytes);
                if len & (1 << 63) != 0 {
                    return Err(ProtocolError::InvalidExtendedLength);
                }
                (len, 10)
            }
        };

        if opcode.is_control() && payload_len > MAX_CONTROL_FRAME_PAYLOAD as u64 {
            return Err(ProtocolError::OversizedControlFrame(payload_len));
        }
        self.limits.check_frame_size(payload_len)?;

        // Bounded by max_frame_size, which is a usize.
        let payload_len = payload_len as usize;
        let header_len = if masked { len_end + 4 } else { len_end };
        let total = header_len + payload_len;

        if window.len() < total {
            return Ok(Decoded::Incomplete {
                needed: total - window.len(),
            });
        }

        let mask = if masked {
            let mut key = [0u8; 4];
            key.copy_from_slice(&window[len_end..header_len]);
            Some(key)
        } else {
            None
        };

        let payload = match mask {
            Some(key) => {
                let mut data = BytesMut::from(&window[header_len..total]);
                apply_mask_fast(&mut data, key);
                data.freeze()
            }
            None => Bytes::copy_from_slice(&window[header_len..total]),
        };

        let frame = Frame {
            fin,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            opcode,
            mask,
            payload,
        };

        Ok(Decoded::Frame {
            frame,
            consumed: total,
        })
    }
}

/// Frame encoder for one direction of a connection.
///
/// In the client role every frame gets a fresh random masking key.
#[derive(Debug, Clone, Copy)]
pub struct FrameEncoder {
    role: Role,
}

impl FrameEncoder {
    #[must_use]
    pub const fn new(role: Role) -> Self {
        Self { role }
    }

    /// Validate `frame`, assign its mask per role, and append it to `dst`.
    ///
    /// # Errors
    ///
    /// - `Error::Protocol` if the frame violates [`Frame::validate`]
    /// - `Error::Entropy` if no masking key could be drawn
    pub fn encode(&self, mut frame: Frame, dst: &mut BytesMut) -> Result<()> {
        frame.validate()?;
        frame.mask = if self.role.must_mask() {
            Some(generate_mask()?)
        } else {
            None
        };

        tracing::trace!(
            opcode = %frame.opcode,
            fin = frame.fin,
            len = frame.payload.len(),
            "encoding frame"
        );
        frame.encode(dst);
        Ok(())
    }
}

//! Sans-io protocol core (RFC 6455): framing, handshake and reassembly.

pub mod assembler;
pub mod frame;
pub mod handshake;
pub mod mask;
pub mod opcode;
pub mod reassembler;

pub use assembler::MessageAssembler;
pub use frame::{Decoded, Frame, FrameDecoder, FrameEncoder};
pub use handshake::{ClientHandshake, WS_GUID, compute_accept_key};
pub use mask::apply_mask;
pub use opcode::OpCode;
pub use reassembler::{Inbound, StreamReassembler};

//! WebSocket protocol core: opcodes, masking, frame codec and client handshake.

pub mod frame;
pub mod handshake;
pub mod mask;
pub mod opcode;

pub use frame::{Decoded, Frame, MAX_CONTROL_FRAME_PAYLOAD};
pub use handshake::{ClientHandshake, HandshakeOutcome, WS_GUID, compute_accept_key};
pub use mask::{apply_mask, apply_mask_fast};
pub use opcode::OpCode;

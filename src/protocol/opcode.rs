//! Frame opcodes (low nibble of the first header byte).

use std::fmt;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[non_exhaustive]
pub enum OpCode {
    /// 0x0. Never produced; rejected when received.
    Continuation = 0x0,
    /// 0x1, UTF-8 payload.
    Text = 0x1,
    Binary = 0x2,
    /// 0x8, optional status code and reason.
    Close = 0x8,
    /// 0x9, answered automatically.
    Ping = 0x9,
    Pong = 0xA,
}

impl OpCode {
    /// Decode an opcode nibble.
    ///
    /// # Errors
    ///
    /// `Error::ReservedOpcode` for 0x3-0x7 and 0xB-0xF, `Error::InvalidOpcode`
    /// for anything wider than four bits.
    pub fn from_u8(byte: u8) -> Result<Self> {
        let opcode = match byte {
            0x0 => Self::Continuation,
            0x1 => Self::Text,
            0x2 => Self::Binary,
            0x8 => Self::Close,
            0x9 => Self::Ping,
            0xA => Self::Pong,
            0x3..=0x7 | 0xB..=0xF => return Err(Error::ReservedOpcode(byte)),
            _ => return Err(Error::InvalidOpcode(byte)),
        };
        Ok(opcode)
    }

    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Close, Ping and Pong: payload capped at 125 bytes, never fragmented.
    #[inline]
    #[must_use]
    pub const fn is_control(self) -> bool {
        (self as u8) & 0x8 != 0
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Continuation => "continuation",
            Self::Text => "text",
            Self::Binary => "binary",
            Self::Close => "close",
            Self::Ping => "ping",
            Self::Pong => "pong",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nibbles_decode_to_the_matching_opcode() {
        let expected = [
            (0x0, OpCode::Continuation),
            (0x1, OpCode::Text),
            (0x2, OpCode::Binary),
            (0x8, OpCode::Close),
            (0x9, OpCode::Ping),
            (0xA, OpCode::Pong),
        ];
        for (nibble, opcode) in expected {
            assert_eq!(OpCode::from_u8(nibble), Ok(opcode));
            assert_eq!(opcode.as_u8(), nibble);
        }
    }

    #[test]
    fn test_unassigned_nibbles_are_reserved() {
        for nibble in (0x3..=0x7).chain(0xB..=0xF) {
            assert_eq!(OpCode::from_u8(nibble), Err(Error::ReservedOpcode(nibble)));
        }
        assert_eq!(OpCode::from_u8(0x1F), Err(Error::InvalidOpcode(0x1F)));
    }

    #[test]
    fn test_control_bit() {
        let control: Vec<_> = [
            OpCode::Continuation,
            OpCode::Text,
            OpCode::Binary,
            OpCode::Close,
            OpCode::Ping,
            OpCode::Pong,
        ]
        .into_iter()
        .filter(|op| op.is_control())
        .collect();
        assert_eq!(control, vec![OpCode::Close, OpCode::Ping, OpCode::Pong]);
    }

    #[test]
    fn test_display_is_lowercase() {
        assert_eq!(OpCode::Ping.to_string(), "ping");
        assert_eq!(format!("{}", OpCode::Binary), "binary");
    }
}

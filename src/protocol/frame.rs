//! WebSocket frame encoding and decoding over blocking byte streams.
//!
//! Decoding pulls bytes from any [`Read`] and tells apart three outcomes:
//! a complete frame, "nothing pending yet" on a timeout-bounded stream, and
//! errors (with end-of-stream reported as [`Error::ConnectionClosed`]).

use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use bytes::{BufMut, BytesMut};

use crate::error::{Error, Result};
use crate::protocol::OpCode;
use crate::protocol::mask::apply_mask_fast;

/// Maximum payload size for control frames (RFC 6455).
pub const MAX_CONTROL_FRAME_PAYLOAD: usize = 125;

/// Result of a single decode attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A complete frame was read.
    Frame(Frame),
    /// The stream had nothing pending; no bytes were consumed.
    NoData,
}

/// A WebSocket frame as defined in RFC 6455.
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
/// |                         Masking key (if present)              |
/// +---------------------------------------------------------------+
/// |                     Payload data                              |
/// +---------------------------------------------------------------+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment flag.
    pub fin: bool,
    /// Reserved bit 1. Must be 0, no extensions are negotiated.
    pub rsv1: bool,
    /// Reserved bit 2.
    pub rsv2: bool,
    /// Reserved bit 3.
    pub rsv3: bool,
    /// Frame opcode.
    pub opcode: OpCode,
    payload: Vec<u8>,
}

impl Frame {
    #[must_use]
    pub fn new(fin: bool, opcode: OpCode, payload: Vec<u8>) -> Self {
        Self {
            fin,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            opcode,
            payload,
        }
    }

    #[must_use]
    pub fn text(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Text, data.into())
    }

    #[must_use]
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Binary, data.into())
    }

    /// Create a close frame. The reason is cut at a character boundary so
    /// the payload stays within the control frame limit.
    #[must_use]
    pub fn close(code: Option<u16>, reason: &str) -> Self {
        let payload = match code {
            Some(code) => {
                let mut data = code.to_be_bytes().to_vec();
                data.extend_from_slice(truncate_utf8(reason, MAX_CONTROL_FRAME_PAYLOAD - 2));
                data
            }
            None => Vec::new(),
        };
        Self::new(true, OpCode::Close, payload)
    }

    /// Create a ping frame, truncating the payload to 125 bytes.
    #[must_use]
    pub fn ping(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Ping, truncate_control(data.into()))
    }

    /// Create a pong frame, truncating the payload to 125 bytes.
    #[must_use]
    pub fn pong(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Pong, truncate_control(data.into()))
    }

    #[inline]
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[must_use]
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Validate an inbound frame header.
    ///
    /// # Errors
    ///
    /// - `Error::ReservedBitsSet` if any RSV bit is set
    /// - `Error::ProtocolViolation` if a control frame is fragmented or
    ///   carries more than 125 bytes
    pub fn validate(&self) -> Result<()> {
        if self.rsv1 || self.rsv2 || self.rsv3 {
            return Err(Error::ReservedBitsSet);
        }

        if self.opcode.is_control() {
            if !self.fin {
                return Err(Error::ProtocolViolation(format!(
                    "fragmented {} frame",
                    self.opcode
                )));
            }
            if self.payload.len() > MAX_CONTROL_FRAME_PAYLOAD {
                return Err(Error::ProtocolViolation(format!(
                    "{} payload of {} bytes exceeds {}",
                    self.opcode,
                    self.payload.len(),
                    MAX_CONTROL_FRAME_PAYLOAD
                )));
            }
        }

        Ok(())
    }

    /// Number of bytes this frame occupies on the wire.
    #[must_use]
    pub fn wire_size(&self, masked: bool) -> usize {
        let payload_len = self.payload.len();
        let extended_len_size = if payload_len < 126 {
            0
        } else if payload_len < 65536 {
            2
        } else {
            8
        };
        let mask_size = if masked { 4 } else { 0 };
        2 + extended_len_size + mask_size + payload_len
    }

    /// Serialize the frame, masking the payload when a key is given.
    #[must_use]
    pub fn encode(&self, mask: Option<[u8; 4]>) -> BytesMut {
        let payload_len = self.payload.len();
        let mut buf = BytesMut::with_capacity(self.wire_size(mask.is_some()));

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
        buf.put_u8(byte0);

        let mask_bit = if mask.is_some() { 0x80 } else { 0x00 };
        if payload_len < 126 {
            buf.put_u8(mask_bit | payload_len as u8);
        } else if payload_len < 65536 {
            buf.put_u8(mask_bit | 126);
            buf.put_u16(payload_len as u16);
        } else {
            buf.put_u8(mask_bit | 127);
            buf.put_u64(payload_len as u64);
        }

        match mask {
            Some(key) => {
                buf.put_slice(&key);
                let start = buf.len();
                buf.put_slice(&self.payload);
                apply_mask_fast(&mut buf[start..], key);
            }
            None => buf.put_slice(&self.payload),
        }

        buf
    }

    /// Encode and write the frame with a single `write_all`, then flush.
    ///
    /// # Errors
    ///
    /// Propagates transport errors; broken pipes map to `ConnectionClosed`.
    pub fn write_to<W: Write + ?Sized>(&self, writer: &mut W, mask: Option<[u8; 4]>) -> Result<()> {
        let buf = self.encode(mask);
        log::trace!(
            "writing {} frame: {} payload bytes, masked={}",
            self.opcode,
            self.payload.len(),
            mask.is_some()
        );
        writer.write_all(&buf)?;
        writer.flush()?;
        Ok(())
    }

    /// Read one frame from a blocking stream.
    ///
    /// If the very first read times out (or would block) before any byte
    /// arrives, returns `Decoded::NoData`. Once a frame has started, reads
    /// that time out are retried until `stall_timeout` has elapsed.
    ///
    /// # Errors
    ///
    /// - `Error::ConnectionClosed` on end of stream
    /// - `Error::ReservedOpcode` / `Error::InvalidOpcode` for unknown opcodes
    /// - `Error::FrameTooLarge` if the announced length exceeds
    ///   `max_frame_size` or cannot be allocated
    /// - `Error::Io` for other transport failures, including a stall
    pub fn read_from<R: Read + ?Sized>(
        reader: &mut R,
        max_frame_size: usize,
        stall_timeout: Duration,
    ) -> Result<Decoded> {
        let mut header = [0u8; 2];
        loop {
            match reader.read(&mut header[..1]) {
                Ok(0) => return Err(Error::ConnectionClosed(None)),
                Ok(_) => break,
                Err(e) if is_no_data(&e) => return Ok(Decoded::NoData),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }

        let deadline = Instant::now() + stall_timeout;
        read_patiently(reader, &mut header[1..], deadline)?;

        let byte0 = header[0];
        let byte1 = header[1];
        let fin = (byte0 & 0x80) != 0;
        let rsv1 = (byte0 & 0x40) != 0;
        let rsv2 = (byte0 & 0x20) != 0;
        let rsv3 = (byte0 & 0x10) != 0;
        let opcode = OpCode::from_u8(byte0 & 0x0F)?;
        let masked = (byte1 & 0x80) != 0;

        let payload_len = match byte1 & 0x7F {
            126 => {
                let mut ext = [0u8; 2];
                read_patiently(reader, &mut ext, deadline)?;
                u64::from(u16::from_be_bytes(ext))
            }
            127 => {
                let mut ext = [0u8; 8];
                read_patiently(reader, &mut ext, deadline)?;
                u64::from_be_bytes(ext)
            }
            len => u64::from(len),
        };

        let mask = if masked {
            let mut key = [0u8; 4];
            read_patiently(reader, &mut key, deadline)?;
            Some(key)
        } else {
            None
        };

        if payload_len > max_frame_size as u64 {
            return Err(Error::FrameTooLarge {
                size: payload_len,
                max: max_frame_size,
            });
        }
        let len = payload_len as usize;

        let mut payload = Vec::new();
        payload
            .try_reserve_exact(len)
            .map_err(|_| Error::FrameTooLarge {
                size: payload_len,
                max: max_frame_size,
            })?;
        payload.resize(len, 0);
        read_patiently(reader, &mut payload, deadline)?;

        if let Some(key) = mask {
            apply_mask_fast(&mut payload, key);
        }

        log::trace!("read {opcode} frame: fin={fin}, {len} payload bytes, masked={masked}");

        Ok(Decoded::Frame(Frame {
            fin,
            rsv1,
            rsv2,
            rsv3,
            opcode,
            payload,
        }))
    }
}

/// Both spellings of "socket read timeout expired": Unix reports
/// `WouldBlock`, Windows reports `TimedOut`.
#[inline]
pub(crate) fn is_no_data(err: &std::io::Error) -> bool {
    matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

fn read_patiently<R: Read + ?Sized>(reader: &mut R, mut buf: &mut [u8], deadline: Instant) -> Result<()> {
    while !buf.is_empty() {
        match reader.read(buf) {
            Ok(0) => return Err(Error::ConnectionClosed(None)),
            Ok(n) => buf = &mut buf[n..],
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) if is_no_data(&e) => {
                if Instant::now() >= deadline {
                    return Err(Error::Io {
                        kind: ErrorKind::TimedOut,
                        message: "peer stalled in the middle of a frame".into(),
                    });
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn truncate_control(mut data: Vec<u8>) -> Vec<u8> {
    data.truncate(MAX_CONTROL_FRAME_PAYLOAD);
    data
}

fn truncate_utf8(s: &str, max: usize) -> &[u8] {
    if s.len() <= max {
        return s.as_bytes();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s.as_bytes()[..end]
}

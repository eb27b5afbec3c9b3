//! RFC 6455 frame encoding and decoding.
//!
//! Only the server side is covered: incoming frames must be masked and
//! outgoing frames never are.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Largest payload accepted in a single frame.
pub const MAX_FRAME_PAYLOAD: u64 = 16 * 1024 * 1024;

/// Control frames carry at most this many payload bytes.
const MAX_CONTROL_PAYLOAD: usize = 125;

/// WebSocket operation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl OpCode {
    /// Check if this is a control frame.
    pub fn is_control(&self) -> bool {
        matches!(self, Self::Close | Self::Ping | Self::Pong)
    }

    fn from_bits(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(Self::Continuation),
            0x1 => Some(Self::Text),
            0x2 => Some(Self::Binary),
            0x8 => Some(Self::Close),
            0x9 => Some(Self::Ping),
            0xA => Some(Self::Pong),
            _ => None,
        }
    }

    fn bits(self) -> u8 {
        match self {
            Self::Continuation => 0x0,
            Self::Text => 0x1,
            Self::Binary => 0x2,
            Self::Close => 0x8,
            Self::Ping => 0x9,
            Self::Pong => 0xA,
        }
    }
}

/// Status codes carried by close frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    /// 1000
    Normal,
    /// 1001
    GoingAway,
    /// 1002
    Protocol,
    /// 1003
    Unsupported,
    /// 1009
    Size,
    /// Anything else
    Other(u16),
}

impl From<u16> for CloseCode {
    fn from(value: u16) -> Self {
        match value {
            1000 => Self::Normal,
            1001 => Self::GoingAway,
            1002 => Self::Protocol,
            1003 => Self::Unsupported,
            1009 => Self::Size,
            other => Self::Other(other),
        }
    }
}

impl From<CloseCode> for u16 {
    fn from(value: CloseCode) -> Self {
        match value {
            CloseCode::Normal => 1000,
            CloseCode::GoingAway => 1001,
            CloseCode::Protocol => 1002,
            CloseCode::Unsupported => 1003,
            CloseCode::Size => 1009,
            CloseCode::Other(code) => code,
        }
    }
}

/// Frame-level protocol violations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("reserved bits set")]
    ReservedBits,

    #[error("unknown opcode {0:#x}")]
    UnknownOpcode(u8),

    #[error("client frame is not masked")]
    Unmasked,

    #[error("control frame is fragmented or longer than 125 bytes")]
    InvalidControlFrame,

    #[error("frame payload of {0} bytes exceeds limit")]
    TooLarge(u64),

    #[error("continuation frame without a started message")]
    UnexpectedContinuation,

    #[error("new data frame while a fragmented message is open")]
    InterleavedMessage,

    #[error("text message is not valid UTF-8")]
    InvalidUtf8,
}

/// A decoded frame with its payload already unmasked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    pub opcode: OpCode,
    pub payload: Bytes,
}

impl Frame {
    /// Decodes one frame from the front of `buf`.
    ///
    /// Returns `Ok(None)` when `buf` does not yet hold a whole frame, and
    /// otherwise the frame together with the number of bytes it occupied.
    pub fn decode(buf: &[u8]) -> Result<Option<(Frame, usize)>, FrameError> {
        if buf.len() < 2 {
            return Ok(None);
        }

        let fin = buf[0] & 0x80 != 0;
        if buf[0] & 0x70 != 0 {
            return Err(FrameError::ReservedBits);
        }
        let opcode =
            OpCode::from_bits(buf[0] & 0x0F).ok_or(FrameError::UnknownOpcode(buf[0] & 0x0F))?;

        if buf[1] & 0x80 == 0 {
            return Err(FrameError::Unmasked);
        }

        let (len, mut offset) = match buf[1] & 0x7F {
            126 => {
                if buf.len() < 4 {
                    return Ok(None);
                }
                (u16::from_be_bytes([buf[2], buf[3]]) as u64, 4)
            }
            127 => {
                if buf.len() < 10 {
                    return Ok(None);
                }
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&buf[2..10]);
                (u64::from_be_bytes(raw), 10)
            }
            n => (n as u64, 2),
        };

        if opcode.is_control() && (!fin || len > MAX_CONTROL_PAYLOAD as u64) {
            return Err(FrameError::InvalidControlFrame);
        }
        if len > MAX_FRAME_PAYLOAD {
            return Err(FrameError::TooLarge(len));
        }

        if buf.len() < offset + 4 {
            return Ok(None);
        }
        let mask = [
            buf[offset],
            buf[offset + 1],
            buf[offset + 2],
            buf[offset + 3],
        ];
        offset += 4;

        let len = len as usize;
        if buf.len() < offset + len {
            return Ok(None);
        }

        let payload: Vec<u8> = buf[offset..offset + len]
            .iter()
            .enumerate()
            .map(|(i, b)| b ^ mask[i % 4])
            .collect();

        Ok(Some((
            Frame {
                fin,
                opcode,
                payload: Bytes::from(payload),
            },
            offset + len,
        )))
    }
}

/// Encodes a single unmasked, final server frame.
pub fn encode(opcode: OpCode, payload: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(payload.len() + 10);
    out.put_u8(0x80 | opcode.bits());

    match payload.len() {
        n if n < 126 => out.put_u8(n as u8),
        n if n <= u16::MAX as usize => {
            out.put_u8(126);
            out.put_u16(n as u16);
        }
        n => {
            out.put_u8(127);
            out.put_u64(n as u64);
        }
    }

    out.put_slice(payload);
    out.freeze()
}

/// Encodes a close frame with a status code and (truncated) reason.
pub fn close_frame(code: CloseCode, reason: &str) -> Bytes {
    let mut payload = Vec::with_capacity(2 + reason.len());
    payload.extend_from_slice(&u16::from(code).to_be_bytes());

    // Keep the frame a valid control frame; cut on a char boundary.
    let mut end = reason.len().min(MAX_CONTROL_PAYLOAD - 2);
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    payload.extend_from_slice(&reason.as_bytes()[..end]);

    encode(OpCode::Close, &payload)
}

/// Reads the status code out of a close frame payload, if there is one.
pub fn close_code(payload: &[u8]) -> Option<CloseCode> {
    if payload.len() < 2 {
        return None;
    }
    Some(CloseCode::from(u16::from_be_bytes([payload[0], payload[1]])))
}

#[cfg(test)]
pub(crate) fn masked(opcode: OpCode, fin: bool, payload: &[u8]) -> Vec<u8> {
    let mask = [0x37, 0xfa, 0x21, 0x3d];
    let mut out = vec![(if fin { 0x80 } else { 0 }) | opcode.bits()];
    match payload.len() {
        n if n < 126 => out.push(0x80 | n as u8),
        n => {
            out.push(0x80 | 126);
            out.extend_from_slice(&(n as u16).to_be_bytes());
        }
    }
    out.extend_from_slice(&mask);
    out.extend(payload.iter().enumerate().map(|(i, b)| b ^ mask[i % 4]));
    out
}

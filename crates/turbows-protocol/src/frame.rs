//! WebSocket frames (RFC 6455 Section 5.2).
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
//! |     Extended payload length continued, if payload len == 127  |
//! + - - - - - - - - - - - - - - - +-------------------------------+
//! |                               |Masking-key, if MASK set to 1  |
//! +-------------------------------+-------------------------------+
//! | Masking-key (continued)       |          Payload Data         |
//! +-------------------------------- - - - - - - - - - - - - - - - +
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use turbows_transport_traits::{CloseCode, CloseReason};

use crate::error::{FramingError, FramingResult};

/// Largest payload a control frame may carry.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

/// Largest close reason that fits next to the 2-byte status code.
pub const MAX_CLOSE_REASON: usize = MAX_CONTROL_PAYLOAD - 2;

/// Frame opcode (4 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Continuation of a fragmented message.
    Continuation = 0x0,
    /// UTF-8 text data.
    Text = 0x1,
    /// Binary data.
    Binary = 0x2,
    /// Connection close.
    Close = 0x8,
    /// Ping.
    Ping = 0x9,
    /// Pong.
    Pong = 0xA,
}

impl Opcode {
    /// Close, Ping and Pong.
    #[must_use]
    pub const fn is_control(self) -> bool {
        matches!(self, Self::Close | Self::Ping | Self::Pong)
    }

    /// Continuation, Text and Binary.
    #[must_use]
    pub const fn is_data(self) -> bool {
        !self.is_control()
    }

    /// Decode the low nibble of the first header byte.
    pub fn from_u8(value: u8) -> FramingResult<Self> {
        match value {
            0x0 => Ok(Self::Continuation),
            0x1 => Ok(Self::Text),
            0x2 => Ok(Self::Binary),
            0x8 => Ok(Self::Close),
            0x9 => Ok(Self::Ping),
            0xA => Ok(Self::Pong),
            other => Err(FramingError::protocol_error(format!(
                "Unknown opcode 0x{other:X}"
            ))),
        }
    }
}

/// A single decoded or to-be-encoded frame.
///
/// `payload` is always the unmasked application data; `mask` records the
/// key the frame carried (decoded) or should carry (encoded).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment of a message.
    pub fin: bool,
    /// RSV1..RSV3 as the low three bits.
    pub rsv: u8,
    /// Frame type.
    pub opcode: Opcode,
    /// Masking key, if the frame is masked.
    pub mask: Option<[u8; 4]>,
    /// Unmasked payload.
    pub payload: Bytes,
}

impl Frame {
    /// A final, unmasked frame.
    pub fn new(opcode: Opcode, payload: impl Into<Bytes>) -> Self {
        Self {
            fin: true,
            rsv: 0,
            opcode,
            mask: None,
            payload: payload.into(),
        }
    }

    /// Text frame.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(Opcode::Text, Bytes::from(text.into()))
    }

    /// Binary frame.
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Binary, data)
    }

    /// Ping frame.
    pub fn ping(data: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Ping, data)
    }

    /// Pong frame.
    pub fn pong(data: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Pong, data)
    }

    /// Continuation frame.
    pub fn continuation(data: impl Into<Bytes>, fin: bool) -> Self {
        Self::new(Opcode::Continuation, data).with_fin(fin)
    }

    /// Close frame. `None` produces an empty payload.
    ///
    /// The reason is truncated on a character boundary so the payload stays
    /// within the control frame limit.
    pub fn close(reason: Option<&CloseReason>) -> Self {
        let Some(reason) = reason else {
            return Self::new(Opcode::Close, Bytes::new());
        };

        let mut end = reason.reason.len().min(MAX_CLOSE_REASON);
        while !reason.reason.is_char_boundary(end) {
            end -= 1;
        }

        let mut buf = BytesMut::with_capacity(2 + end);
        buf.put_u16(reason.code.as_u16());
        buf.put_slice(&reason.reason.as_bytes()[..end]);
        Self::new(Opcode::Close, buf.freeze())
    }

    /// Set the FIN bit.
    #[must_use]
    pub fn with_fin(mut self, fin: bool) -> Self {
        self.fin = fin;
        self
    }

    /// Set the reserved bits (low three bits are used).
    #[must_use]
    pub fn with_rsv(mut self, rsv: u8) -> Self {
        self.rsv = rsv & 0b111;
        self
    }

    /// Parse the status code and reason out of a close frame payload.
    ///
    /// An empty payload yields `Ok(None)`. A one-byte payload, a code that may
    /// not appear on the wire, or a non UTF-8 reason is a framing error.
    pub fn close_reason(&self) -> FramingResult<Option<CloseReason>> {
        match self.payload.len() {
            0 => Ok(None),
            1 => Err(FramingError::protocol_error("Close frame payload of one byte")),
            _ => {
                let raw = u16::from_be_bytes([self.payload[0], self.payload[1]]);
                let code = CloseCode::from_u16(raw);
                if !code.is_sendable() {
                    return Err(FramingError::protocol_error(format!("Invalid close code {code}")));
                }
                let reason = std::str::from_utf8(&self.payload[2..]).map_err(|_| {
                    FramingError::invalid_payload("Close reason is not valid UTF-8")
                })?;
                Ok(Some(CloseReason::new(code, reason)))
            }
        }
    }
}

/// XOR `data` in place with the 4-byte masking key.
pub fn apply_mask(data: &mut [u8], key: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= key[i & 3];
    }
}

//! Incremental frame codec.
//!
//! [`FrameCodec::unframe`] pulls at most one complete frame off the front of
//! a buffer. When the buffer holds only part of a frame it returns `Ok(None)`
//! and leaves every byte in place, so the caller can append the next read and
//! try again.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::error::{FramingError, FramingResult};
use crate::frame::{Frame, MAX_CONTROL_PAYLOAD, Opcode, apply_mask};

/// Which end of the connection this codec serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Accepts connections; reads masked frames, writes unmasked ones.
    Server,
    /// Initiates connections; reads unmasked frames, writes masked ones.
    Client,
}

impl Role {
    /// Whether frames written by this role carry a mask.
    pub const fn masks_outgoing(self) -> bool {
        matches!(self, Self::Client)
    }
}

/// Per-connection decoder state plus the role-dependent encoder.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    role: Role,
    extensions_active: bool,
    /// Opcode of the data message currently being fragmented.
    open_message: Option<Opcode>,
    closed: bool,
}

impl FrameCodec {
    /// Create a codec for `role`. Reserved bits are only accepted when an
    /// extension was negotiated for the connection.
    pub fn new(role: Role, extensions_active: bool) -> Self {
        Self {
            role,
            extensions_active,
            open_message: None,
            closed: false,
        }
    }

    /// The role this codec was created for.
    pub fn role(&self) -> Role {
        self.role
    }

    /// A close frame has been decoded; nothing further will be.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Decode one frame from the front of `buf`.
    ///
    /// Returns `Ok(None)` when more data is needed, in which case `buf` is
    /// untouched. Bytes are consumed only when a whole frame is returned.
    pub fn unframe(&mut self, buf: &mut BytesMut) -> FramingResult<Option<Frame>> {
        if self.closed || buf.len() < 2 {
            return Ok(None);
        }

        let b0 = buf[0];
        let b1 = buf[1];
        let fin = b0 & 0x80 != 0;
        let rsv = (b0 >> 4) & 0b111;
        let opcode = Opcode::from_u8(b0 & 0x0F)?;
        let masked = b1 & 0x80 != 0;

        if rsv != 0 && !self.extensions_active {
            return Err(FramingError::protocol_error(format!(
                "Reserved bits 0b{rsv:03b} set without a negotiated extension"
            )));
        }
        match (self.role, masked) {
            (Role::Server, false) => {
                return Err(FramingError::protocol_error("Client frame is not masked"));
            }
            (Role::Client, true) => {
                return Err(FramingError::protocol_error("Server frame is masked"));
            }
            _ => {}
        }

        let (payload_len, len_bytes): (u64, usize) = match b1 & 0x7F {
            126 => {
                if buf.len() < 4 {
                    return Ok(None);
                }
                (u64::from(u16::from_be_bytes([buf[2], buf[3]])), 2)
            }
            127 => {
                if buf.len() < 10 {
                    return Ok(None);
                }
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&buf[2..10]);
                let len = u64::from_be_bytes(raw);
                if len & (1 << 63) != 0 {
                    return Err(FramingError::protocol_error(
                        "Payload length has the most significant bit set",
                    ));
                }
                (len, 8)
            }
            len => (u64::from(len), 0),
        };

        if opcode.is_control() {
            if payload_len > MAX_CONTROL_PAYLOAD as u64 {
                return Err(FramingError::protocol_error(format!(
                    "Control frame payload of {payload_len} bytes exceeds {MAX_CONTROL_PAYLOAD}"
                )));
            }
            if !fin && opcode != Opcode::Close {
                return Err(FramingError::protocol_error("Fragmented control frame"));
            }
        } else {
            match (opcode, self.open_message) {
                (Opcode::Continuation, None) => {
                    return Err(FramingError::protocol_error(
                        "Continuation frame without a message in progress",
                    ));
                }
                (Opcode::Text | Opcode::Binary, Some(open)) => {
                    return Err(FramingError::protocol_error(format!(
                        "New {opcode:?} frame while a fragmented {open:?} message is in progress"
                    )));
                }
                _ => {}
            }
        }

        let payload_len = usize::try_from(payload_len)
            .map_err(|_| FramingError::too_big("Payload length exceeds addressable memory"))?;
        let mask_len: usize = if masked { 4 } else { 0 };
        let header_len: usize = 2 + len_bytes + mask_len;
        if buf.len() < header_len.saturating_add(payload_len) {
            return Ok(None);
        }

        let mask = masked.then(|| {
            let at = 2 + len_bytes;
            [buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]
        });
        buf.advance(header_len);
        let mut payload = buf.split_to(payload_len);
        if let Some(key) = mask {
            apply_mask(&mut payload, key);
        }

        match opcode {
            Opcode::Text | Opcode::Binary if !fin => self.open_message = Some(opcode),
            Opcode::Continuation if fin => self.open_message = None,
            Opcode::Close => self.closed = true,
            _ => {}
        }

        trace!(?opcode, fin, len = payload_len, "decoded frame");
        Ok(Some(Frame {
            fin,
            rsv,
            opcode,
            mask,
            payload: payload.freeze(),
        }))
    }

    /// Encode a frame for sending from this codec's role.
    pub fn encode(&self, frame: &Frame) -> Bytes {
        encode_frame(self.role, frame)
    }
}

/// Serialize `frame` as `role` would put it on the wire.
///
/// A client masks with the frame's key, or a fresh random key when the frame
/// has none. A server never masks.
pub fn encode_frame(role: Role, frame: &Frame) -> Bytes {
    let len = frame.payload.len();
    let mask = if role.masks_outgoing() {
        Some(frame.mask.unwrap_or_else(|| fastrand::u32(..).to_be_bytes()))
    } else {
        None
    };

    let mut buf = BytesMut::with_capacity(14 + len);
    let mut b0 = (frame.opcode as u8) | ((frame.rsv & 0b111) << 4);
    if frame.fin {
        b0 |= 0x80;
    }
    buf.put_u8(b0);

    let mask_bit = if mask.is_some() { 0x80 } else { 0 };
    if len < 126 {
        buf.put_u8(mask_bit | len as u8);
    } else if len <= usize::from(u16::MAX) {
        buf.put_u8(mask_bit | 126);
        buf.put_u16(len as u16);
    } else {
        buf.put_u8(mask_bit | 127);
        buf.put_u64(len as u64);
    }

    match mask {
        Some(key) => {
            buf.put_slice(&key);
            let start = buf.len();
            buf.put_slice(&frame.payload);
            apply_mask(&mut buf[start..], key);
        }
        None => buf.put_slice(&frame.payload),
    }
    buf.freeze()
}

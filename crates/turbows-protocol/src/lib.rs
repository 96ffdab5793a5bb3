//! # TurboWS Protocol
//!
//! The wire-level half of the TurboWS WebSocket engine. Everything here is
//! synchronous and performs no I/O; it turns bytes into frames, frames into
//! bytes, and checks the HTTP upgrade exchange.
//!
//! ## Modules
//!
//! - [`codec`] - incremental [`FrameCodec`] that tolerates arbitrary read boundaries
//! - [`buffer`] - bounded, step-growing [`IncomingBuffer`] for partial frames
//! - [`handshake`] - client and server sides of the opening handshake
//! - [`version`] - the supported [`ProtocolVersion`]s in priority order
//! - [`extension`] - `Sec-WebSocket-Extensions` grammar
//!
//! ## Example
//!
//! ```rust
//! use bytes::BytesMut;
//! use turbows_protocol::{Frame, FrameCodec, Role, encode_frame};
//!
//! let wire = encode_frame(Role::Client, &Frame::text("hi"));
//!
//! let mut codec = FrameCodec::new(Role::Server, false);
//! let mut buf = BytesMut::from(&wire[..3]);
//! assert!(codec.unframe(&mut buf).unwrap().is_none());
//!
//! buf.extend_from_slice(&wire[3..]);
//! let frame = codec.unframe(&mut buf).unwrap().unwrap();
//! assert_eq!(&frame.payload[..], b"hi");
//! ```

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod buffer;
pub mod codec;
pub mod error;
pub mod extension;
pub mod frame;
pub mod handshake;
pub mod headers;
pub mod request;
pub mod version;

pub use buffer::{DEFAULT_BUFFER_STEP_SIZE, DEFAULT_INCOMING_BUFFER_SIZE, IncomingBuffer};
pub use codec::{FrameCodec, Role, encode_frame};
pub use error::{BufferOverflow, FramingError, FramingResult, HandshakeError, HandshakeResult};
pub use extension::{Extension, ExtensionParam, parse_extensions, serialize_extensions};
pub use frame::{Frame, MAX_CONTROL_PAYLOAD, Opcode};
pub use handshake::{
    ClientHandshake, Negotiated, build_response, compute_accept_key, negotiate_version,
    reject_unsupported_version, validate_request,
};
pub use headers::HeaderMap;
pub use request::{UpgradeRequest, UpgradeResponse};
pub use version::ProtocolVersion;

// Close codes are part of every framing error; re-export for convenience.
pub use turbows_transport_traits::{CloseCode, CloseReason};

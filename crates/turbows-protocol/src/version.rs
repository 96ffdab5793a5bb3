//! Supported protocol versions.

use std::fmt;

use crate::codec::{FrameCodec, Role};
use crate::headers::{ORIGIN, SEC_WEBSOCKET_ORIGIN, SEC_WEBSOCKET_VERSION};
use crate::request::UpgradeRequest;

/// A wire version of the WebSocket protocol.
///
/// Variants are listed in negotiation priority order; see [`ProtocolVersion::ALL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProtocolVersion {
    /// RFC 6455, `Sec-WebSocket-Version: 13`.
    #[default]
    Rfc6455,
    /// draft-ietf-hybi-thewebsocketprotocol-08, `Sec-WebSocket-Version: 8`.
    Hybi08,
}

impl ProtocolVersion {
    /// Every supported version, highest priority first.
    pub const ALL: [Self; 2] = [Self::Rfc6455, Self::Hybi08];

    /// Value of `Sec-WebSocket-Version` for this version.
    pub const fn wire_version(self) -> &'static str {
        match self {
            Self::Rfc6455 => "13",
            Self::Hybi08 => "8",
        }
    }

    /// Header a browser client uses to announce its origin.
    pub const fn origin_header(self) -> &'static str {
        match self {
            Self::Rfc6455 => ORIGIN,
            Self::Hybi08 => SEC_WEBSOCKET_ORIGIN,
        }
    }

    /// Look a version up by its wire value.
    pub fn from_wire(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|v| v.wire_version() == value.trim())
    }

    /// Wire values of all supported versions, in priority order.
    pub fn supported_wire_versions() -> Vec<&'static str> {
        Self::ALL.iter().map(|v| v.wire_version()).collect()
    }

    /// This version accepts the request's `Sec-WebSocket-Version`.
    pub fn validate(self, request: &UpgradeRequest) -> bool {
        request
            .headers
            .first(SEC_WEBSOCKET_VERSION)
            .is_some_and(|v| v.trim() == self.wire_version())
    }

    /// A fresh frame codec for a connection negotiated at this version.
    ///
    /// Both versions share the same framing rules.
    pub fn create_codec(self, role: Role, extensions_active: bool) -> FrameCodec {
        FrameCodec::new(role, extensions_active)
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_version())
    }
}

//! WebSocket close codes (RFC 6455 Section 7.4).
//!
//! Close codes travel in both directions across the transport boundary: the
//! engine reports why a connection ended through [`CloseListener`], and the
//! transport reports abnormal teardown back to the engine.
//!
//! [`CloseListener`]: crate::CloseListener

use serde::{Deserialize, Serialize};
use std::fmt;

/// A WebSocket close status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u16", into = "u16")]
pub enum CloseCode {
    /// 1000: the purpose of the connection has been fulfilled.
    Normal,
    /// 1001: the endpoint is going away.
    GoingAway,
    /// 1002: protocol error.
    ProtocolError,
    /// 1003: received data of a type the endpoint cannot accept.
    Unsupported,
    /// 1005: no status code was present. Never sent on the wire.
    NoStatus,
    /// 1006: the connection dropped without a close frame. Never sent on the wire.
    Abnormal,
    /// 1007: message data was inconsistent with its type (e.g. bad UTF-8).
    InvalidPayload,
    /// 1008: policy violation.
    PolicyViolation,
    /// 1009: message too big to process.
    TooBig,
    /// 1010: the client expected an extension the server did not negotiate.
    MandatoryExtension,
    /// 1011: the endpoint hit an unexpected condition.
    UnexpectedCondition,
    /// 1012: service restart.
    ServiceRestart,
    /// 1013: try again later.
    TryAgainLater,
    /// 1015: TLS handshake failure. Never sent on the wire.
    TlsHandshake,
    /// Any other code (registered or application-defined).
    Other(u16),
}

impl CloseCode {
    /// Returns the numeric value of this code.
    pub const fn as_u16(self) -> u16 {
        match self {
            Self::Normal => 1000,
            Self::GoingAway => 1001,
            Self::ProtocolError => 1002,
            Self::Unsupported => 1003,
            Self::NoStatus => 1005,
            Self::Abnormal => 1006,
            Self::InvalidPayload => 1007,
            Self::PolicyViolation => 1008,
            Self::TooBig => 1009,
            Self::MandatoryExtension => 1010,
            Self::UnexpectedCondition => 1011,
            Self::ServiceRestart => 1012,
            Self::TryAgainLater => 1013,
            Self::TlsHandshake => 1015,
            Self::Other(code) => code,
        }
    }

    /// Maps a numeric code onto a `CloseCode`.
    pub const fn from_u16(code: u16) -> Self {
        match code {
            1000 => Self::Normal,
            1001 => Self::GoingAway,
            1002 => Self::ProtocolError,
            1003 => Self::Unsupported,
            1005 => Self::NoStatus,
            1006 => Self::Abnormal,
            1007 => Self::InvalidPayload,
            1008 => Self::PolicyViolation,
            1009 => Self::TooBig,
            1010 => Self::MandatoryExtension,
            1011 => Self::UnexpectedCondition,
            1012 => Self::ServiceRestart,
            1013 => Self::TryAgainLater,
            1015 => Self::TlsHandshake,
            other => Self::Other(other),
        }
    }

    /// Returns `true` if this code may appear in a close frame on the wire.
    ///
    /// 1005, 1006 and 1015 are reserved for local reporting, and anything
    /// below 1000 or in the unassigned 1016-2999 range is invalid.
    pub const fn is_sendable(self) -> bool {
        match self.as_u16() {
            1004 | 1005 | 1006 | 1015 => false,
            1000..=1014 => true,
            3000..=4999 => true,
            _ => false,
        }
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        Self::from_u16(code)
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        code.as_u16()
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

/// Why a connection was closed: a code and a (possibly empty) reason phrase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseReason {
    /// Close status code.
    pub code: CloseCode,
    /// Human-readable reason; at most 123 bytes once encoded in a close frame.
    pub reason: String,
}

impl CloseReason {
    /// Create a close reason.
    pub fn new(code: CloseCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Normal closure (1000) with no reason phrase.
    pub fn normal() -> Self {
        Self::new(CloseCode::Normal, "")
    }

    /// Abnormal closure (1006): the transport went away without a close frame.
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self::new(CloseCode::Abnormal, reason)
    }

    /// Unexpected condition (1011).
    pub fn unexpected(reason: impl Into<String>) -> Self {
        Self::new(CloseCode::UnexpectedCondition, reason)
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reason.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{} ({})", self.code, self.reason)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_code_roundtrip_known_values() {
        for code in [1000u16, 1001, 1002, 1003, 1005, 1006, 1007, 1008, 1009, 1010, 1011, 1015] {
            assert_eq!(CloseCode::from_u16(code).as_u16(), code);
        }
        assert_eq!(CloseCode::from_u16(4000), CloseCode::Other(4000));
    }

    #[test]
    fn test_close_code_sendable() {
        assert!(CloseCode::Normal.is_sendable());
        assert!(CloseCode::UnexpectedCondition.is_sendable());
        assert!(CloseCode::Other(3000).is_sendable());
        assert!(CloseCode::Other(4999).is_sendable());
        assert!(!CloseCode::NoStatus.is_sendable());
        assert!(!CloseCode::Abnormal.is_sendable());
        assert!(!CloseCode::TlsHandshake.is_sendable());
        assert!(!CloseCode::Other(999).is_sendable());
        assert!(!CloseCode::Other(1004).is_sendable());
        assert!(!CloseCode::Other(2000).is_sendable());
        assert!(!CloseCode::Other(5000).is_sendable());
    }

    #[test]
    fn test_close_code_serializes_as_number() {
        let json = serde_json::to_string(&CloseCode::ProtocolError).unwrap();
        assert_eq!(json, "1002");
        let back: CloseCode = serde_json::from_str("1009").unwrap();
        assert_eq!(back, CloseCode::TooBig);
    }

    #[test]
    fn test_close_reason_display() {
        assert_eq!(CloseReason::normal().to_string(), "1000");
        assert_eq!(
            CloseReason::unexpected("boom").to_string(),
            "1011 (boom)"
        );
    }
}

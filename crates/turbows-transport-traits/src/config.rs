//! Transport configuration types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timeouts a transport applies around the opening handshake.
///
/// The engine itself holds no timers; these bound how long a transport
/// waits before giving up and closing the socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Connection establishment timeout.
    pub connect: Duration,

    /// Time allowed for the HTTP upgrade exchange once connected.
    pub handshake: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            handshake: Duration::from_secs(10),
        }
    }
}

impl TimeoutConfig {
    /// Create a configuration with short timeouts, suited to loopback peers.
    #[must_use]
    pub const fn fast() -> Self {
        Self {
            connect: Duration::from_secs(5),
            handshake: Duration::from_secs(2),
        }
    }

    /// Create a configuration with long timeouts for slow networks.
    #[must_use]
    pub const fn patient() -> Self {
        Self {
            connect: Duration::from_secs(60),
            handshake: Duration::from_secs(30),
        }
    }

    /// Override the handshake timeout.
    #[must_use]
    pub const fn with_handshake(mut self, handshake: Duration) -> Self {
        self.handshake = handshake;
        self
    }
}

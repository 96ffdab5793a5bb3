//! Per-connection traffic metrics.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// A serializable snapshot of a connection's traffic counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportMetrics {
    /// Total number of bytes handed to the writer.
    pub bytes_sent: u64,

    /// Total number of bytes delivered by the transport.
    pub bytes_received: u64,

    /// Total number of frames written.
    pub frames_sent: u64,

    /// Total number of frames decoded.
    pub frames_received: u64,

    /// Total number of complete messages delivered to the application.
    pub messages_received: u64,
}

/// A lock-free, atomic structure for metrics updates from the read and write paths.
#[derive(Debug, Default)]
pub struct AtomicMetrics {
    /// Total bytes sent (atomic counter).
    pub bytes_sent: AtomicU64,

    /// Total bytes received (atomic counter).
    pub bytes_received: AtomicU64,

    /// Total frames sent (atomic counter).
    pub frames_sent: AtomicU64,

    /// Total frames received (atomic counter).
    pub frames_received: AtomicU64,

    /// Total messages delivered (atomic counter).
    pub messages_received: AtomicU64,
}

impl AtomicMetrics {
    /// Creates a new `AtomicMetrics` instance with all counters initialized to zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one outgoing frame of `len` encoded bytes.
    pub fn record_sent(&self, len: usize) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(len as u64, Ordering::Relaxed);
    }

    /// Record one chunk of `len` bytes read from the transport.
    pub fn record_read(&self, len: usize) {
        self.bytes_received.fetch_add(len as u64, Ordering::Relaxed);
    }

    /// Creates a serializable `TransportMetrics` snapshot from the current atomic values.
    pub fn snapshot(&self) -> TransportMetrics {
        TransportMetrics {
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
        }
    }

    /// Resets all atomic metric counters to zero.
    pub fn reset(&self) {
        self.bytes_sent.store(0, Ordering::Relaxed);
        self.bytes_received.store(0, Ordering::Relaxed);
        self.frames_sent.store(0, Ordering::Relaxed);
        self.frames_received.store(0, Ordering::Relaxed);
        self.messages_received.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_metrics_default() {
        let metrics = AtomicMetrics::new();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot, TransportMetrics::default());
    }

    #[test]
    fn test_atomic_metrics_update() {
        let metrics = AtomicMetrics::new();
        metrics.record_sent(100);
        metrics.record_sent(20);
        metrics.record_read(7);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.bytes_sent, 120);
        assert_eq!(snapshot.frames_sent, 2);
        assert_eq!(snapshot.bytes_received, 7);
    }

    #[test]
    fn test_atomic_metrics_reset() {
        let metrics = AtomicMetrics::new();
        metrics.record_sent(100);
        metrics.reset();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.bytes_sent, 0);
        assert_eq!(snapshot.frames_sent, 0);
    }
}

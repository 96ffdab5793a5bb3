//! Transport boundary traits.
//!
//! All four traits are synchronous. A transport that is itself asynchronous
//! implements [`Writer`] by enqueueing bytes for a writer task and calls
//! [`ReadHandler::handle`] from its read loop.

use bytes::Bytes;

use crate::close::CloseReason;
use crate::error::TransportResult;

/// Outgoing half of a transport.
///
/// Writes may be issued concurrently from different threads (an application
/// thread sending while the I/O thread answers a ping), so implementations
/// must serialize them internally.
pub trait Writer: Send + Sync + std::fmt::Debug {
    /// Queue `data` for delivery to the peer.
    fn write(&self, data: Bytes) -> TransportResult<()>;

    /// Flush pending writes and tear the transport down.
    ///
    /// Calling `close` more than once is harmless.
    fn close(&self) -> TransportResult<()>;
}

/// Receives the single notification that a connection has ended.
///
/// The engine guarantees `on_close` runs exactly once per connection,
/// whichever side initiated the closure.
pub trait CloseListener: Send + Sync {
    /// Called once when the connection is closed.
    fn on_close(&self, reason: &CloseReason);
}

impl<F> CloseListener for F
where
    F: Fn(&CloseReason) + Send + Sync,
{
    fn on_close(&self, reason: &CloseReason) {
        self(reason);
    }
}

/// Incoming half of a transport: the handler the transport feeds byte chunks to.
///
/// The transport must not deliver two chunks for the same connection
/// concurrently.
pub trait ReadHandler: Send + Sync {
    /// Process one chunk of bytes read from the peer.
    fn handle(&self, data: &[u8]) -> TransportResult<()>;
}

/// Invoked by a client transport when an opening handshake takes too long.
///
/// The handler is expected to close the underlying transport; the engine
/// then observes that as an ordinary close.
pub trait TimeoutHandler: Send + Sync {
    /// The handshake deadline elapsed.
    fn handle_timeout(&self);
}

impl<F> TimeoutHandler for F
where
    F: Fn() + Send + Sync,
{
    fn handle_timeout(&self) {
        self();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::close::CloseCode;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // Traits must stay object safe.
    fn _test_writer_object(_w: &dyn Writer) {}
    fn _test_listener_object(_l: &dyn CloseListener) {}
    fn _test_read_handler_object(_r: &dyn ReadHandler) {}
    fn _test_timeout_object(_t: &dyn TimeoutHandler) {}

    #[test]
    fn test_closure_as_close_listener() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let listener: Arc<dyn CloseListener> = Arc::new(move |reason: &CloseReason| {
            assert_eq!(reason.code, CloseCode::Normal);
            seen.fetch_add(1, Ordering::SeqCst);
        });
        listener.on_close(&CloseReason::normal());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_closure_as_timeout_handler() {
        let fired = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&fired);
        let handler: Arc<dyn TimeoutHandler> = Arc::new(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        handler.handle_timeout();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}

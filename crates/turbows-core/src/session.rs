//! The application-facing handle of a connection.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::debug;
use turbows_protocol::{Extension, Frame, Negotiated, ProtocolVersion, Role, encode_frame};
use turbows_transport_traits::{
    AtomicMetrics, CloseListener, CloseReason, TransportError, TransportMetrics, TransportResult,
    Writer,
};

use crate::application::EndpointHandler;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

struct SessionInner {
    id: u64,
    role: Role,
    negotiated: Negotiated,
    request_uri: String,
    path_parameters: HashMap<String, String>,
    writer: Arc<dyn Writer>,
    listener: Arc<dyn CloseListener>,
    metrics: AtomicMetrics,
    open: AtomicBool,
    close_reason: Mutex<Option<CloseReason>>,
    handler: Mutex<Box<dyn EndpointHandler>>,
    pending_close: Mutex<PendingClose>,
}

/// Close notifications not delivered yet. The handler hears first, the
/// listener after it.
#[derive(Default)]
struct PendingClose {
    handler: Option<CloseReason>,
    listener: Option<CloseReason>,
}

/// A cloneable handle to one WebSocket connection.
///
/// Sending is safe from any thread; writes are serialized by the transport's
/// [`Writer`]. Once the session is closed every send fails with
/// [`TransportError::Closed`].
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub(crate) fn new(
        role: Role,
        negotiated: Negotiated,
        request_uri: String,
        path_parameters: HashMap<String, String>,
        writer: Arc<dyn Writer>,
        listener: Arc<dyn CloseListener>,
        handler: Box<dyn EndpointHandler>,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
                role,
                negotiated,
                request_uri,
                path_parameters,
                writer,
                listener,
                metrics: AtomicMetrics::new(),
                open: AtomicBool::new(true),
                close_reason: Mutex::new(None),
                handler: Mutex::new(handler),
                pending_close: Mutex::new(PendingClose::default()),
            }),
        }
    }

    /// Process-unique session id.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Which end of the connection this is.
    pub fn role(&self) -> Role {
        self.inner.role
    }

    /// Negotiated protocol version.
    pub fn version(&self) -> ProtocolVersion {
        self.inner.negotiated.version
    }

    /// Negotiated sub-protocol.
    pub fn subprotocol(&self) -> Option<&str> {
        self.inner.negotiated.subprotocol.as_deref()
    }

    /// Negotiated extensions.
    pub fn extensions(&self) -> &[Extension] {
        &self.inner.negotiated.extensions
    }

    /// Request target of the upgrade request.
    pub fn request_uri(&self) -> &str {
        &self.inner.request_uri
    }

    /// Path parameters extracted by the router.
    pub fn path_parameters(&self) -> &HashMap<String, String> {
        &self.inner.path_parameters
    }

    /// One path parameter.
    pub fn path_parameter(&self, name: &str) -> Option<&str> {
        self.inner.path_parameters.get(name).map(String::as_str)
    }

    /// The session has not been closed.
    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::Acquire)
    }

    /// Why the session closed, once it has.
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.inner.close_reason.lock().clone()
    }

    /// Traffic counters.
    pub fn metrics(&self) -> TransportMetrics {
        self.inner.metrics.snapshot()
    }

    pub(crate) fn atomic_metrics(&self) -> &AtomicMetrics {
        &self.inner.metrics
    }

    /// Send a raw frame.
    ///
    /// # Errors
    ///
    /// [`TransportError::Closed`] after close, or whatever the writer reports.
    pub fn send(&self, frame: Frame) -> TransportResult<()> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        self.write_frame(&frame)
    }

    /// Send a text message.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub fn send_text(&self, text: impl Into<String>) -> TransportResult<()> {
        self.send(Frame::text(text))
    }

    /// Send a binary message.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub fn send_binary(&self, data: impl Into<Bytes>) -> TransportResult<()> {
        self.send(Frame::binary(data))
    }

    /// Send a ping.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub fn send_ping(&self, data: impl Into<Bytes>) -> TransportResult<()> {
        self.send(Frame::ping(data))
    }

    /// Send an unsolicited pong.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub fn send_pong(&self, data: impl Into<Bytes>) -> TransportResult<()> {
        self.send(Frame::pong(data))
    }

    /// Close the session: send a close frame, tear the transport down and
    /// notify the handler, then the close listener. Calling it again does
    /// nothing.
    pub fn close(&self, reason: CloseReason) {
        let frame = if reason.code.is_sendable() {
            Frame::close(Some(&reason))
        } else {
            Frame::close(None)
        };
        self.terminate(reason, Some(frame));
    }

    fn write_frame(&self, frame: &Frame) -> TransportResult<()> {
        let bytes = encode_frame(self.inner.role, frame);
        self.inner.metrics.record_sent(bytes.len());
        self.inner.writer.write(bytes)
    }

    /// Move to closed exactly once. `frame` is written first when given.
    ///
    /// Returns `false` if the session was already closed.
    pub(crate) fn terminate(&self, reason: CloseReason, frame: Option<Frame>) -> bool {
        if !self.inner.open.swap(false, Ordering::AcqRel) {
            return false;
        }
        debug!(session = self.inner.id, reason = %reason, "closing session");
        *self.inner.close_reason.lock() = Some(reason.clone());

        if let Some(frame) = frame
            && let Err(err) = self.write_frame(&frame)
        {
            debug!(session = self.inner.id, error = %err, "close frame not delivered");
        }
        if let Err(err) = self.inner.writer.close() {
            debug!(session = self.inner.id, error = %err, "writer close failed");
        }

        *self.inner.pending_close.lock() = PendingClose {
            handler: Some(reason.clone()),
            listener: Some(reason),
        };
        self.drain_pending_close();
        true
    }

    /// Run `f` with exclusive access to the handler, then deliver any close
    /// notification queued while it ran.
    pub(crate) fn with_handler<R>(
        &self,
        f: impl FnOnce(&mut dyn EndpointHandler, &Self) -> R,
    ) -> R {
        let result = {
            let mut handler = self.inner.handler.lock();
            f(handler.as_mut(), self)
        };
        self.drain_pending_close();
        result
    }

    /// Deliver queued close notifications if the handler is free. When a
    /// callback is running, whoever holds the handler lock delivers them on
    /// release. The listener is only told once the handler has been.
    fn drain_pending_close(&self) {
        loop {
            let mut pending = self.inner.pending_close.lock();
            if pending.handler.is_some() {
                let Some(mut handler) = self.inner.handler.try_lock() else {
                    return;
                };
                let reason = pending.handler.take();
                drop(pending);
                if let Some(reason) = reason {
                    handler.on_close(self, &reason);
                }
                continue;
            }
            let reason = pending.listener.take();
            drop(pending);
            if let Some(reason) = reason {
                self.inner.listener.on_close(&reason);
            }
            return;
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("role", &self.inner.role)
            .field("version", &self.inner.negotiated.version)
            .field("request_uri", &self.inner.request_uri)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

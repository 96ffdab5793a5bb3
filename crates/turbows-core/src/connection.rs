//! A live connection: reassembles reads into frames and dispatches them.

use std::sync::atomic::Ordering;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tracing::{debug, warn};
use turbows_protocol::{Frame, FrameCodec, FramingError, IncomingBuffer, Opcode};
use turbows_transport_traits::{
    CloseCode, CloseReason, ReadHandler, TransportMetrics, TransportResult,
};

use crate::error::{ConnectionError, ConnectionResult, HandlerResult};
use crate::session::Session;

/// Per-connection read state, touched only from the transport's read path.
#[derive(Debug)]
struct ReadState {
    buffer: IncomingBuffer,
    codec: FrameCodec,
    /// Opcode and data of a fragmented message still being received.
    message: Option<(Opcode, BytesMut)>,
}

/// One negotiated WebSocket connection bound to a transport.
///
/// The transport calls [`handle_read`](Self::handle_read) for each chunk it
/// reads and [`on_transport_closed`](Self::on_transport_closed) when the
/// socket goes away. Reads must not be delivered concurrently.
#[derive(Debug)]
pub struct Connection {
    session: Session,
    max_message_size: usize,
    read: Mutex<ReadState>,
}

impl Connection {
    /// Bind `session` to a fresh read path and deliver `on_open`.
    pub(crate) fn open(
        session: Session,
        codec: FrameCodec,
        buffer: IncomingBuffer,
        max_message_size: usize,
    ) -> Self {
        let connection = Self {
            session,
            max_message_size,
            read: Mutex::new(ReadState {
                buffer,
                codec,
                message: None,
            }),
        };
        debug!(
            session = connection.session.id(),
            uri = connection.session.request_uri(),
            "connection opened"
        );
        let result = connection.session.with_handler(|h, s| h.on_open(s));
        // A failing on_open closes the connection the same way a failing message callback does.
        let _ = connection.handle_callback_result(result);
        connection
    }

    /// The session handle for this connection.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The connection has not been closed.
    pub fn is_open(&self) -> bool {
        self.session.is_open()
    }

    /// Traffic counters.
    pub fn metrics(&self) -> TransportMetrics {
        self.session.metrics()
    }

    /// Feed one transport read.
    ///
    /// Appends to the incoming buffer, then decodes and dispatches frames
    /// until only a partial frame remains.
    ///
    /// # Errors
    ///
    /// [`ConnectionError::Closed`] if the connection is already closed. Any
    /// other error means the connection has just been closed because of it:
    /// framing errors with their own code, buffer overflow and handler
    /// failures with 1011.
    pub fn handle_read(&self, data: &[u8]) -> ConnectionResult<()> {
        if !self.session.is_open() {
            return Err(ConnectionError::Closed);
        }
        self.session.atomic_metrics().record_read(data.len());

        let mut guard = self.read.lock();
        let state = &mut *guard;

        if let Err(overflow) = state.buffer.append(data) {
            warn!(session = self.session.id(), error = %overflow, "incoming buffer overflow");
            state.buffer.clear();
            self.session.close(overflow.close_reason());
            return Err(overflow.into());
        }

        loop {
            let frame = match state.codec.unframe(state.buffer.bytes_mut()) {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(err) => {
                    state.buffer.clear();
                    return Err(self.fail(err));
                }
            };
            self.session
                .atomic_metrics()
                .frames_received
                .fetch_add(1, Ordering::Relaxed);

            if let Err(err) = self.dispatch(&mut state.message, frame) {
                state.buffer.clear();
                return Err(err);
            }
            if !self.session.is_open() {
                state.buffer.clear();
                break;
            }
        }

        state.buffer.release_if_drained();
        Ok(())
    }

    /// Close locally with `reason`. Idempotent.
    pub fn close(&self, reason: CloseReason) {
        self.session.close(reason);
    }

    /// The transport went away without a close handshake.
    ///
    /// Reports 1006 to the handler and listener unless the connection was
    /// already closed.
    pub fn on_transport_closed(&self) {
        if self
            .session
            .terminate(CloseReason::abnormal("transport closed"), None)
        {
            debug!(session = self.session.id(), "transport closed underneath connection");
        }
    }

    fn fail(&self, err: FramingError) -> ConnectionError {
        warn!(session = self.session.id(), error = %err, "framing error");
        self.session.close(err.close_reason());
        ConnectionError::Framing(err)
    }

    fn dispatch(
        &self,
        message: &mut Option<(Opcode, BytesMut)>,
        frame: Frame,
    ) -> ConnectionResult<()> {
        match frame.opcode {
            Opcode::Text | Opcode::Binary => {
                self.check_message_size(frame.payload.len())?;
                if frame.fin {
                    self.deliver(frame.opcode, frame.payload)
                } else {
                    *message = Some((frame.opcode, BytesMut::from(&frame.payload[..])));
                    Ok(())
                }
            }
            Opcode::Continuation => {
                let Some((_, data)) = message.as_mut() else {
                    return Err(self.fail(FramingError::protocol_error(
                        "Continuation frame without a message in progress",
                    )));
                };
                self.check_message_size(data.len() + frame.payload.len())?;
                data.extend_from_slice(&frame.payload);
                if !frame.fin {
                    return Ok(());
                }
                match message.take() {
                    Some((opcode, data)) => self.deliver(opcode, data.freeze()),
                    None => Ok(()),
                }
            }
            Opcode::Ping => {
                if let Err(err) = self.session.send(Frame::pong(frame.payload.clone())) {
                    debug!(session = self.session.id(), error = %err, "pong not sent");
                }
                let result = self.session.with_handler(|h, s| {
                    if s.is_open() { h.on_ping(s, frame.payload) } else { Ok(()) }
                });
                self.handle_callback_result(result)
            }
            Opcode::Pong => {
                let result = self.session.with_handler(|h, s| {
                    if s.is_open() { h.on_pong(s, frame.payload) } else { Ok(()) }
                });
                self.handle_callback_result(result)
            }
            Opcode::Close => {
                let reason = frame.close_reason().map_err(|err| self.fail(err))?;
                let echo = reason
                    .as_ref()
                    .map(|r| CloseReason::new(r.code, String::new()));
                debug!(
                    session = self.session.id(),
                    code = reason.as_ref().map(|r| r.code.as_u16()),
                    "peer closed connection"
                );
                self.session.terminate(
                    reason.unwrap_or_else(|| CloseReason::new(CloseCode::NoStatus, "")),
                    Some(Frame::close(echo.as_ref())),
                );
                Ok(())
            }
        }
    }

    fn check_message_size(&self, size: usize) -> ConnectionResult<()> {
        if size > self.max_message_size {
            return Err(self.fail(FramingError::too_big(format!(
                "Message of {size} bytes exceeds limit of {}",
                self.max_message_size
            ))));
        }
        Ok(())
    }

    fn deliver(&self, opcode: Opcode, data: Bytes) -> ConnectionResult<()> {
        self.session
            .atomic_metrics()
            .messages_received
            .fetch_add(1, Ordering::Relaxed);

        let result = if opcode == Opcode::Text {
            let text = String::from_utf8(data.to_vec()).map_err(|_| {
                self.fail(FramingError::invalid_payload("Text message is not valid UTF-8"))
            })?;
            self.session.with_handler(|h, s| {
                if s.is_open() { h.on_text(s, text) } else { Ok(()) }
            })
        } else {
            self.session.with_handler(|h, s| {
                if s.is_open() { h.on_binary(s, data) } else { Ok(()) }
            })
        };
        self.handle_callback_result(result)
    }

    /// A callback error goes to `on_error`; unless it declines, the
    /// connection closes with 1011.
    fn handle_callback_result(&self, result: HandlerResult) -> ConnectionResult<()> {
        let Err(error) = result else {
            return Ok(());
        };
        warn!(session = self.session.id(), error = %error, "application handler failed");

        let close = self
            .session
            .with_handler(|h, s| h.on_error(s, &error));
        if close {
            self.session.close(CloseReason::unexpected(error.to_string()));
            return Err(ConnectionError::Handler(error.to_string()));
        }
        Ok(())
    }
}

impl ReadHandler for Connection {
    fn handle(&self, data: &[u8]) -> TransportResult<()> {
        self.handle_read(data).map_err(Into::into)
    }
}

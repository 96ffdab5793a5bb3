//! Recording test doubles shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use turbows_core::{EndpointHandler, HandlerResult, Session};
use turbows_protocol::{
    Frame, FrameCodec, Role, UpgradeRequest, encode_frame,
    headers::{CONNECTION, SEC_WEBSOCKET_KEY, SEC_WEBSOCKET_VERSION, UPGRADE},
};
use turbows_transport_traits::{CloseListener, CloseReason, TransportError, TransportResult, Writer};

/// Collects everything written and counts `close()` calls.
#[derive(Debug, Default)]
pub struct RecordingWriter {
    written: Mutex<Vec<Bytes>>,
    closes: Mutex<usize>,
}

impl RecordingWriter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn close_count(&self) -> usize {
        *self.closes.lock()
    }

    /// Drain everything written so far as one contiguous chunk.
    pub fn take_bytes(&self) -> Vec<u8> {
        self.written.lock().drain(..).flat_map(|chunk| chunk.to_vec()).collect()
    }

    /// Decode every written frame as the peer in `peer_role` would.
    pub fn frames(&self, peer_role: Role) -> Vec<Frame> {
        let mut codec = FrameCodec::new(peer_role, false);
        let mut buf = BytesMut::new();
        for chunk in self.written.lock().iter() {
            buf.extend_from_slice(chunk);
        }
        let mut frames = Vec::new();
        while let Some(frame) = codec.unframe(&mut buf).expect("server wrote a valid frame") {
            frames.push(frame);
        }
        frames
    }
}

impl Writer for RecordingWriter {
    fn write(&self, data: Bytes) -> TransportResult<()> {
        if *self.closes.lock() > 0 {
            return Err(TransportError::Closed);
        }
        self.written.lock().push(data);
        Ok(())
    }

    fn close(&self) -> TransportResult<()> {
        *self.closes.lock() += 1;
        Ok(())
    }
}

/// Records every close notification.
#[derive(Debug, Default)]
pub struct RecordingListener {
    pub reasons: Mutex<Vec<CloseReason>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reasons(&self) -> Vec<CloseReason> {
        self.reasons.lock().clone()
    }
}

impl CloseListener for RecordingListener {
    fn on_close(&self, reason: &CloseReason) {
        self.reasons.lock().push(reason.clone());
    }
}

/// What a [`RecordingHandler`] observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Open,
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close(CloseReason),
    Error(String),
}

/// How the handler reacts.
#[derive(Debug, Clone, Copy, Default)]
pub struct Behavior {
    /// Echo text and binary messages back.
    pub echo: bool,
    /// Return an error from `on_text`.
    pub fail_on_text: bool,
    /// Value returned from `on_error`.
    pub keep_open_on_error: bool,
    /// Close the session from inside `on_text`.
    pub close_on_text: bool,
}

impl Behavior {
    pub fn echo() -> Self {
        Self {
            echo: true,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_on_text: true,
            ..Self::default()
        }
    }

    pub fn closing() -> Self {
        Self {
            close_on_text: true,
            ..Self::default()
        }
    }
}

/// Records callbacks into a shared event log.
pub struct RecordingHandler {
    pub events: Arc<Mutex<Vec<Event>>>,
    pub behavior: Behavior,
}

impl RecordingHandler {
    pub fn new(behavior: Behavior) -> (Box<dyn EndpointHandler>, Arc<Mutex<Vec<Event>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let handler = Self {
            events: Arc::clone(&events),
            behavior,
        };
        (Box::new(handler), events)
    }
}

impl EndpointHandler for RecordingHandler {
    fn on_open(&mut self, _session: &Session) -> HandlerResult {
        self.events.lock().push(Event::Open);
        Ok(())
    }

    fn on_text(&mut self, session: &Session, text: String) -> HandlerResult {
        self.events.lock().push(Event::Text(text.clone()));
        if self.behavior.fail_on_text {
            return Err("text rejected".into());
        }
        if self.behavior.close_on_text {
            session.close(CloseReason::normal());
            return Ok(());
        }
        if self.behavior.echo {
            session.send_text(text)?;
        }
        Ok(())
    }

    fn on_binary(&mut self, session: &Session, data: Bytes) -> HandlerResult {
        self.events.lock().push(Event::Binary(data.to_vec()));
        if self.behavior.echo {
            session.send_binary(data)?;
        }
        Ok(())
    }

    fn on_ping(&mut self, _session: &Session, data: Bytes) -> HandlerResult {
        self.events.lock().push(Event::Ping(data.to_vec()));
        Ok(())
    }

    fn on_pong(&mut self, _session: &Session, data: Bytes) -> HandlerResult {
        self.events.lock().push(Event::Pong(data.to_vec()));
        Ok(())
    }

    fn on_close(&mut self, _session: &Session, reason: &CloseReason) {
        self.events.lock().push(Event::Close(reason.clone()));
    }

    fn on_error(&mut self, _session: &Session, error: &turbows_core::BoxError) -> bool {
        self.events.lock().push(Event::Error(error.to_string()));
        !self.behavior.keep_open_on_error
    }
}

/// A valid RFC 6455 upgrade request for `path`.
pub fn upgrade_request(path: &str) -> UpgradeRequest {
    UpgradeRequest::get(path)
        .with_header("Host", "localhost")
        .with_header(UPGRADE, "websocket")
        .with_header(CONNECTION, "Upgrade")
        .with_header(SEC_WEBSOCKET_KEY, "dGhlIHNhbXBsZSBub25jZQ==")
        .with_header(SEC_WEBSOCKET_VERSION, "13")
}

/// Bytes a client would send for `frame`.
pub fn client_frame(frame: &Frame) -> Bytes {
    encode_frame(Role::Client, frame)
}

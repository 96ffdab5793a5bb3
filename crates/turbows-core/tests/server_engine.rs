//! Server engine: upgrade outcomes and connection behaviour.

mod common;

use std::sync::Arc;

use common::{
    Behavior, Event, RecordingHandler, RecordingListener, RecordingWriter, client_frame,
    upgrade_request,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use turbows_core::{
    Application, Connection, ConnectionError, EngineConfig, UpgradeInfo, UpgradeStatus,
    WebSocketEngine,
};
use turbows_protocol::headers::{SEC_WEBSOCKET_PROTOCOL, SEC_WEBSOCKET_VERSION};
use turbows_protocol::{
    CloseCode, CloseReason, Frame, Opcode, Role, UpgradeRequest, UpgradeResponse,
};
use turbows_transport_traits::TransportError;

struct Harness {
    connection: Connection,
    writer: Arc<RecordingWriter>,
    listener: Arc<RecordingListener>,
    events: Arc<Mutex<Vec<Event>>>,
}

impl Harness {
    fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    fn sent(&self) -> Vec<Frame> {
        self.writer.frames(Role::Client)
    }
}

/// Holds the event log of the most recently created handler.
type EventSlot = Arc<Mutex<Option<Arc<Mutex<Vec<Event>>>>>>;

fn engine_with(config: EngineConfig, behavior: Behavior) -> (WebSocketEngine, EventSlot) {
    let engine = WebSocketEngine::new(config);
    let last_events = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&last_events);
    engine
        .register(
            Application::builder("/chat/{room}")
                .subprotocols(["v2", "v1"])
                .handler(move |_| {
                    let (handler, events) = RecordingHandler::new(behavior);
                    *slot.lock() = Some(events);
                    handler
                })
                .build()
                .unwrap(),
        )
        .unwrap();
    (engine, last_events)
}

fn connect_with(config: EngineConfig, behavior: Behavior) -> Harness {
    let (engine, last_events) = engine_with(config, behavior);
    let mut request = upgrade_request("/chat/lobby");
    let mut response = UpgradeResponse::new();
    let info = engine.upgrade(&mut request, &mut response);
    assert_eq!(info.status(), UpgradeStatus::Success);

    let writer = RecordingWriter::new();
    let listener = RecordingListener::new();
    let connection = info
        .create_connection(writer.clone(), listener.clone())
        .expect("successful upgrade creates a connection");
    let events = last_events.lock().clone().unwrap();
    Harness {
        connection,
        writer,
        listener,
        events,
    }
}

fn connect(behavior: Behavior) -> Harness {
    connect_with(EngineConfig::default(), behavior)
}

#[test]
fn test_request_without_upgrade_header_not_applicable() {
    let (engine, _) = engine_with(EngineConfig::default(), Behavior::default());
    let mut request = UpgradeRequest::get("/chat/lobby");
    let mut response = UpgradeResponse::new();
    let info = engine.upgrade(&mut request, &mut response);
    assert_eq!(info.status(), UpgradeStatus::NotApplicable);
    assert_eq!(response.status, 200);
}

#[test]
fn test_routing_miss_not_applicable_with_500() {
    let (engine, _) = engine_with(EngineConfig::default(), Behavior::default());
    let mut request = upgrade_request("/unknown");
    let mut response = UpgradeResponse::new();
    let info = engine.upgrade(&mut request, &mut response);
    assert_eq!(info.status(), UpgradeStatus::NotApplicable);
    assert_eq!(response.status, 500);
    let writer = RecordingWriter::new();
    assert!(info.create_connection(writer, RecordingListener::new()).is_none());
}

#[test]
fn test_unsupported_version_handshake_failed_426() {
    let (engine, _) = engine_with(EngineConfig::default(), Behavior::default());
    let mut request = upgrade_request("/chat/lobby");
    request.headers.insert(SEC_WEBSOCKET_VERSION, "99");
    let mut response = UpgradeResponse::new();
    let info = engine.upgrade(&mut request, &mut response);
    assert_eq!(info.status(), UpgradeStatus::HandshakeFailed);
    assert_eq!(response.status, 426);
    assert_eq!(response.headers.list(SEC_WEBSOCKET_VERSION), ["13", "8"]);
}

#[test]
fn test_bad_key_handshake_failed_400() {
    let (engine, _) = engine_with(EngineConfig::default(), Behavior::default());
    let mut request = upgrade_request("/chat/lobby");
    request.headers.insert("Sec-WebSocket-Key", "not a key");
    let mut response = UpgradeResponse::new();
    match engine.upgrade(&mut request, &mut response) {
        UpgradeInfo::HandshakeFailed(err) => assert_eq!(err.status_code(), 400),
        other => panic!("expected handshake failure, got {other:?}"),
    }
    assert_eq!(response.status, 400);
}

#[test]
fn test_success_negotiates_subprotocol_and_parameters() {
    let (engine, _) = engine_with(EngineConfig::default(), Behavior::default());
    let mut request = upgrade_request("/chat/r%C3%B6om?token=1")
        .with_header(SEC_WEBSOCKET_PROTOCOL, "v1, v2");
    let mut response = UpgradeResponse::new();
    let UpgradeInfo::Success(upgrade) = engine.upgrade(&mut request, &mut response) else {
        panic!("upgrade should succeed");
    };
    assert_eq!(response.status, 101);
    // First requested sub-protocol the application supports.
    assert_eq!(response.header(SEC_WEBSOCKET_PROTOCOL), Some("v1"));
    assert_eq!(upgrade.request().path_parameter("room"), Some("röom"));
    assert_eq!(upgrade.application().path(), "/chat/{room}");

    let connection = upgrade.create_connection(RecordingWriter::new(), RecordingListener::new());
    assert_eq!(connection.session().subprotocol(), Some("v1"));
    assert_eq!(connection.session().path_parameter("room"), Some("röom"));
}

#[test]
fn test_unregister_makes_path_not_applicable() {
    let (engine, _) = engine_with(EngineConfig::default(), Behavior::default());
    let registered = engine.applications();
    assert_eq!(registered.len(), 1);
    assert!(engine.unregister(&registered[0]));

    let mut response = UpgradeResponse::new();
    let info = engine.upgrade(&mut upgrade_request("/chat/lobby"), &mut response);
    assert_eq!(info.status(), UpgradeStatus::NotApplicable);
}

#[test]
fn test_text_echo_and_open_event() {
    let harness = connect(Behavior::echo());
    harness
        .connection
        .handle_read(&client_frame(&Frame::text("hello")))
        .unwrap();

    assert_eq!(harness.events(), [Event::Open, Event::Text("hello".into())]);
    let sent = harness.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].opcode, Opcode::Text);
    assert_eq!(&sent[0].payload[..], b"hello");
    assert!(sent[0].mask.is_none());

    let metrics = harness.connection.metrics();
    assert_eq!(metrics.frames_received, 1);
    assert_eq!(metrics.messages_received, 1);
    assert_eq!(metrics.frames_sent, 1);
}

#[test]
fn test_fragmented_message_one_byte_reads() {
    let harness = connect(Behavior::default());
    let mut wire = Vec::new();
    wire.extend_from_slice(&client_frame(&Frame::text("frag").with_fin(false)));
    wire.extend_from_slice(&client_frame(&Frame::ping("p")));
    wire.extend_from_slice(&client_frame(&Frame::continuation("men", false)));
    wire.extend_from_slice(&client_frame(&Frame::continuation("ted", true)));

    for byte in &wire {
        harness.connection.handle_read(std::slice::from_ref(byte)).unwrap();
    }

    assert_eq!(
        harness.events(),
        [Event::Open, Event::Ping(b"p".to_vec()), Event::Text("fragmented".into())]
    );
    // Ping answered automatically.
    let sent = harness.sent();
    assert_eq!(sent[0].opcode, Opcode::Pong);
    assert_eq!(&sent[0].payload[..], b"p");
}

#[test]
fn test_peer_close_echoed_once() {
    let harness = connect(Behavior::default());
    let close = Frame::close(Some(&CloseReason::new(CloseCode::GoingAway, "bye")));
    harness.connection.handle_read(&client_frame(&close)).unwrap();

    let reason = CloseReason::new(CloseCode::GoingAway, "bye");
    assert_eq!(harness.events().last(), Some(&Event::Close(reason.clone())));
    assert_eq!(harness.listener.reasons(), [reason]);

    let sent = harness.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].opcode, Opcode::Close);
    assert_eq!(&sent[0].payload[..], &1001u16.to_be_bytes());
    assert_eq!(harness.writer.close_count(), 1);

    // Closed: reads and sends fail fast, close is idempotent.
    assert!(matches!(
        harness.connection.handle_read(&client_frame(&Frame::text("late"))),
        Err(ConnectionError::Closed)
    ));
    assert_eq!(
        harness.connection.session().send_text("late"),
        Err(TransportError::Closed)
    );
    harness.connection.close(CloseReason::normal());
    harness.connection.on_transport_closed();
    assert_eq!(harness.listener.reasons().len(), 1);
    assert_eq!(harness.writer.close_count(), 1);
}

#[test]
fn test_empty_close_echoes_empty_payload() {
    let harness = connect(Behavior::default());
    harness
        .connection
        .handle_read(&client_frame(&Frame::close(None)))
        .unwrap();
    let sent = harness.sent();
    assert!(sent[0].payload.is_empty());
    assert_eq!(harness.listener.reasons()[0].code, CloseCode::NoStatus);
}

#[test]
fn test_unmasked_frame_closes_with_1002() {
    let harness = connect(Behavior::default());
    let err = harness
        .connection
        .handle_read(&[0x81, 0x02, b'h', b'i'])
        .unwrap_err();
    assert!(matches!(err, ConnectionError::Framing(ref e) if e.code == CloseCode::ProtocolError));

    let reasons = harness.listener.reasons();
    assert_eq!(reasons.len(), 1);
    assert_eq!(reasons[0].code, CloseCode::ProtocolError);
    let sent = harness.sent();
    assert_eq!(sent[0].close_reason().unwrap().unwrap().code, CloseCode::ProtocolError);
}

#[test]
fn test_buffer_overflow_closes_with_1011() {
    let config = EngineConfig::builder()
        .incoming_buffer_size(512)
        .buffer_step_size(256)
        .build()
        .unwrap();
    let harness = connect_with(config, Behavior::default());

    // A partial frame that never completes and keeps growing.
    let frame = client_frame(&Frame::binary(vec![0u8; 2000]));
    harness.connection.handle_read(&frame[..512]).unwrap();
    let err = harness.connection.handle_read(&frame[512..513]).unwrap_err();
    assert!(matches!(err, ConnectionError::Overflow(_)));
    assert_eq!(harness.listener.reasons()[0].code, CloseCode::UnexpectedCondition);
}

#[test]
fn test_message_too_big_closes_with_1009() {
    let config = EngineConfig::builder().max_message_size(8).build().unwrap();
    let harness = connect_with(config, Behavior::default());
    let mut wire = Vec::new();
    wire.extend_from_slice(&client_frame(&Frame::binary(vec![1u8; 6]).with_fin(false)));
    wire.extend_from_slice(&client_frame(&Frame::continuation(vec![2u8; 6], true)));

    let err = harness.connection.handle_read(&wire).unwrap_err();
    assert!(matches!(err, ConnectionError::Framing(ref e) if e.code == CloseCode::TooBig));
    assert_eq!(harness.listener.reasons()[0].code, CloseCode::TooBig);
}

#[test]
fn test_invalid_utf8_text_closes_with_1007() {
    let harness = connect(Behavior::default());
    let frame = Frame::new(Opcode::Text, vec![0xC3, 0x28]);
    let err = harness.connection.handle_read(&client_frame(&frame)).unwrap_err();
    assert!(matches!(err, ConnectionError::Framing(ref e) if e.code == CloseCode::InvalidPayload));
}

#[test]
fn test_handler_error_closes_with_1011() {
    let harness = connect(Behavior::failing());
    let err = harness
        .connection
        .handle_read(&client_frame(&Frame::text("boom")))
        .unwrap_err();
    assert!(matches!(err, ConnectionError::Handler(_)));

    let events = harness.events();
    assert_eq!(events[2], Event::Error("text rejected".into()));
    assert!(matches!(&events[3], Event::Close(r) if r.code == CloseCode::UnexpectedCondition));
    assert_eq!(harness.listener.reasons()[0].code, CloseCode::UnexpectedCondition);
}

#[test]
fn test_handler_error_can_keep_connection_open() {
    let harness = connect(Behavior {
        fail_on_text: true,
        keep_open_on_error: true,
        ..Behavior::default()
    });
    harness
        .connection
        .handle_read(&client_frame(&Frame::text("boom")))
        .unwrap();
    assert!(harness.connection.is_open());
    assert!(harness.listener.reasons().is_empty());
}

#[test]
fn test_close_from_inside_callback_notifies_once() {
    let harness = connect(Behavior::closing());
    let mut wire = Vec::new();
    wire.extend_from_slice(&client_frame(&Frame::text("bye")));
    wire.extend_from_slice(&client_frame(&Frame::text("never delivered")));
    harness.connection.handle_read(&wire).unwrap();

    assert_eq!(
        harness.events(),
        [
            Event::Open,
            Event::Text("bye".into()),
            Event::Close(CloseReason::normal())
        ]
    );
    assert_eq!(harness.listener.reasons(), [CloseReason::normal()]);
    assert_eq!(harness.sent()[0].opcode, Opcode::Close);
}

#[test]
fn test_listener_hears_close_after_handler() {
    let (engine, last_events) = engine_with(EngineConfig::default(), Behavior::closing());
    let mut request = upgrade_request("/chat/lobby");
    let mut response = UpgradeResponse::new();
    let info = engine.upgrade(&mut request, &mut response);

    let seen_by_listener = Arc::new(Mutex::new(Vec::new()));
    let listener = {
        let slot = Arc::clone(&last_events);
        let seen = Arc::clone(&seen_by_listener);
        Arc::new(move |_: &CloseReason| {
            let events = slot.lock().clone().unwrap();
            seen.lock().push(events.lock().clone());
        })
    };
    let connection = info
        .create_connection(RecordingWriter::new(), listener)
        .expect("successful upgrade creates a connection");
    connection
        .handle_read(&client_frame(&Frame::text("bye")))
        .unwrap();

    let seen = seen_by_listener.lock().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].last(), Some(&Event::Close(CloseReason::normal())));
}

#[test]
fn test_transport_close_reports_1006() {
    let harness = connect(Behavior::default());
    harness.connection.on_transport_closed();
    assert_eq!(harness.listener.reasons()[0].code, CloseCode::Abnormal);
    assert!(harness.sent().is_empty());
    assert!(matches!(
        harness.events().last(),
        Some(Event::Close(r)) if r.code == CloseCode::Abnormal
    ));
}

#[test]
fn test_local_close_sends_frame_and_notifies() {
    let harness = connect(Behavior::default());
    harness
        .connection
        .close(CloseReason::new(CloseCode::GoingAway, "shutdown"));
    let sent = harness.sent();
    let reason = sent[0].close_reason().unwrap().unwrap();
    assert_eq!(reason.code, CloseCode::GoingAway);
    assert_eq!(reason.reason, "shutdown");
    assert_eq!(harness.listener.reasons().len(), 1);
    assert!(!harness.connection.is_open());
}

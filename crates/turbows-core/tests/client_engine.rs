//! Client engine against an in-process server engine.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::{Behavior, Event, RecordingHandler, RecordingListener, RecordingWriter};
use pretty_assertions::assert_eq;
use turbows_core::{
    Application, ClientEndpointConfig, ClientEngine, EngineConfig, UpgradeInfo, WebSocketEngine,
};
use turbows_protocol::headers::{ORIGIN, SEC_WEBSOCKET_ORIGIN, SEC_WEBSOCKET_PROTOCOL};
use turbows_protocol::{HandshakeError, ProtocolVersion, Role, UpgradeResponse};
use turbows_transport_traits::TimeoutHandler;
use url::Url;

fn echo_server() -> WebSocketEngine {
    let engine = WebSocketEngine::default();
    engine
        .register(
            Application::builder("/echo")
                .subprotocols(["chat"])
                .handler(|_| RecordingHandler::new(Behavior::echo()).0)
                .build()
                .unwrap(),
        )
        .unwrap();
    engine
}

fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}

#[test]
fn test_round_trip_through_server_engine() {
    for version in ProtocolVersion::ALL {
        let server = echo_server();
        let (handler, events) = RecordingHandler::new(Behavior::default());
        let client = ClientEngine::new(
            ClientEndpointConfig::new()
                .version(version)
                .subprotocols(["chat", "other"]),
            handler,
            EngineConfig::default(),
        );

        let mut request = client
            .create_upgrade_request(&url("ws://localhost:8080/echo?x=1"), None)
            .unwrap();
        assert_eq!(request.request_uri, "/echo?x=1");
        assert_eq!(request.header("Host"), Some("localhost:8080"));
        assert!(request.header(version.origin_header()).is_some());

        let mut response = UpgradeResponse::new();
        let UpgradeInfo::Success(upgrade) = server.upgrade(&mut request, &mut response) else {
            panic!("server should accept {version}");
        };
        let server_writer = RecordingWriter::new();
        let server_conn =
            upgrade.create_connection(server_writer.clone(), RecordingListener::new());

        let client_writer = RecordingWriter::new();
        let client_conn = client
            .process_response(&response, client_writer.clone(), RecordingListener::new())
            .unwrap();
        assert_eq!(client_conn.session().role(), Role::Client);
        assert_eq!(client_conn.session().version(), version);
        assert_eq!(client_conn.session().subprotocol(), Some("chat"));
        assert_eq!(client_conn.session().request_uri(), "ws://localhost:8080/echo?x=1");

        client_conn.session().send_text("ping me").unwrap();
        server_conn.handle_read(&client_writer.take_bytes()).unwrap();
        client_conn.handle_read(&server_writer.take_bytes()).unwrap();

        assert_eq!(
            events.lock().clone(),
            [Event::Open, Event::Text("ping me".into())]
        );
    }
}

#[test]
fn test_hybi08_uses_its_origin_header() {
    let (handler, _) = RecordingHandler::new(Behavior::default());
    let client = ClientEngine::new(
        ClientEndpointConfig::new()
            .version(ProtocolVersion::Hybi08)
            .origin("http://example.com"),
        handler,
        EngineConfig::default(),
    );
    let request = client
        .create_upgrade_request(&url("ws://example.com/echo"), None)
        .unwrap();
    assert_eq!(request.header(SEC_WEBSOCKET_ORIGIN), Some("http://example.com"));
    assert_eq!(request.header(ORIGIN), None);
    assert_eq!(request.header("Sec-WebSocket-Version"), Some("8"));
}

#[test]
fn test_before_request_hook_edits_headers() {
    let (handler, _) = RecordingHandler::new(Behavior::default());
    let client = ClientEngine::new(
        ClientEndpointConfig::new()
            .before_request(|headers| headers.insert("Authorization", "Bearer token")),
        handler,
        EngineConfig::default(),
    );
    let request = client
        .create_upgrade_request(&url("ws://localhost/echo"), None)
        .unwrap();
    assert_eq!(request.header("authorization"), Some("Bearer token"));
}

#[test]
fn test_after_response_hook_can_reject() {
    let server = echo_server();
    let (handler, _) = RecordingHandler::new(Behavior::default());
    let client = ClientEngine::new(
        ClientEndpointConfig::new().after_response(|response| {
            if response.header(SEC_WEBSOCKET_PROTOCOL).is_none() {
                Err("server picked no sub-protocol".to_string())
            } else {
                Ok(())
            }
        }),
        handler,
        EngineConfig::default(),
    );
    let mut request = client
        .create_upgrade_request(&url("ws://localhost/echo"), None)
        .unwrap();
    let mut response = UpgradeResponse::new();
    server.upgrade(&mut request, &mut response);

    let err = client
        .process_response(&response, RecordingWriter::new(), RecordingListener::new())
        .unwrap_err();
    assert!(matches!(err, HandshakeError::Rejected(ref msg) if msg.contains("sub-protocol")));
}

#[test]
fn test_non_101_response_fails() {
    let (handler, _) = RecordingHandler::new(Behavior::default());
    let client = ClientEngine::new(ClientEndpointConfig::new(), handler, EngineConfig::default());
    client
        .create_upgrade_request(&url("ws://localhost/missing"), None)
        .unwrap();
    let err = client
        .process_response(
            &UpgradeResponse::with_status(404),
            RecordingWriter::new(),
            RecordingListener::new(),
        )
        .unwrap_err();
    assert!(matches!(err, HandshakeError::UnexpectedStatus(404)));
}

#[test]
fn test_accept_mismatch_fails() {
    let server = echo_server();
    let (first, _) = RecordingHandler::new(Behavior::default());
    let (second, _) = RecordingHandler::new(Behavior::default());
    let a = ClientEngine::new(ClientEndpointConfig::new(), first, EngineConfig::default());
    let b = ClientEngine::new(ClientEndpointConfig::new(), second, EngineConfig::default());

    let mut request = a.create_upgrade_request(&url("ws://localhost/echo"), None).unwrap();
    b.create_upgrade_request(&url("ws://localhost/echo"), None).unwrap();
    let mut response = UpgradeResponse::new();
    server.upgrade(&mut request, &mut response);

    // Answer to a's key handed to b.
    let err = b
        .process_response(&response, RecordingWriter::new(), RecordingListener::new())
        .unwrap_err();
    assert!(matches!(err, HandshakeError::AcceptMismatch { .. }));
}

#[test]
fn test_invalid_uri_rejected() {
    let (handler, _) = RecordingHandler::new(Behavior::default());
    let client = ClientEngine::new(ClientEndpointConfig::new(), handler, EngineConfig::default());
    let err = client
        .create_upgrade_request(&url("http://localhost/echo"), None)
        .unwrap_err();
    assert!(matches!(err, HandshakeError::InvalidUri(_)));
}

#[test]
fn test_timeout_handler_kept_until_response() {
    let (handler, _) = RecordingHandler::new(Behavior::default());
    let client = ClientEngine::new(ClientEndpointConfig::new(), handler, EngineConfig::default());
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    client
        .create_upgrade_request(
            &url("ws://localhost/echo"),
            Some(Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        )
        .unwrap();

    let timeout = client.timeout_handler().expect("handler stored");
    timeout.handle_timeout();
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn test_single_connection_per_engine() {
    let server = echo_server();
    let (handler, _) = RecordingHandler::new(Behavior::default());
    let client = ClientEngine::new(ClientEndpointConfig::new(), handler, EngineConfig::default());

    let mut request = client
        .create_upgrade_request(&url("ws://localhost/echo"), None)
        .unwrap();
    let mut response = UpgradeResponse::new();
    server.upgrade(&mut request, &mut response);
    client
        .process_response(&response, RecordingWriter::new(), RecordingListener::new())
        .unwrap();
    assert!(client.timeout_handler().is_none());

    // No pending request.
    let err = client
        .process_response(&response, RecordingWriter::new(), RecordingListener::new())
        .unwrap_err();
    assert!(matches!(err, HandshakeError::Rejected(_)));

    // A new request, but the handler is already bound.
    let mut request = client
        .create_upgrade_request(&url("ws://localhost/echo"), None)
        .unwrap();
    let mut response = UpgradeResponse::new();
    server.upgrade(&mut request, &mut response);
    let err = client
        .process_response(&response, RecordingWriter::new(), RecordingListener::new())
        .unwrap_err();
    assert!(matches!(err, HandshakeError::Rejected(ref msg) if msg.contains("already bound")));
}

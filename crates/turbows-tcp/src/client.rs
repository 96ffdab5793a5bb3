//! TCP client driving a [`ClientEngine`].

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use turbows_core::{ClientEngine, Connection, Session};
use turbows_transport_traits::{
    CloseListener, CloseReason, TimeoutConfig, TimeoutHandler, TransportError, TransportResult,
    Writer,
};
use url::Url;

use crate::http::{encode_request, parse_response};
use crate::io::{READ_CHUNK, read_head, read_loop};
use crate::writer::TcpWriter;

/// Opens client connections over plain TCP.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketClient;

impl WebSocketClient {
    /// Connect to `uri`, perform the opening handshake and start reading.
    ///
    /// The connect and handshake phases are bounded by `timeouts`. When the
    /// handshake deadline passes, the engine's timeout handler closes the
    /// socket before the error is returned.
    ///
    /// # Errors
    ///
    /// - [`TransportError::ConfigurationError`] for `wss` URIs or URIs without a host
    /// - [`TransportError::ConnectionTimeout`] when either phase times out
    /// - [`TransportError::ConnectionFailed`] when the socket cannot be opened
    /// - [`TransportError::HandshakeFailed`] when the server's answer is refused
    pub async fn connect(
        uri: &Url,
        engine: ClientEngine,
        timeouts: TimeoutConfig,
    ) -> TransportResult<ClientConnection> {
        if uri.scheme() == "wss" {
            return Err(TransportError::ConfigurationError(
                "wss requires TLS, which this transport does not provide".into(),
            ));
        }
        let host = uri
            .host_str()
            .ok_or_else(|| TransportError::ConfigurationError(format!("{uri} has no host")))?;
        let port = uri.port_or_known_default().unwrap_or(80);

        info!(%uri, "connecting");
        let stream = tokio::time::timeout(timeouts.connect, TcpStream::connect((host, port)))
            .await
            .map_err(|_| TransportError::ConnectionTimeout {
                operation: "connect".to_string(),
                timeout: timeouts.connect,
            })?
            .map_err(|e| {
                TransportError::ConnectionFailed(format!("Failed to connect to {uri}: {e}"))
            })?;
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        let (mut reader, write_half) = stream.into_split();
        let (writer, writer_task) = TcpWriter::spawn(write_half, peer);

        let on_timeout = writer.clone();
        let timeout_handler: Arc<dyn TimeoutHandler> = Arc::new(move || {
            let _ = on_timeout.close();
        });
        let request = engine
            .create_upgrade_request(uri, Some(timeout_handler))
            .map_err(|e| TransportError::ConfigurationError(e.to_string()))?;
        writer.write(Bytes::from(encode_request(&request)))?;

        let mut buf = BytesMut::with_capacity(READ_CHUNK);
        let head = read_head(&mut reader, &mut buf, parse_response);
        let response = match tokio::time::timeout(timeouts.handshake, head).await {
            Ok(response) => response?,
            Err(_) => {
                warn!(%uri, timeout = ?timeouts.handshake, "handshake timed out");
                if let Some(handler) = engine.timeout_handler() {
                    handler.handle_timeout();
                }
                return Err(TransportError::ConnectionTimeout {
                    operation: "handshake".to_string(),
                    timeout: timeouts.handshake,
                });
            }
        };

        let closed = Arc::new(Notify::new());
        let signal = Arc::clone(&closed);
        let listener: Arc<dyn CloseListener> = Arc::new(move |reason: &CloseReason| {
            debug!(%peer, code = reason.code.as_u16(), "websocket connection closed");
            signal.notify_one();
        });
        let bound = engine.process_response(&response, Arc::new(writer.clone()), listener);
        let connection = match bound {
            Ok(connection) => Arc::new(connection),
            Err(e) => {
                let _ = writer.close();
                return Err(TransportError::HandshakeFailed(e.to_string()));
            }
        };
        info!(%uri, %peer, "websocket connection established");

        if !buf.is_empty()
            && let Err(e) = connection.handle_read(&buf)
        {
            debug!(%peer, error = %e, "connection closed by bytes following the handshake");
        }

        let reading = Arc::clone(&connection);
        let task = tokio::spawn(async move {
            read_loop(&reading, reader, &closed, std::future::pending()).await;
            let _ = writer.close();
            let _ = writer_task.await;
        });

        Ok(ClientConnection {
            connection,
            peer,
            task,
        })
    }
}

/// An established client connection with its read task.
#[derive(Debug)]
pub struct ClientConnection {
    connection: Arc<Connection>,
    peer: SocketAddr,
    task: JoinHandle<()>,
}

impl ClientConnection {
    /// The session, for sending and inspecting negotiated state.
    pub fn session(&self) -> &Session {
        self.connection.session()
    }

    /// The underlying connection.
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Address of the server.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Start the closing handshake.
    pub fn close(&self, reason: CloseReason) {
        self.connection.close(reason);
    }

    /// Wait until the connection is closed and the socket released.
    pub async fn closed(self) {
        if let Err(e) = self.task.await {
            warn!(peer = %self.peer, error = %e, "client read task failed");
        }
    }
}

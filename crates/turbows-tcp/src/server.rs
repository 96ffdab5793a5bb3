//! TCP server hosting a [`WebSocketEngine`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::{Notify, broadcast};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use turbows_core::{UpgradeStatus, WebSocketEngine};
use turbows_protocol::UpgradeResponse;
use turbows_transport_traits::{
    CloseListener, CloseReason, TimeoutConfig, TransportError, TransportResult, Writer,
};

use crate::http::{encode_response, parse_request};
use crate::io::{READ_CHUNK, read_head, read_loop};
use crate::writer::TcpWriter;

/// How long `run` waits for open connections to finish after shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Accepts TCP connections and upgrades them through a [`WebSocketEngine`].
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use turbows_core::WebSocketEngine;
/// use turbows_tcp::WebSocketServer;
/// use turbows_transport_traits::TimeoutConfig;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let engine = Arc::new(WebSocketEngine::default());
/// let server = Arc::new(WebSocketServer::bind("127.0.0.1:9001", engine, TimeoutConfig::default()).await?);
/// let running = Arc::clone(&server);
/// tokio::spawn(async move { running.run().await });
/// // ...
/// server.shutdown();
/// # Ok(())
/// # }
/// ```
pub struct WebSocketServer {
    listener: TcpListener,
    engine: Arc<WebSocketEngine>,
    timeouts: TimeoutConfig,
    shutdown_tx: broadcast::Sender<()>,
}

impl std::fmt::Debug for WebSocketServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketServer")
            .field("local_addr", &self.listener.local_addr().ok())
            .field("engine", &self.engine)
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

impl WebSocketServer {
    /// Bind a listener. Connections are not accepted until [`run`](Self::run).
    ///
    /// # Errors
    ///
    /// [`TransportError::ConnectionFailed`] if the address cannot be bound.
    pub async fn bind(
        addr: impl ToSocketAddrs,
        engine: Arc<WebSocketEngine>,
        timeouts: TimeoutConfig,
    ) -> TransportResult<Self> {
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            TransportError::ConnectionFailed(format!("Failed to bind TCP listener: {e}"))
        })?;
        let (shutdown_tx, _) = broadcast::channel(1);
        Ok(Self {
            listener,
            engine,
            timeouts,
            shutdown_tx,
        })
    }

    /// The bound address, useful after binding port 0.
    ///
    /// # Errors
    ///
    /// Propagates the socket error.
    pub fn local_addr(&self) -> TransportResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// The hosted engine.
    pub fn engine(&self) -> &Arc<WebSocketEngine> {
        &self.engine
    }

    /// Accept connections until [`shutdown`](Self::shutdown).
    ///
    /// On shutdown every open connection is closed with 1001 and given a
    /// grace period to flush before its task is aborted.
    ///
    /// # Errors
    ///
    /// Currently always `Ok`; accept failures are logged and skipped.
    pub async fn run(&self) -> TransportResult<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut connections = JoinSet::new();
        info!(addr = ?self.listener.local_addr().ok(), "WebSocket server listening");

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("WebSocket server received shutdown signal");
                    break;
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        info!(%peer, "accepted TCP connection");
                        let engine = Arc::clone(&self.engine);
                        let timeouts = self.timeouts.clone();
                        let shutdown = self.shutdown_tx.subscribe();
                        connections.spawn(async move {
                            if let Err(e) = serve(stream, peer, engine, timeouts, shutdown).await {
                                warn!(%peer, error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => error!(error = %e, "failed to accept TCP connection"),
                }
            }
        }

        if !connections.is_empty() {
            info!(open = connections.len(), "waiting for connections to close");
            let start = Instant::now();
            loop {
                let remaining = SHUTDOWN_GRACE.saturating_sub(start.elapsed());
                let Ok(Some(result)) =
                    tokio::time::timeout(remaining, connections.join_next()).await
                else {
                    break;
                };
                if let Err(e) = result
                    && e.is_panic()
                {
                    warn!("connection task panicked during shutdown: {:?}", e);
                }
            }
            if !connections.is_empty() {
                warn!(remaining = connections.len(), "aborting connections after grace period");
                connections.shutdown().await;
            }
        }
        info!("WebSocket server stopped");
        Ok(())
    }

    /// Signal [`run`](Self::run) to stop.
    pub fn shutdown(&self) {
        // No receivers simply means `run` is not active.
        let _ = self.shutdown_tx.send(());
    }
}

async fn serve(
    stream: TcpStream,
    peer: SocketAddr,
    engine: Arc<WebSocketEngine>,
    timeouts: TimeoutConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> TransportResult<()> {
    stream.set_nodelay(true)?;
    let (mut reader, write_half) = stream.into_split();
    let mut buf = BytesMut::with_capacity(READ_CHUNK);

    let mut request = tokio::time::timeout(
        timeouts.handshake,
        read_head(&mut reader, &mut buf, parse_request),
    )
    .await
    .map_err(|_| TransportError::ConnectionTimeout {
        operation: "handshake".to_string(),
        timeout: timeouts.handshake,
    })??;

    let mut response = UpgradeResponse::new();
    let info = engine.upgrade(&mut request, &mut response);
    let (writer, writer_task) = TcpWriter::spawn(write_half, peer);

    if info.status() != UpgradeStatus::Success {
        // Only upgrades are served here; a plain request gets a 400.
        if response.status == 200 {
            response.status = 400;
        }
        debug!(%peer, status = response.status, "upgrade not accepted");
        writer.write(Bytes::from(encode_response(&response)))?;
        writer.close()?;
        let _ = writer_task.await;
        return Ok(());
    }

    // The 101 must precede anything on_open sends.
    writer.write(Bytes::from(encode_response(&response)))?;

    let closed = Arc::new(Notify::new());
    let signal = Arc::clone(&closed);
    let listener: Arc<dyn CloseListener> = Arc::new(move |reason: &CloseReason| {
        debug!(%peer, code = reason.code.as_u16(), "websocket connection closed");
        signal.notify_one();
    });
    let Some(connection) = info.create_connection(Arc::new(writer.clone()), listener) else {
        return Ok(());
    };

    if !buf.is_empty()
        && let Err(e) = connection.handle_read(&buf)
    {
        debug!(%peer, error = %e, "connection closed by bytes following the handshake");
    }
    read_loop(&connection, reader, &closed, async move {
        let _ = shutdown.recv().await;
    })
    .await;

    writer.close()?;
    let _ = writer_task.await;
    Ok(())
}

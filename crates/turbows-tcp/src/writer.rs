//! Channel-backed [`Writer`] for a TCP socket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};
use turbows_transport_traits::{TransportError, TransportResult, Writer};

#[derive(Debug)]
enum Command {
    Data(Bytes),
    Close,
}

/// Queues writes for a task that owns the socket's write half.
///
/// Every write goes through one channel, so concurrent callers are
/// serialized in the order they enqueue. `close` lets queued data drain,
/// then shuts the write side down.
#[derive(Debug, Clone)]
pub struct TcpWriter {
    tx: mpsc::UnboundedSender<Command>,
    closed: Arc<AtomicBool>,
    peer: SocketAddr,
}

impl TcpWriter {
    /// Start the writer task for `half`. Must be called inside a tokio runtime.
    pub fn spawn(half: OwnedWriteHalf, peer: SocketAddr) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(write_loop(half, rx, peer));
        let writer = Self {
            tx,
            closed: Arc::new(AtomicBool::new(false)),
            peer,
        };
        (writer, task)
    }

    /// Address of the remote end.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Writer for TcpWriter {
    fn write(&self, data: Bytes) -> TransportResult<()> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.tx
            .send(Command::Data(data))
            .map_err(|_| TransportError::Closed)
    }

    fn close(&self) -> TransportResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        // The task may already be gone after a write failure.
        let _ = self.tx.send(Command::Close);
        Ok(())
    }
}

async fn write_loop(
    mut half: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<Command>,
    peer: SocketAddr,
) {
    while let Some(command) = rx.recv().await {
        match command {
            Command::Data(data) => {
                if let Err(e) = half.write_all(&data).await {
                    error!(%peer, error = %e, "socket write failed");
                    break;
                }
            }
            Command::Close => break,
        }
    }
    if let Err(e) = half.shutdown().await {
        debug!(%peer, error = %e, "socket shutdown failed");
    }
    debug!(%peer, "writer task finished");
}

//! Socket read paths shared by the server and the client.

use std::future::Future;

use bytes::{Buf, BytesMut};
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::Notify;
use tracing::{debug, error};
use turbows_core::Connection;
use turbows_transport_traits::{CloseCode, CloseReason, TransportError, TransportResult};

use crate::http::HttpError;

/// Bytes requested from the socket per read.
pub(crate) const READ_CHUNK: usize = 8 * 1024;

/// Read until `parse` yields a complete head.
///
/// The head is removed from `buf`; whatever arrived after it stays there.
/// The parser bounds the head size.
pub(crate) async fn read_head<T, P>(
    reader: &mut OwnedReadHalf,
    buf: &mut BytesMut,
    parse: P,
) -> TransportResult<T>
where
    P: Fn(&[u8]) -> Result<Option<(T, usize)>, HttpError>,
{
    loop {
        if let Some((head, consumed)) = parse(&buf[..])? {
            buf.advance(consumed);
            return Ok(head);
        }
        buf.reserve(READ_CHUNK);
        if reader.read_buf(buf).await? == 0 {
            return Err(TransportError::ConnectionFailed(
                "peer closed the socket during the handshake".into(),
            ));
        }
    }
}

/// Feed socket reads to `connection` until it closes.
///
/// `closed` is notified by the connection's close listener so a close
/// initiated elsewhere stops the loop. When `shutdown` completes first the
/// connection is closed with 1001.
pub(crate) async fn read_loop<S>(
    connection: &Connection,
    mut reader: OwnedReadHalf,
    closed: &Notify,
    shutdown: S,
) where
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let session = connection.session().id();
    let mut buf = vec![0u8; READ_CHUNK];

    while connection.is_open() {
        tokio::select! {
            () = closed.notified() => break,
            () = &mut shutdown => {
                connection.close(CloseReason::new(CloseCode::GoingAway, "server shutting down"));
                break;
            }
            read = reader.read(&mut buf) => match read {
                Ok(0) => {
                    debug!(session, "peer closed the socket");
                    connection.on_transport_closed();
                    break;
                }
                Ok(n) => {
                    if let Err(e) = connection.handle_read(&buf[..n]) {
                        debug!(session, error = %e, "connection closed while reading");
                        break;
                    }
                }
                Err(e) => {
                    error!(session, error = %e, "socket read failed");
                    connection.on_transport_closed();
                    break;
                }
            }
        }
    }
}

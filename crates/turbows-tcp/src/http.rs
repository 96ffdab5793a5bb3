//! HTTP/1.1 head parsing and encoding for the opening handshake.
//!
//! Only the request or status line and headers are handled. Whatever
//! follows the blank line belongs to the WebSocket connection, so parsers
//! report how many bytes the head consumed.

use thiserror::Error;
use turbows_protocol::headers::HeaderMap;
use turbows_protocol::{UpgradeRequest, UpgradeResponse};
use turbows_transport_traits::TransportError;

/// Maximum number of headers accepted in one head.
pub const MAX_HEADERS: usize = 64;

/// Maximum size of a request or response head.
pub const MAX_HEAD_SIZE: usize = 16 * 1024;

/// Errors raised while reading an HTTP head.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HttpError {
    /// The bytes are not a valid HTTP/1.x head.
    #[error("Malformed HTTP head: {0}")]
    Malformed(String),

    /// The head did not end within [`MAX_HEAD_SIZE`] bytes.
    #[error("HTTP head exceeds {0} bytes")]
    TooLarge(usize),

    /// A header value is not valid UTF-8.
    #[error("Header {0} is not valid UTF-8")]
    InvalidHeaderValue(String),
}

impl From<httparse::Error> for HttpError {
    fn from(err: httparse::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

impl From<HttpError> for TransportError {
    fn from(err: HttpError) -> Self {
        Self::HandshakeFailed(err.to_string())
    }
}

/// Parse a request head from the start of `buf`.
///
/// Returns `None` while the head is incomplete, otherwise the request and
/// the number of bytes it occupied.
///
/// # Errors
///
/// [`HttpError::Malformed`] for invalid syntax, [`HttpError::TooLarge`] once
/// an incomplete head reaches [`MAX_HEAD_SIZE`].
pub fn parse_request(buf: &[u8]) -> Result<Option<(UpgradeRequest, usize)>, HttpError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);
    let consumed = match req.parse(buf)? {
        httparse::Status::Complete(consumed) => consumed,
        httparse::Status::Partial => return incomplete(buf),
    };

    let mut request = UpgradeRequest {
        method: req.method.unwrap_or_default().to_string(),
        request_uri: req.path.unwrap_or_default().to_string(),
        ..UpgradeRequest::default()
    };
    collect_headers(req.headers, &mut request.headers)?;
    Ok(Some((request, consumed)))
}

/// Parse a response head from the start of `buf`.
///
/// # Errors
///
/// Same as [`parse_request`].
pub fn parse_response(buf: &[u8]) -> Result<Option<(UpgradeResponse, usize)>, HttpError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut res = httparse::Response::new(&mut headers);
    let consumed = match res.parse(buf)? {
        httparse::Status::Complete(consumed) => consumed,
        httparse::Status::Partial => return incomplete(buf),
    };

    let mut response = UpgradeResponse::with_status(res.code.unwrap_or_default());
    response.reason = res
        .reason
        .filter(|reason| !reason.is_empty())
        .map(str::to_string);
    collect_headers(res.headers, &mut response.headers)?;
    Ok(Some((response, consumed)))
}

fn incomplete<T>(buf: &[u8]) -> Result<Option<T>, HttpError> {
    if buf.len() >= MAX_HEAD_SIZE {
        return Err(HttpError::TooLarge(MAX_HEAD_SIZE));
    }
    Ok(None)
}

fn collect_headers(
    parsed: &[httparse::Header<'_>],
    headers: &mut HeaderMap,
) -> Result<(), HttpError> {
    for header in parsed {
        let value = std::str::from_utf8(header.value)
            .map_err(|_| HttpError::InvalidHeaderValue(header.name.to_string()))?;
        headers.append(header.name, value.trim());
    }
    Ok(())
}

/// Serialize a request head, including the terminating blank line.
pub fn encode_request(request: &UpgradeRequest) -> Vec<u8> {
    let method = if request.method.is_empty() {
        "GET"
    } else {
        &request.method
    };
    let mut head = format!("{method} {} HTTP/1.1\r\n", request.request_uri);
    push_headers(&mut head, &request.headers);
    head.push_str("\r\n");
    head.into_bytes()
}

/// Serialize a response head, including the terminating blank line.
///
/// Anything but a 101 announces an empty body so the peer does not wait
/// for one.
pub fn encode_response(response: &UpgradeResponse) -> Vec<u8> {
    let mut head = format!(
        "HTTP/1.1 {} {}\r\n",
        response.status,
        response.reason_phrase()
    );
    push_headers(&mut head, &response.headers);
    if response.status != 101 && !response.headers.contains("Content-Length") {
        head.push_str("Content-Length: 0\r\n");
    }
    head.push_str("\r\n");
    head.into_bytes()
}

fn push_headers(head: &mut String, headers: &HeaderMap) {
    for (name, values) in headers.iter() {
        for value in values {
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str("\r\n");
        }
    }
}

//! Upgrade request and response values exchanged during the handshake.

use std::collections::HashMap;

use crate::headers::{HeaderMap, UPGRADE};

/// An HTTP upgrade request, incoming (server) or outgoing (client).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpgradeRequest {
    /// HTTP method. Empty when the hosting server did not supply one.
    pub method: String,
    /// Request target as on the request line: path plus optional query.
    pub request_uri: String,
    /// Request headers.
    pub headers: HeaderMap,
    /// Path variables filled in by the router for the matched application.
    pub path_parameters: HashMap<String, String>,
    /// Arrived over (or will be sent over) TLS.
    pub secure: bool,
}

impl UpgradeRequest {
    /// A `GET` request for `request_uri` with no headers.
    pub fn get(request_uri: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            request_uri: request_uri.into(),
            ..Self::default()
        }
    }

    /// Builder-style header insertion.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    /// First value of a header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.first(name)
    }

    /// The path component of the request target, without the query string.
    ///
    /// An absolute-form target (`ws://host/path`) is reduced to its path.
    pub fn request_path(&self) -> &str {
        let mut target = self.request_uri.as_str();
        if let Some(scheme_end) = target.find("://") {
            let after = &target[scheme_end + 3..];
            target = after.find('/').map_or("/", |i| &after[i..]);
        }
        let end = target.find(['?', '#']).unwrap_or(target.len());
        let path = &target[..end];
        if path.is_empty() { "/" } else { path }
    }

    /// The query string, if any.
    pub fn query(&self) -> Option<&str> {
        let (_, rest) = self.request_uri.split_once('?')?;
        Some(rest.split('#').next().unwrap_or(rest))
    }

    /// The request asks to upgrade to the WebSocket protocol.
    pub fn is_websocket_upgrade(&self) -> bool {
        self.headers.contains_token(UPGRADE, "websocket")
    }

    /// A path parameter extracted by the router.
    pub fn path_parameter(&self, name: &str) -> Option<&str> {
        self.path_parameters.get(name).map(String::as_str)
    }
}

/// An HTTP response to an upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeResponse {
    /// Status code.
    pub status: u16,
    /// Reason phrase; a standard phrase is used when `None`.
    pub reason: Option<String>,
    /// Response headers.
    pub headers: HeaderMap,
}

impl Default for UpgradeResponse {
    fn default() -> Self {
        Self::with_status(200)
    }
}

impl UpgradeResponse {
    /// An empty response with status 200, to be filled by the engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty response with `status`.
    pub fn with_status(status: u16) -> Self {
        Self {
            status,
            reason: None,
            headers: HeaderMap::new(),
        }
    }

    /// First value of a header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.first(name)
    }

    /// The explicit reason phrase, or the standard one for the status.
    pub fn reason_phrase(&self) -> &str {
        if let Some(reason) = &self.reason {
            return reason;
        }
        match self.status {
            101 => "Switching Protocols",
            200 => "OK",
            400 => "Bad Request",
            403 => "Forbidden",
            404 => "Not Found",
            426 => "Upgrade Required",
            500 => "Internal Server Error",
            503 => "Service Unavailable",
            _ => "",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_path_strips_query_and_authority() {
        assert_eq!(UpgradeRequest::get("/chat?x=1").request_path(), "/chat");
        assert_eq!(UpgradeRequest::get("ws://h:80/a/b?q").request_path(), "/a/b");
        assert_eq!(UpgradeRequest::get("ws://h").request_path(), "/");
        assert_eq!(UpgradeRequest::get("").request_path(), "/");
        assert_eq!(UpgradeRequest::get("/chat?x=1#f").query(), Some("x=1"));
        assert_eq!(UpgradeRequest::get("/chat").query(), None);
    }

    #[test]
    fn test_is_websocket_upgrade() {
        let request = UpgradeRequest::get("/").with_header("upgrade", "WebSocket");
        assert!(request.is_websocket_upgrade());
        assert!(!UpgradeRequest::get("/").is_websocket_upgrade());
    }

    #[test]
    fn test_reason_phrase() {
        assert_eq!(UpgradeResponse::with_status(426).reason_phrase(), "Upgrade Required");
        let mut response = UpgradeResponse::with_status(101);
        response.reason = Some("Web Socket Protocol Handshake".into());
        assert_eq!(response.reason_phrase(), "Web Socket Protocol Handshake");
    }
}

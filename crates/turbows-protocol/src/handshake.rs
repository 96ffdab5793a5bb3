//! Opening handshake (RFC 6455 Section 4).
//!
//! The client side is a small state holder, [`ClientHandshake`], that remembers
//! the key and offers it sent so it can check the server's answer. The server
//! side is a set of free functions the engine calls in order:
//! [`negotiate_version`], [`validate_request`], [`build_response`].

use base64::Engine;
use sha1::{Digest, Sha1};
use tracing::debug;
use url::Url;

use crate::error::{HandshakeError, HandshakeResult};
use crate::extension::{Extension, parse_extensions, serialize_extensions};
use crate::headers::{
    CONNECTION, HOST, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_EXTENSIONS, SEC_WEBSOCKET_KEY,
    SEC_WEBSOCKET_PROTOCOL, SEC_WEBSOCKET_VERSION, UPGRADE,
};
use crate::request::{UpgradeRequest, UpgradeResponse};
use crate::version::ProtocolVersion;

/// GUID appended to the client key before hashing.
pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// `base64(SHA-1(key + GUID))`, the value of `Sec-WebSocket-Accept`.
pub fn compute_accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

/// A fresh random `Sec-WebSocket-Key`: 16 bytes, base64 encoded.
pub fn generate_key() -> String {
    let mut nonce = [0u8; 16];
    fastrand::fill(&mut nonce);
    base64::engine::general_purpose::STANDARD.encode(nonce)
}

/// What both sides agreed on.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Negotiated {
    /// Protocol version.
    pub version: ProtocolVersion,
    /// Selected sub-protocol, if any.
    pub subprotocol: Option<String>,
    /// Extensions in effect, in negotiation order.
    pub extensions: Vec<Extension>,
}

impl Negotiated {
    /// Reserved frame bits are meaningful on this connection.
    pub fn extensions_active(&self) -> bool {
        !self.extensions.is_empty()
    }
}

/// Client half of the handshake for one connection attempt.
#[derive(Debug, Clone)]
pub struct ClientHandshake {
    version: ProtocolVersion,
    uri: Url,
    key: String,
    origin: Option<String>,
    subprotocols: Vec<String>,
    extensions: Vec<Extension>,
}

impl ClientHandshake {
    /// Start a handshake toward `uri` with a freshly generated key.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError::InvalidUri`] unless the scheme is `ws` or
    /// `wss` and the URI has a host.
    pub fn new(version: ProtocolVersion, uri: &Url) -> HandshakeResult<Self> {
        if !matches!(uri.scheme(), "ws" | "wss") {
            return Err(HandshakeError::InvalidUri(format!(
                "unsupported scheme {:?} in {uri}",
                uri.scheme()
            )));
        }
        if uri.host_str().is_none() {
            return Err(HandshakeError::InvalidUri(format!("missing host in {uri}")));
        }
        Ok(Self {
            version,
            uri: uri.clone(),
            key: generate_key(),
            origin: None,
            subprotocols: Vec::new(),
            extensions: Vec::new(),
        })
    }

    /// Offer sub-protocols, most preferred first.
    #[must_use]
    pub fn with_subprotocols(mut self, subprotocols: Vec<String>) -> Self {
        self.subprotocols = subprotocols;
        self
    }

    /// Offer extensions.
    #[must_use]
    pub fn with_extensions(mut self, extensions: Vec<Extension>) -> Self {
        self.extensions = extensions;
        self
    }

    /// Override the origin sent in the version's origin header.
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// The key this handshake sent.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The target URI.
    pub fn uri(&self) -> &Url {
        &self.uri
    }

    /// The protocol version being requested.
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    fn host_header(&self) -> String {
        let host = self.uri.host_str().unwrap_or_default();
        match self.uri.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }

    fn default_origin(&self) -> String {
        let scheme = if self.uri.scheme() == "wss" { "https" } else { "http" };
        format!("{scheme}://{}", self.host_header())
    }

    /// Build the upgrade request to send.
    pub fn prepare_request(&self) -> UpgradeRequest {
        let mut request_uri = self.uri.path().to_string();
        if let Some(query) = self.uri.query() {
            request_uri.push('?');
            request_uri.push_str(query);
        }

        let mut request = UpgradeRequest::get(request_uri);
        request.secure = self.uri.scheme() == "wss";
        let headers = &mut request.headers;
        headers.insert(HOST, self.host_header());
        headers.insert(UPGRADE, "websocket");
        headers.insert(CONNECTION, "Upgrade");
        headers.insert(SEC_WEBSOCKET_KEY, self.key.clone());
        headers.insert(SEC_WEBSOCKET_VERSION, self.version.wire_version());
        headers.insert(
            self.version.origin_header(),
            self.origin.clone().unwrap_or_else(|| self.default_origin()),
        );
        if !self.subprotocols.is_empty() {
            headers.insert(SEC_WEBSOCKET_PROTOCOL, self.subprotocols.join(", "));
        }
        if !self.extensions.is_empty() {
            headers.insert(SEC_WEBSOCKET_EXTENSIONS, serialize_extensions(&self.extensions));
        }
        request
    }

    /// Check the server's answer to [`prepare_request`](Self::prepare_request).
    ///
    /// # Errors
    ///
    /// Fails on a status other than 101, missing upgrade headers, an accept
    /// value that does not match our key, or a sub-protocol or extension that
    /// was never offered.
    pub fn validate_response(&self, response: &UpgradeResponse) -> HandshakeResult<Negotiated> {
        if response.status != 101 {
            return Err(HandshakeError::UnexpectedStatus(response.status));
        }
        require_upgrade_headers(&response.headers)?;

        let expected = compute_accept_key(&self.key);
        let actual = response
            .header(SEC_WEBSOCKET_ACCEPT)
            .ok_or(HandshakeError::MissingHeader(SEC_WEBSOCKET_ACCEPT))?
            .trim();
        if actual != expected {
            return Err(HandshakeError::AcceptMismatch {
                expected,
                actual: actual.to_string(),
            });
        }

        let subprotocol = match response.headers.list(SEC_WEBSOCKET_PROTOCOL).as_slice() {
            [] => None,
            [selected] if self.subprotocols.iter().any(|p| p == selected) => {
                Some((*selected).to_string())
            }
            selected => {
                return Err(HandshakeError::UnrequestedSubprotocol(selected.join(", ")));
            }
        };

        let extensions = parse_extensions(
            response
                .headers
                .get(SEC_WEBSOCKET_EXTENSIONS)
                .into_iter()
                .flatten()
                .map(String::as_str),
        )?;
        if let Some(unrequested) = extensions.iter().find(|accepted| {
            !self
                .extensions
                .iter()
                .any(|offered| offered.name.eq_ignore_ascii_case(&accepted.name))
        }) {
            return Err(HandshakeError::UnrequestedExtension(unrequested.name.clone()));
        }

        debug!(
            version = %self.version,
            subprotocol = subprotocol.as_deref().unwrap_or(""),
            extensions = extensions.len(),
            "client handshake accepted"
        );
        Ok(Negotiated {
            version: self.version,
            subprotocol,
            extensions,
        })
    }
}

fn require_upgrade_headers(headers: &crate::headers::HeaderMap) -> HandshakeResult<()> {
    match headers.first(UPGRADE) {
        None => return Err(HandshakeError::MissingHeader(UPGRADE)),
        Some(_) if !headers.contains_token(UPGRADE, "websocket") => {
            return Err(HandshakeError::InvalidHeader {
                name: UPGRADE,
                value: headers.get(UPGRADE).unwrap_or_default().join(", "),
            });
        }
        Some(_) => {}
    }
    match headers.first(CONNECTION) {
        None => Err(HandshakeError::MissingHeader(CONNECTION)),
        Some(_) if !headers.contains_token(CONNECTION, "upgrade") => {
            Err(HandshakeError::InvalidHeader {
                name: CONNECTION,
                value: headers.get(CONNECTION).unwrap_or_default().join(", "),
            })
        }
        Some(_) => Ok(()),
    }
}

/// Pick the first supported version, in priority order, that accepts `request`.
///
/// # Errors
///
/// Returns [`HandshakeError::UnsupportedVersion`] when none does.
pub fn negotiate_version(request: &UpgradeRequest) -> HandshakeResult<ProtocolVersion> {
    ProtocolVersion::ALL
        .into_iter()
        .find(|version| version.validate(request))
        .ok_or_else(|| HandshakeError::UnsupportedVersion {
            requested: request.header(SEC_WEBSOCKET_VERSION).map(str::to_string),
            supported: ProtocolVersion::supported_wire_versions(),
        })
}

/// Turn `response` into a 426 listing every supported version.
pub fn reject_unsupported_version(response: &mut UpgradeResponse) {
    response.status = 426;
    response.reason = None;
    response.headers.insert(
        SEC_WEBSOCKET_VERSION,
        ProtocolVersion::supported_wire_versions().join(", "),
    );
}

/// Check the headers a server requires on an upgrade request.
///
/// # Errors
///
/// Fails when the method is present and not GET, the upgrade headers are
/// missing, or `Sec-WebSocket-Key` is not a base64 encoded 16-byte nonce.
pub fn validate_request(request: &UpgradeRequest) -> HandshakeResult<()> {
    if !request.method.is_empty() && !request.method.eq_ignore_ascii_case("GET") {
        return Err(HandshakeError::InvalidMethod(request.method.clone()));
    }
    require_upgrade_headers(&request.headers)?;

    let key = request
        .header(SEC_WEBSOCKET_KEY)
        .ok_or(HandshakeError::MissingHeader(SEC_WEBSOCKET_KEY))?
        .trim();
    match base64::engine::general_purpose::STANDARD.decode(key) {
        Ok(nonce) if nonce.len() == 16 => Ok(()),
        _ => Err(HandshakeError::InvalidKey(key.to_string())),
    }
}

/// Fill in a 101 response for a validated request.
///
/// Selects the first requested sub-protocol found in `subprotocols` and
/// keeps the requested extensions whose names appear in `extensions`, in
/// request order, one offer per name.
///
/// # Errors
///
/// Fails if the key is missing or the extension header is malformed.
pub fn build_response(
    version: ProtocolVersion,
    request: &UpgradeRequest,
    subprotocols: &[String],
    extensions: &[String],
    response: &mut UpgradeResponse,
) -> HandshakeResult<Negotiated> {
    let key = request
        .header(SEC_WEBSOCKET_KEY)
        .ok_or(HandshakeError::MissingHeader(SEC_WEBSOCKET_KEY))?
        .trim();

    let subprotocol = request
        .headers
        .list(SEC_WEBSOCKET_PROTOCOL)
        .into_iter()
        .find(|requested| subprotocols.iter().any(|s| s == requested))
        .map(str::to_string);

    let offered = parse_extensions(
        request
            .headers
            .get(SEC_WEBSOCKET_EXTENSIONS)
            .into_iter()
            .flatten()
            .map(String::as_str),
    )?;
    let mut accepted: Vec<Extension> = Vec::new();
    for offer in offered {
        let supported = extensions
            .iter()
            .any(|name| name.eq_ignore_ascii_case(&offer.name));
        let duplicate = accepted
            .iter()
            .any(|a| a.name.eq_ignore_ascii_case(&offer.name));
        if supported && !duplicate {
            accepted.push(offer);
        }
    }

    response.status = 101;
    response.reason = None;
    response.headers.insert(UPGRADE, "websocket");
    response.headers.insert(CONNECTION, "Upgrade");
    response
        .headers
        .insert(SEC_WEBSOCKET_ACCEPT, compute_accept_key(key));
    if let Some(selected) = &subprotocol {
        response.headers.insert(SEC_WEBSOCKET_PROTOCOL, selected.clone());
    }
    if !accepted.is_empty() {
        response
            .headers
            .insert(SEC_WEBSOCKET_EXTENSIONS, serialize_extensions(&accepted));
    }

    Ok(Negotiated {
        version,
        subprotocol,
        extensions: accepted,
    })
}

//! Client-side upgrade orchestration.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};
use turbows_protocol::{
    ClientHandshake, HandshakeError, HandshakeResult, IncomingBuffer, Role, UpgradeRequest,
    UpgradeResponse,
};
use turbows_transport_traits::{CloseListener, TimeoutHandler, Writer};
use url::Url;

use crate::application::EndpointHandler;
use crate::config::{ClientEndpointConfig, EngineConfig};
use crate::connection::Connection;
use crate::session::Session;

/// Drives one outgoing connection attempt.
///
/// Usage is strictly sequential: [`create_upgrade_request`], send it, then
/// [`process_response`] with the server's answer. The handler given at
/// construction is bound to the resulting connection, so an engine produces
/// at most one connection.
///
/// [`create_upgrade_request`]: Self::create_upgrade_request
/// [`process_response`]: Self::process_response
pub struct ClientEngine {
    endpoint: ClientEndpointConfig,
    config: EngineConfig,
    handler: Mutex<Option<Box<dyn EndpointHandler>>>,
    handshake: Mutex<Option<ClientHandshake>>,
    timeout_handler: Mutex<Option<Arc<dyn TimeoutHandler>>>,
}

impl ClientEngine {
    /// Create an engine for one connection handled by `handler`.
    pub fn new(
        endpoint: ClientEndpointConfig,
        handler: Box<dyn EndpointHandler>,
        config: EngineConfig,
    ) -> Self {
        Self {
            endpoint,
            config,
            handler: Mutex::new(Some(handler)),
            handshake: Mutex::new(None),
            timeout_handler: Mutex::new(None),
        }
    }

    /// The endpoint configuration.
    pub fn endpoint_config(&self) -> &ClientEndpointConfig {
        &self.endpoint
    }

    /// Build the upgrade request for `uri`.
    ///
    /// `timeout_handler` is kept for the transport to fetch through
    /// [`timeout_handler`](Self::timeout_handler) and invoke if the handshake
    /// does not complete in time.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError::InvalidUri`] unless `uri` is a `ws` or `wss`
    /// URI with a host.
    pub fn create_upgrade_request(
        &self,
        uri: &Url,
        timeout_handler: Option<Arc<dyn TimeoutHandler>>,
    ) -> HandshakeResult<UpgradeRequest> {
        let mut handshake = ClientHandshake::new(self.endpoint.version, uri)?
            .with_subprotocols(self.endpoint.subprotocols.clone())
            .with_extensions(self.endpoint.extensions.clone());
        if let Some(origin) = &self.endpoint.origin {
            handshake = handshake.with_origin(origin.clone());
        }

        let mut request = handshake.prepare_request();
        if let Some(hook) = &self.endpoint.before_request {
            hook(&mut request.headers);
        }

        debug!(uri = %uri, version = %self.endpoint.version, "prepared upgrade request");
        *self.handshake.lock() = Some(handshake);
        *self.timeout_handler.lock() = timeout_handler;
        Ok(request)
    }

    /// The timeout handler registered with the last request, if any.
    pub fn timeout_handler(&self) -> Option<Arc<dyn TimeoutHandler>> {
        self.timeout_handler.lock().clone()
    }

    /// Validate the server's response and create the connection.
    ///
    /// # Errors
    ///
    /// Any [`HandshakeError`] from validation, [`HandshakeError::Rejected`]
    /// when the `after_response` hook refuses the response, or when no
    /// request is pending or the handler was already bound.
    pub fn process_response(
        &self,
        response: &UpgradeResponse,
        writer: Arc<dyn Writer>,
        listener: Arc<dyn CloseListener>,
    ) -> HandshakeResult<Connection> {
        let handshake = self
            .handshake
            .lock()
            .take()
            .ok_or_else(|| HandshakeError::Rejected("no upgrade request is pending".into()))?;

        if let Some(hook) = &self.endpoint.after_response {
            hook(response).map_err(HandshakeError::Rejected)?;
        }

        let negotiated = handshake.validate_response(response).inspect_err(|err| {
            warn!(uri = %handshake.uri(), error = %err, "server rejected handshake");
        })?;

        let handler = self
            .handler
            .lock()
            .take()
            .ok_or_else(|| HandshakeError::Rejected("handler is already bound".into()))?;
        *self.timeout_handler.lock() = None;

        let codec = negotiated
            .version
            .create_codec(Role::Client, negotiated.extensions_active());
        let buffer = IncomingBuffer::new(
            self.config.incoming_buffer_size,
            self.config.buffer_step_size,
        );
        let session = Session::new(
            Role::Client,
            negotiated,
            handshake.uri().to_string(),
            Default::default(),
            writer,
            listener,
            handler,
        );
        Ok(Connection::open(session, codec, buffer, self.config.max_message_size))
    }
}

impl fmt::Debug for ClientEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientEngine")
            .field("endpoint", &self.endpoint)
            .field("config", &self.config)
            .field("pending", &self.handshake.lock().is_some())
            .finish_non_exhaustive()
    }
}

//! Server-side upgrade orchestration.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};
use turbows_protocol::{
    HandshakeError, IncomingBuffer, Negotiated, Role, UpgradeRequest, UpgradeResponse,
    build_response, negotiate_version, reject_unsupported_version, validate_request,
};
use turbows_transport_traits::{CloseListener, Writer};

use crate::application::Application;
use crate::config::EngineConfig;
use crate::connection::Connection;
use crate::error::DeploymentError;
use crate::router::ApplicationRouter;
use crate::session::Session;

/// Outcome category of an upgrade attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpgradeStatus {
    /// Not a WebSocket request, or no application matched.
    NotApplicable,
    /// An application matched but the handshake was refused.
    HandshakeFailed,
    /// The response is a 101 and a connection can be created.
    Success,
}

/// Result of [`WebSocketEngine::upgrade`].
#[derive(Debug)]
pub enum UpgradeInfo {
    /// Not a WebSocket request, or no application matched.
    NotApplicable,
    /// The handshake was refused; the response carries the HTTP status.
    HandshakeFailed(HandshakeError),
    /// Everything needed to create the connection once a transport exists.
    Success(SuccessfulUpgrade),
}

impl UpgradeInfo {
    /// The outcome category.
    pub fn status(&self) -> UpgradeStatus {
        match self {
            Self::NotApplicable => UpgradeStatus::NotApplicable,
            Self::HandshakeFailed(_) => UpgradeStatus::HandshakeFailed,
            Self::Success(_) => UpgradeStatus::Success,
        }
    }

    /// Create the connection for a successful upgrade; `None` otherwise.
    pub fn create_connection(
        self,
        writer: Arc<dyn Writer>,
        listener: Arc<dyn CloseListener>,
    ) -> Option<Connection> {
        match self {
            Self::Success(upgrade) => Some(upgrade.create_connection(writer, listener)),
            Self::NotApplicable | Self::HandshakeFailed(_) => None,
        }
    }
}

/// A completed server handshake waiting for its transport.
pub struct SuccessfulUpgrade {
    application: Arc<Application>,
    negotiated: Negotiated,
    request: UpgradeRequest,
    config: EngineConfig,
}

impl SuccessfulUpgrade {
    /// The application the request was bound to.
    pub fn application(&self) -> &Arc<Application> {
        &self.application
    }

    /// Negotiated version, sub-protocol and extensions.
    pub fn negotiated(&self) -> &Negotiated {
        &self.negotiated
    }

    /// The upgrade request, with path parameters filled in.
    pub fn request(&self) -> &UpgradeRequest {
        &self.request
    }

    /// Bind the upgrade to a transport. The handler's `on_open` runs before
    /// this returns.
    pub fn create_connection(
        self,
        writer: Arc<dyn Writer>,
        listener: Arc<dyn CloseListener>,
    ) -> Connection {
        let handler = self.application.create_handler(&self.request);
        let codec = self
            .negotiated
            .version
            .create_codec(Role::Server, self.negotiated.extensions_active());
        let buffer = IncomingBuffer::new(
            self.config.incoming_buffer_size,
            self.config.buffer_step_size,
        );
        let session = Session::new(
            Role::Server,
            self.negotiated,
            self.request.request_uri,
            self.request.path_parameters,
            writer,
            listener,
            handler,
        );
        Connection::open(session, codec, buffer, self.config.max_message_size)
    }
}

impl fmt::Debug for SuccessfulUpgrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuccessfulUpgrade")
            .field("application", &self.application.path())
            .field("negotiated", &self.negotiated)
            .field("request_uri", &self.request.request_uri)
            .finish_non_exhaustive()
    }
}

/// The server engine: an application registry plus the upgrade entry point.
///
/// Performs no I/O. A hosting server calls [`upgrade`](Self::upgrade) for
/// each incoming HTTP request and, on success, hands the resulting
/// [`Connection`] every chunk it reads from the socket.
#[derive(Debug, Default)]
pub struct WebSocketEngine {
    config: EngineConfig,
    router: ApplicationRouter,
}

impl WebSocketEngine {
    /// Create an engine with the given connection limits.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            router: ApplicationRouter::new(),
        }
    }

    /// Connection limits.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Register an application.
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentError::EquivalentPath`] when an already
    /// registered application serves exactly the same paths.
    pub fn register(&self, application: Application) -> Result<Arc<Application>, DeploymentError> {
        self.router.register(application)
    }

    /// Unregister an application. Existing connections are unaffected.
    pub fn unregister(&self, application: &Arc<Application>) -> bool {
        self.router.unregister(application)
    }

    /// Snapshot of the registered applications.
    pub fn applications(&self) -> Vec<Arc<Application>> {
        self.router.applications().as_ref().clone()
    }

    /// Unregister everything.
    pub fn shutdown(&self) {
        self.router.clear();
        info!("engine shut down, all applications unregistered");
    }

    /// Handle one HTTP request that may be a WebSocket upgrade.
    ///
    /// Fills in `response` and reports the outcome:
    ///
    /// - no `Upgrade: websocket` header: `NotApplicable`, response untouched
    /// - no application accepts the path: `NotApplicable`, status 500
    /// - unsupported version: `HandshakeFailed`, status 426 with the supported list
    /// - any other handshake violation: `HandshakeFailed` with its status
    /// - otherwise: `Success`, status 101
    pub fn upgrade(
        &self,
        request: &mut UpgradeRequest,
        response: &mut UpgradeResponse,
    ) -> UpgradeInfo {
        if !request.is_websocket_upgrade() {
            debug!(uri = %request.request_uri, "not a websocket upgrade request");
            return UpgradeInfo::NotApplicable;
        }

        let Some(application) = self.router.route(request) else {
            debug!(uri = %request.request_uri, "no application for path");
            response.status = 500;
            return UpgradeInfo::NotApplicable;
        };

        let version = match negotiate_version(request) {
            Ok(version) => version,
            Err(err) => {
                warn!(uri = %request.request_uri, error = %err, "handshake failed");
                reject_unsupported_version(response);
                return UpgradeInfo::HandshakeFailed(err);
            }
        };

        let negotiated = validate_request(request).and_then(|()| {
            build_response(
                version,
                request,
                application.subprotocols(),
                application.extensions(),
                response,
            )
        });
        match negotiated {
            Ok(negotiated) => {
                debug!(
                    uri = %request.request_uri,
                    version = %negotiated.version,
                    application = application.path(),
                    "upgrade accepted"
                );
                UpgradeInfo::Success(SuccessfulUpgrade {
                    application,
                    negotiated,
                    request: request.clone(),
                    config: self.config.clone(),
                })
            }
            Err(err) => {
                warn!(uri = %request.request_uri, error = %err, "handshake failed");
                response.status = err.status_code();
                UpgradeInfo::HandshakeFailed(err)
            }
        }
    }
}

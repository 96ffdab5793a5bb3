//! Registered applications and the per-connection handler they create.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use turbows_protocol::UpgradeRequest;
use turbows_transport_traits::CloseReason;

use crate::error::{BoxError, DeploymentError, HandlerResult};
use crate::path::{PathMatch, PathTemplate};
use crate::session::Session;

/// Application callbacks for one connection.
///
/// Every method has a default so a handler only implements what it needs.
/// Callbacks for one connection never run concurrently. A callback may call
/// [`Session::close`]; `on_close` is then delivered once the callback returns.
pub trait EndpointHandler: Send {
    /// The connection is established.
    fn on_open(&mut self, session: &Session) -> HandlerResult {
        let _ = session;
        Ok(())
    }

    /// A complete text message arrived.
    fn on_text(&mut self, session: &Session, text: String) -> HandlerResult {
        let _ = (session, text);
        Ok(())
    }

    /// A complete binary message arrived.
    fn on_binary(&mut self, session: &Session, data: Bytes) -> HandlerResult {
        let _ = (session, data);
        Ok(())
    }

    /// A ping arrived. The pong has already been sent.
    fn on_ping(&mut self, session: &Session, data: Bytes) -> HandlerResult {
        let _ = (session, data);
        Ok(())
    }

    /// A pong arrived.
    fn on_pong(&mut self, session: &Session, data: Bytes) -> HandlerResult {
        let _ = (session, data);
        Ok(())
    }

    /// The connection closed. Called exactly once, before the transport's
    /// close listener. A `close` issued from inside another callback is
    /// delivered here after that callback returns.
    fn on_close(&mut self, session: &Session, reason: &CloseReason) {
        let _ = (session, reason);
    }

    /// Another callback returned an error.
    ///
    /// Return `true` to close the connection with 1011, `false` to keep it open.
    fn on_error(&mut self, session: &Session, error: &BoxError) -> bool {
        let _ = (session, error);
        true
    }
}

/// Creates the handler for each accepted connection.
pub type HandlerFactory = Arc<dyn Fn(&UpgradeRequest) -> Box<dyn EndpointHandler> + Send + Sync>;

/// Decides whether a request may bind to an application.
pub type Gate = Arc<dyn Fn(&UpgradeRequest) -> bool + Send + Sync>;

/// A path-addressable WebSocket application.
///
/// Immutable once built; shared by the registry and every connection bound
/// to it.
pub struct Application {
    template: PathTemplate,
    subprotocols: Vec<String>,
    extensions: Vec<String>,
    gate: Option<Gate>,
    factory: HandlerFactory,
}

impl Application {
    /// Start building an application served at `path`.
    pub fn builder(path: impl Into<String>) -> ApplicationBuilder {
        ApplicationBuilder {
            path: path.into(),
            subprotocols: Vec::new(),
            extensions: Vec::new(),
            gate: None,
            factory: None,
        }
    }

    /// The path template.
    pub fn template(&self) -> &PathTemplate {
        &self.template
    }

    /// The path template as written.
    pub fn path(&self) -> &str {
        self.template.as_str()
    }

    /// Supported sub-protocols.
    pub fn subprotocols(&self) -> &[String] {
        &self.subprotocols
    }

    /// Supported extension names.
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Match `path` against this application's template.
    pub fn matches(&self, path: &str) -> Option<PathMatch> {
        self.template.matches(path)
    }

    /// The gate accepts `request`. Applications without a gate accept everything.
    pub fn accepts(&self, request: &UpgradeRequest) -> bool {
        self.gate.as_ref().is_none_or(|gate| gate(request))
    }

    /// A fresh handler for a connection upgraded from `request`.
    pub fn create_handler(&self, request: &UpgradeRequest) -> Box<dyn EndpointHandler> {
        (self.factory)(request)
    }
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("path", &self.template.as_str())
            .field("subprotocols", &self.subprotocols)
            .field("extensions", &self.extensions)
            .field("gated", &self.gate.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Application`].
pub struct ApplicationBuilder {
    path: String,
    subprotocols: Vec<String>,
    extensions: Vec<String>,
    gate: Option<Gate>,
    factory: Option<HandlerFactory>,
}

impl ApplicationBuilder {
    /// Sub-protocols this application speaks. The first one the client
    /// requests is selected.
    #[must_use]
    pub fn subprotocols<I, S>(mut self, subprotocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subprotocols = subprotocols.into_iter().map(Into::into).collect();
        self
    }

    /// Extension names this application accepts.
    #[must_use]
    pub fn extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Only bind requests for which `gate` returns `true`. Path parameters
    /// are already populated when it runs.
    #[must_use]
    pub fn gate<F>(mut self, gate: F) -> Self
    where
        F: Fn(&UpgradeRequest) -> bool + Send + Sync + 'static,
    {
        self.gate = Some(Arc::new(gate));
        self
    }

    /// Handler factory, called once per accepted connection.
    #[must_use]
    pub fn handler<F>(mut self, factory: F) -> Self
    where
        F: Fn(&UpgradeRequest) -> Box<dyn EndpointHandler> + Send + Sync + 'static,
    {
        self.factory = Some(Arc::new(factory));
        self
    }

    /// Validate and build.
    ///
    /// # Errors
    ///
    /// Fails if the path template is invalid or no handler factory was set.
    pub fn build(self) -> Result<Application, DeploymentError> {
        let template = PathTemplate::parse(&self.path)?;
        let factory = self.factory.ok_or_else(|| {
            DeploymentError::InvalidConfig(format!("application {} has no handler", self.path))
        })?;
        Ok(Application {
            template,
            subprotocols: self.subprotocols,
            extensions: self.extensions,
            gate: self.gate,
            factory,
        })
    }
}

impl fmt::Debug for ApplicationBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationBuilder")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

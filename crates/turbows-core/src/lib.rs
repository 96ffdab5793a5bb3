//! # TurboWS Core
//!
//! The WebSocket engine: application registry and routing, the server
//! upgrade entry point, the client handshake driver, and the connection that
//! turns transport reads into application callbacks.
//!
//! The engine is synchronous and transport-agnostic. A transport supplies a
//! [`Writer`](turbows_transport_traits::Writer) and a
//! [`CloseListener`](turbows_transport_traits::CloseListener) and feeds
//! every chunk it reads to [`Connection::handle_read`].
//!
//! ## Server
//!
//! ```rust
//! use turbows_core::{Application, EndpointHandler, EngineConfig, HandlerResult, Session, UpgradeStatus, WebSocketEngine};
//! use turbows_protocol::{UpgradeRequest, UpgradeResponse};
//!
//! struct Echo;
//!
//! impl EndpointHandler for Echo {
//!     fn on_text(&mut self, session: &Session, text: String) -> HandlerResult {
//!         session.send_text(text)?;
//!         Ok(())
//!     }
//! }
//!
//! let engine = WebSocketEngine::new(EngineConfig::default());
//! engine
//!     .register(Application::builder("/echo").handler(|_| Box::new(Echo)).build()?)?;
//!
//! let mut request = UpgradeRequest::get("/echo")
//!     .with_header("Upgrade", "websocket")
//!     .with_header("Connection", "Upgrade")
//!     .with_header("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ==")
//!     .with_header("Sec-WebSocket-Version", "13");
//! let mut response = UpgradeResponse::new();
//! let info = engine.upgrade(&mut request, &mut response);
//! assert_eq!(info.status(), UpgradeStatus::Success);
//! assert_eq!(response.status, 101);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod application;
mod client;
mod config;
mod connection;
mod engine;
mod error;
mod path;
mod router;
mod session;

pub use crate::application::{
    Application, ApplicationBuilder, EndpointHandler, Gate, HandlerFactory,
};
pub use crate::client::ClientEngine;
pub use crate::config::{
    AfterResponse, BeforeRequest, ClientEndpointConfig, ConfigError, EngineConfig,
    EngineConfigBuilder,
};
pub use crate::connection::Connection;
pub use crate::engine::{SuccessfulUpgrade, UpgradeInfo, UpgradeStatus, WebSocketEngine};
pub use crate::error::{BoxError, ConnectionError, ConnectionResult, DeploymentError, HandlerResult};
pub use crate::path::{PathMatch, PathTemplate};
pub use crate::router::ApplicationRouter;
pub use crate::session::Session;

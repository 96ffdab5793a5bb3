//! # TurboWS TCP Transport
//!
//! A tokio transport for the TurboWS engine. It owns the sockets, parses the
//! HTTP upgrade head, and feeds every read to a
//! [`Connection`](turbows_core::Connection).
//!
//! ## Features
//!
//! - **Server**: accept loop with graceful shutdown, one task per connection
//! - **Client**: connect and handshake timeouts, timeout handler support
//! - **Writer**: channel-backed, serializes writes from any thread
//!
//! TLS is not provided; `wss` URIs are rejected.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use turbows_core::{Application, ClientEndpointConfig, ClientEngine, EndpointHandler, EngineConfig, HandlerResult, Session, WebSocketEngine};
//! use turbows_tcp::{WebSocketClient, WebSocketServer};
//! use turbows_transport_traits::TimeoutConfig;
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
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Arc::new(WebSocketEngine::default());
//!     engine.register(Application::builder("/echo").handler(|_| Box::new(Echo)).build()?)?;
//!
//!     let server = Arc::new(WebSocketServer::bind("127.0.0.1:0", engine, TimeoutConfig::default()).await?);
//!     let url = format!("ws://{}/echo", server.local_addr()?).parse()?;
//!     let running = Arc::clone(&server);
//!     tokio::spawn(async move { running.run().await });
//!
//!     let client = ClientEngine::new(ClientEndpointConfig::new(), Box::new(Echo), EngineConfig::default());
//!     let connection = WebSocketClient::connect(&url, client, TimeoutConfig::fast()).await?;
//!     connection.session().send_text("hello")?;
//!     Ok(())
//! }
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
#![allow(clippy::module_name_repetitions, clippy::must_use_candidate)]

mod client;
pub mod http;
mod io;
mod server;
mod writer;

pub use client::{ClientConnection, WebSocketClient};
pub use http::HttpError;
pub use server::WebSocketServer;
pub use writer::TcpWriter;

// Re-export transport traits for convenience
pub use turbows_transport_traits::{TimeoutConfig, TransportError, TransportResult};

//! # TurboWS Transport Traits
//!
//! The boundary between the TurboWS protocol engine and whatever moves bytes
//! for it. The engine never opens sockets, spawns threads or blocks; a
//! transport hands it byte chunks and supplies a way to write bytes back and
//! to learn when the connection is gone.
//!
//! ## Overview
//!
//! This crate defines:
//! - **Traits**: [`Writer`], [`CloseListener`], [`ReadHandler`], [`TimeoutHandler`]
//! - **Close codes**: [`CloseCode`], [`CloseReason`]
//! - **Errors**: [`TransportError`], [`TransportResult`]
//! - **Config**: [`TimeoutConfig`]
//! - **Metrics**: [`AtomicMetrics`], [`TransportMetrics`]
//!
//! ## Usage
//!
//! Transport implementations depend on this crate and implement [`Writer`]:
//!
//! ```rust,ignore
//! use bytes::Bytes;
//! use turbows_transport_traits::{TransportResult, Writer};
//!
//! #[derive(Debug)]
//! struct MyWriter { /* ... */ }
//!
//! impl Writer for MyWriter {
//!     fn write(&self, data: Bytes) -> TransportResult<()> { /* ... */ }
//!     fn close(&self) -> TransportResult<()> { /* ... */ }
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
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::must_use_candidate
)]

mod close;
mod config;
mod error;
mod metrics;
mod traits;

// Re-export all public items
pub use close::{CloseCode, CloseReason};
pub use config::TimeoutConfig;
pub use error::{TransportError, TransportResult};
pub use metrics::{AtomicMetrics, TransportMetrics};
pub use traits::{CloseListener, ReadHandler, TimeoutHandler, Writer};

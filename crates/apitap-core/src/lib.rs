//! # apitap-core
//!
//! Capture-and-redact pipeline for HTTP services.
//!
//! [`CaptureLayer`] wraps a tower service so that every exchange is copied
//! into a bounded buffer while it streams, recorded as a HAR document,
//! masked according to the caller's configuration and delivered to an ingest
//! sink on a detached task. The live request and response are never altered
//! and never wait on delivery.
//!
//! Handlers opt into per-request redaction through the [`Controller`] found
//! in the request extensions:
//!
//! ```ignore
//! let client = apitap_core::Client::new(apitap_core::Config::new(api_key))?;
//!
//! let service = ServiceBuilder::new()
//!     .layer(client.layer())
//!     .service_fn(|req| async move {
//!         if let Some(controller) = Controller::from_extensions(req.extensions()) {
//!             controller.mask_request_headers(["authorization"], &[]);
//!         }
//!         handle(req).await
//!     });
//! ```
//!
//! Framework front-ends such as `apitap-axum` add route hint extraction and
//! body type plumbing on top of this crate.

mod builder;
mod capture;
mod client;
mod config;
mod controller;
mod error;
pub mod har;
mod mask;
mod middleware;
pub mod path_hint;
pub mod redact;
mod sink;

// Public API
pub use capture::{CaptureBody, TeeBody, DROPPED_BODY_TEXT};
pub use client::{init, try_global, Client};
pub use config::{
    Config, DEFAULT_INGEST_TIMEOUT, DEFAULT_MAX_CAPTURE_SIZE, DEFAULT_SERVER_URL,
};
pub use controller::Controller;
pub use error::{Error, Result};
pub use mask::{MaskMetadata, DEFAULT_NUMBER_MASK, DEFAULT_STRING_MASK};
pub use middleware::{CaptureLayer, CaptureService, PathHintFn};
pub use sink::{BufferSink, Envelope, HttpSink, IngestSink};

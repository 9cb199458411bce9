//! # apitap-axum
//!
//! Axum front-end for the apitap capture pipeline.
//!
//! [`layer`] wires `apitap-core`'s capture middleware into an axum `Router`:
//! the matched route template becomes the exchange's path hint, and the
//! tee'd request body is re-boxed so the router keeps seeing
//! [`axum::body::Body`].
//!
//! ```ignore
//! let client = apitap_core::Client::new(apitap_core::Config::new(api_key))?;
//!
//! let app = Router::new()
//!     .route("/user/:id", get(show_user))
//!     .layer(apitap_axum::layer(&client));
//! ```
//!
//! Handlers reach the per-request [`Controller`] through the standard
//! `Extension` extractor:
//!
//! ```ignore
//! async fn show_user(Extension(controller): Extension<Controller>) -> String {
//!     controller.mask_response_string_fields(["email"], &[]);
//!     // ...
//! }
//! ```

use apitap_core::{CaptureLayer, Client, TeeBody};
use axum::body::Body;
use axum::extract::MatchedPath;
use http::request::Parts;
use http::Request;
use tower::layer::util::{Identity, Stack};
use tower::util::MapRequestLayer;
use tower::ServiceBuilder;

pub use apitap_core::Controller;

type BoxRequestFn = fn(Request<TeeBody<Body>>) -> Request<Body>;

/// Capture layer wired for axum.
///
/// Apply with [`axum::Router::layer`]. Axum runs router layers after route
/// matching, so the matched path is already in the request extensions when
/// the capture middleware reads it.
pub fn layer(
    client: &Client,
) -> ServiceBuilder<Stack<MapRequestLayer<BoxRequestFn>, Stack<CaptureLayer, Identity>>> {
    ServiceBuilder::new()
        .layer(client.layer().with_path_hint(matched_path_hint))
        .map_request(box_request_body as BoxRequestFn)
}

/// Read the matched route template out of the request extensions.
fn matched_path_hint(parts: &Parts) -> Option<String> {
    parts
        .extensions
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
}

fn box_request_body(req: Request<TeeBody<Body>>) -> Request<Body> {
    req.map(Body::new)
}

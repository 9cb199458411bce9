//! Tower layer that captures exchanges and hands them to the ingest sink.
//!
//! [`CaptureLayer`] wraps a service so that every request/response pair is
//! buffered (within the capture budget), recorded as a HAR document and
//! delivered on a detached task. The wrapped service sees the request and
//! response bytes unchanged, and delivery never blocks the client path.

use crate::builder::{self, ExchangeParts};
use crate::capture::{drain_reclaimed, CaptureBody, CaptureState, TeeBody};
use crate::client::Client;
use crate::controller::Controller;
use crate::mask::MaskSet;
use crate::path_hint;
use crate::sink::Envelope;
use http::request::Parts;
use http::{Request, Response};
use http_body::Body;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use time::OffsetDateTime;
use tokio::sync::oneshot;
use tower::{BoxError, Layer, Service};
use tracing::Instrument;

/// Route hint extractor, run against the request head before the handler.
/// Returns the framework's route template when one is known.
pub type PathHintFn = dyn Fn(&Parts) -> Option<String> + Send + Sync;

/// Layer that wraps a service with exchange capture.
///
/// Obtained from [`Client::layer`]. Must be used inside a tokio runtime;
/// record delivery runs on spawned tasks.
#[derive(Clone)]
pub struct CaptureLayer {
    client: Client,
    path_hint: Option<Arc<PathHintFn>>,
}

impl CaptureLayer {
    /// Create a layer that delivers through the given client.
    pub fn new(client: &Client) -> Self {
        Self {
            client: client.clone(),
            path_hint: None,
        }
    }

    /// Install a route hint extractor, typically one that reads the
    /// framework's matched route out of the request extensions. The extracted
    /// hint is normalized to `{name}` template syntax.
    pub fn with_path_hint<F>(mut self, extractor: F) -> Self
    where
        F: Fn(&Parts) -> Option<String> + Send + Sync + 'static,
    {
        self.path_hint = Some(Arc::new(extractor));
        self
    }
}

impl<S> Layer<S> for CaptureLayer {
    type Service = CaptureService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CaptureService {
            inner,
            client: self.client.clone(),
            path_hint: self.path_hint.clone(),
        }
    }
}

/// Service produced by [`CaptureLayer`].
#[derive(Clone)]
pub struct CaptureService<S> {
    inner: S,
    client: Client,
    path_hint: Option<Arc<PathHintFn>>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for CaptureService<S>
where
    S: Service<Request<TeeBody<ReqBody>>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    ReqBody: Body + Send + 'static,
    ReqBody::Data: Send,
    ReqBody::Error: Into<BoxError>,
    ResBody: Body,
{
    type Response = Response<CaptureBody<ResBody>>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let client = self.client.clone();
        let extractor = self.path_hint.clone();

        Box::pin(async move {
            let started_at = OffsetDateTime::now_utc();
            let start = Instant::now();

            let (mut parts, body) = req.into_parts();
            let route_hint = extractor
                .and_then(|extract| extract(&parts))
                .map(|hint| path_hint::normalize(&hint))
                .unwrap_or_default();

            let controller = Controller::default();
            parts.extensions.insert(controller.clone());

            let method = parts.method.clone();
            let uri = parts.uri.clone();
            let version = parts.version;
            let request_headers = parts.headers.clone();

            let state = Arc::new(CaptureState::new(client.max_capture_size()));
            let (reclaim_tx, reclaim_rx) = oneshot::channel();
            let request = Request::from_parts(parts, TeeBody::new(body, state.clone(), reclaim_tx));

            // A handler error produces no response to record; forward it.
            let response = inner.call(request).await?;
            let elapsed_ms = start.elapsed().as_millis() as f64;

            let (res_parts, res_body) = response.into_parts();
            let exchange = ExchangeParts {
                method,
                uri,
                version,
                request_headers,
                status: res_parts.status,
                response_headers: res_parts.headers.clone(),
                started_at,
                elapsed_ms,
            };

            let (done_tx, done_rx) = oneshot::channel();
            let response = Response::from_parts(
                res_parts,
                CaptureBody::new(res_body, state.clone(), done_tx),
            );

            let masks = controller.freeze();
            let span = detached_span(&exchange);
            tokio::spawn(
                finish_exchange(client, exchange, state, masks, route_hint, done_rx, reclaim_rx)
                    .instrument(span),
            );

            Ok(response)
        })
    }
}

/// Span for the background task: a fresh root carrying copied correlation
/// fields only, so the task never holds the request's own span (or its
/// cancellation scope) open.
fn detached_span(exchange: &ExchangeParts) -> tracing::Span {
    tracing::info_span!(
        parent: None,
        "apitap_capture",
        method = %exchange.method,
        path = %exchange.uri.path(),
        status = exchange.status.as_u16(),
    )
}

/// Complete one exchange off the client path: wait for the response to
/// finish, catch up on unread request bytes, build the record and deliver it.
async fn finish_exchange<B>(
    client: Client,
    exchange: ExchangeParts,
    state: Arc<CaptureState>,
    masks: MaskSet,
    route_hint: String,
    done: oneshot::Receiver<()>,
    reclaim: oneshot::Receiver<Pin<Box<B>>>,
) where
    B: Body + Send + 'static,
    B::Error: Into<BoxError>,
{
    let _ = done.await;
    if let Ok(body) = reclaim.await {
        drain_reclaimed(body, &state).await;
    }

    let capture = state.snapshot();
    let har = builder::build(&exchange, &capture, &masks);
    let har = match serde_json::to_string(&har) {
        Ok(json) => json,
        Err(error) => {
            tracing::warn!(error = %error, "failed to serialize exchange record");
            return;
        }
    };

    // A hint set through the controller wins over the framework's route, and
    // is passed through as given.
    let path_hint = match &masks.path_hint {
        Some(hint) => hint.clone(),
        None => route_hint,
    };
    let envelope = Envelope {
        har,
        path_hint,
        api_id: client.api_id().to_string(),
        version_id: client.version_id().to_string(),
        customer_id: masks.customer_id.clone().unwrap_or_default(),
        masking_metadata: masks.metadata(),
    };

    match tokio::time::timeout(client.ingest_timeout(), client.sink().deliver(envelope)).await {
        Ok(Ok(())) => tracing::debug!("exchange record delivered"),
        Ok(Err(error)) => tracing::warn!(error = %error, "failed to deliver exchange record"),
        Err(_) => tracing::warn!(
            timeout_ms = client.ingest_timeout().as_millis() as u64,
            "exchange record delivery timed out"
        ),
    }
}

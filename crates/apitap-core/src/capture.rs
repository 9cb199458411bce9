//! Bounded capture of request and response bytes.
//!
//! [`CaptureState`] owns the buffered copies of one exchange's traffic.
//! [`TeeBody`] wraps the request body and copies each data frame as the
//! handler reads it; [`CaptureBody`] does the same for the response body
//! while it streams to the client. Both forward frames unmodified, so the
//! live exchange is byte-identical to an uninstrumented run.
//!
//! A single byte budget is shared across both sides. The side whose append
//! would push the combined total past the budget is flagged invalid and its
//! buffer stops growing; wire-byte counters keep counting so reported body
//! sizes stay accurate.

use bytes::{Buf, Bytes};
use http_body::{Body, Frame, SizeHint};
use http_body_util::BodyExt;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{ready, Context, Poll};
use tokio::sync::oneshot;

/// Placeholder recorded instead of a body that exceeded the capture budget.
/// Oversized bodies are never truncated into partial text.
pub const DROPPED_BODY_TEXT: &str = "--dropped--";

/// Buffered request/response copies for one exchange.
#[derive(Debug)]
pub(crate) struct CaptureState {
    inner: Mutex<CaptureInner>,
}

#[derive(Debug)]
struct CaptureInner {
    max_capture: usize,
    request_buf: Vec<u8>,
    response_buf: Vec<u8>,
    request_valid: bool,
    response_valid: bool,
    request_wire_bytes: u64,
    response_wire_bytes: u64,
}

/// Final capture result, taken once when the record is built.
///
/// A `None` body means that side blew the budget and is reported with the
/// drop sentinel; `Some` with an empty buffer means the side genuinely
/// carried no bytes.
#[derive(Debug)]
pub(crate) struct CaptureSnapshot {
    pub(crate) request_body: Option<Bytes>,
    pub(crate) request_wire_bytes: u64,
    pub(crate) response_body: Option<Bytes>,
    pub(crate) response_wire_bytes: u64,
}

impl CaptureState {
    pub(crate) fn new(max_capture: usize) -> Self {
        Self {
            inner: Mutex::new(CaptureInner {
                max_capture,
                request_buf: Vec::new(),
                response_buf: Vec::new(),
                request_valid: true,
                response_valid: true,
                request_wire_bytes: 0,
                response_wire_bytes: 0,
            }),
        }
    }

    /// Record request bytes the handler has read.
    pub(crate) fn record_request(&self, chunk: &[u8]) {
        let mut inner = self.lock();
        if inner.request_buf.len() + inner.response_buf.len() + chunk.len() > inner.max_capture {
            inner.request_valid = false;
        } else if inner.request_valid {
            inner.request_buf.extend_from_slice(chunk);
        }
        inner.request_wire_bytes += chunk.len() as u64;
    }

    /// Record response bytes on their way to the client.
    pub(crate) fn record_response(&self, chunk: &[u8]) {
        let mut inner = self.lock();
        if inner.request_buf.len() + inner.response_buf.len() + chunk.len() > inner.max_capture {
            inner.response_valid = false;
        } else if inner.response_valid {
            inner.response_buf.extend_from_slice(chunk);
        }
        inner.response_wire_bytes += chunk.len() as u64;
    }

    /// Flag the response capture as incomplete.
    pub(crate) fn invalidate_response(&self) {
        self.lock().response_valid = false;
    }

    /// Take the buffered bytes out of the state.
    pub(crate) fn snapshot(&self) -> CaptureSnapshot {
        let mut inner = self.lock();
        let request_buf = std::mem::take(&mut inner.request_buf);
        let response_buf = std::mem::take(&mut inner.response_buf);
        CaptureSnapshot {
            request_body: inner.request_valid.then(|| Bytes::from(request_buf)),
            request_wire_bytes: inner.request_wire_bytes,
            response_body: inner.response_valid.then(|| Bytes::from(response_buf)),
            response_wire_bytes: inner.response_wire_bytes,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CaptureInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Request body wrapper that copies frames into the capture buffer as the
/// handler reads them.
///
/// If the handler drops the body before end of stream, the un-consumed inner
/// body is handed back over the reclaim channel so the background task can
/// finish the capture off the client-facing path.
pub struct TeeBody<B> {
    inner: Option<Pin<Box<B>>>,
    state: Arc<CaptureState>,
    reclaim: Option<oneshot::Sender<Pin<Box<B>>>>,
}

impl<B: Body> TeeBody<B> {
    pub(crate) fn new(
        body: B,
        state: Arc<CaptureState>,
        reclaim: oneshot::Sender<Pin<Box<B>>>,
    ) -> Self {
        Self {
            inner: Some(Box::pin(body)),
            state,
            reclaim: Some(reclaim),
        }
    }

    fn finished(&mut self) {
        self.inner = None;
        self.reclaim = None;
    }
}

impl<B> Body for TeeBody<B>
where
    B: Body,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        loop {
            let Some(inner) = this.inner.as_mut() else {
                return Poll::Ready(None);
            };
            match ready!(inner.as_mut().poll_frame(cx)) {
                Some(Ok(frame)) => match frame.into_data() {
                    Ok(mut data) => {
                        let bytes = data.copy_to_bytes(data.remaining());
                        this.state.record_request(&bytes);
                        return Poll::Ready(Some(Ok(Frame::data(bytes))));
                    }
                    Err(frame) => match frame.into_trailers() {
                        Ok(trailers) => return Poll::Ready(Some(Ok(Frame::trailers(trailers)))),
                        // A frame kind this wrapper cannot re-emit; skip it.
                        Err(_) => continue,
                    },
                },
                Some(Err(error)) => {
                    // The handler sees the same error. Whatever prefix was
                    // buffered stays part of the capture.
                    this.finished();
                    return Poll::Ready(Some(Err(error)));
                }
                None => {
                    this.finished();
                    return Poll::Ready(None);
                }
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.as_ref().map_or(true, |b| b.is_end_stream())
    }

    fn size_hint(&self) -> SizeHint {
        self.inner
            .as_ref()
            .map_or_else(|| SizeHint::with_exact(0), |b| b.size_hint())
    }
}

impl<B> Drop for TeeBody<B> {
    fn drop(&mut self) {
        if let (Some(reclaim), Some(inner)) = (self.reclaim.take(), self.inner.take()) {
            let _ = reclaim.send(inner);
        }
    }
}

/// Response body wrapper that copies frames into the capture buffer while
/// they stream to the client, and signals completion once the client-visible
/// response is done (end of stream or drop).
pub struct CaptureBody<B> {
    inner: Option<Pin<Box<B>>>,
    state: Arc<CaptureState>,
    done: Option<oneshot::Sender<()>>,
}

impl<B: Body> CaptureBody<B> {
    pub(crate) fn new(body: B, state: Arc<CaptureState>, done: oneshot::Sender<()>) -> Self {
        Self {
            inner: Some(Box::pin(body)),
            state,
            done: Some(done),
        }
    }

    fn signal_done(&mut self) {
        self.inner = None;
        if let Some(done) = self.done.take() {
            let _ = done.send(());
        }
    }
}

impl<B> Body for CaptureBody<B>
where
    B: Body,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        loop {
            let Some(inner) = this.inner.as_mut() else {
                return Poll::Ready(None);
            };
            match ready!(inner.as_mut().poll_frame(cx)) {
                Some(Ok(frame)) => match frame.into_data() {
                    Ok(mut data) => {
                        let bytes = data.copy_to_bytes(data.remaining());
                        this.state.record_response(&bytes);
                        return Poll::Ready(Some(Ok(Frame::data(bytes))));
                    }
                    Err(frame) => match frame.into_trailers() {
                        Ok(trailers) => return Poll::Ready(Some(Ok(Frame::trailers(trailers)))),
                        Err(_) => continue,
                    },
                },
                Some(Err(error)) => {
                    // Response production failed midway; the capture is
                    // incomplete and must not masquerade as the full body.
                    this.state.invalidate_response();
                    this.signal_done();
                    return Poll::Ready(Some(Err(error)));
                }
                None => {
                    this.signal_done();
                    return Poll::Ready(None);
                }
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.as_ref().map_or(true, |b| b.is_end_stream())
    }

    fn size_hint(&self) -> SizeHint {
        self.inner
            .as_ref()
            .map_or_else(|| SizeHint::with_exact(0), |b| b.size_hint())
    }
}

impl<B> Drop for CaptureBody<B> {
    fn drop(&mut self) {
        // Covers client disconnects: a dropped response body still completes
        // the exchange.
        if let Some(done) = self.done.take() {
            let _ = done.send(());
        }
    }
}

/// Finish capturing a request body the handler left unread.
pub(crate) async fn drain_reclaimed<B>(mut body: Pin<Box<B>>, state: &CaptureState)
where
    B: Body,
    B::Error: Into<tower::BoxError>,
{
    loop {
        match body.frame().await {
            Some(Ok(frame)) => {
                if let Ok(mut data) = frame.into_data() {
                    let bytes = data.copy_to_bytes(data.remaining());
                    state.record_request(&bytes);
                }
            }
            Some(Err(error)) => {
                let error = error.into();
                tracing::warn!(error = %error, "failed to drain unread request body");
                return;
            }
            None => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::Full;

    #[test]
    fn test_capture_within_budget() {
        let state = CaptureState::new(100);
        state.record_request(b"hello ");
        state.record_request(b"world");
        state.record_response(b"ok");

        let snap = state.snapshot();
        assert_eq!(snap.request_body.as_deref(), Some(&b"hello world"[..]));
        assert_eq!(snap.response_body.as_deref(), Some(&b"ok"[..]));
        assert_eq!(snap.request_wire_bytes, 11);
        assert_eq!(snap.response_wire_bytes, 2);
    }

    #[test]
    fn test_overflowing_side_dropped_other_kept() {
        let state = CaptureState::new(10);
        state.record_request(b"12345");
        state.record_response(b"123456789");

        let snap = state.snapshot();
        assert_eq!(snap.request_body.as_deref(), Some(&b"12345"[..]));
        assert!(snap.response_body.is_none());
        assert_eq!(snap.response_wire_bytes, 9);
    }

    #[test]
    fn test_budget_is_shared_across_sides() {
        let state = CaptureState::new(10);
        state.record_response(b"123456789");
        // 9 + 2 > 10, so the request side is the one that tips over.
        state.record_request(b"ab");

        let snap = state.snapshot();
        assert!(snap.request_body.is_none());
        assert_eq!(snap.response_body.as_deref(), Some(&b"123456789"[..]));
    }

    #[test]
    fn test_exact_budget_is_captured() {
        let state = CaptureState::new(5);
        state.record_response(b"12345");

        let snap = state.snapshot();
        assert_eq!(snap.response_body.as_deref(), Some(&b"12345"[..]));
    }

    #[test]
    fn test_invalid_side_stays_invalid_and_counts_wire_bytes() {
        let state = CaptureState::new(4);
        state.record_response(b"12345");
        state.record_response(b"x");

        let snap = state.snapshot();
        assert!(snap.response_body.is_none());
        assert_eq!(snap.response_wire_bytes, 6);
    }

    #[tokio::test]
    async fn test_tee_body_records_consumed_frames() {
        let state = Arc::new(CaptureState::new(1024));
        let (reclaim_tx, reclaim_rx) = oneshot::channel();
        let tee = TeeBody::new(
            Full::new(Bytes::from_static(b"payload")),
            state.clone(),
            reclaim_tx,
        );

        let collected = tee.collect().await.unwrap().to_bytes();
        assert_eq!(collected, Bytes::from_static(b"payload"));

        // Fully consumed, so nothing comes back on the reclaim channel.
        assert!(reclaim_rx.await.is_err());
        let snap = state.snapshot();
        assert_eq!(snap.request_body.as_deref(), Some(&b"payload"[..]));
        assert_eq!(snap.request_wire_bytes, 7);
    }

    #[tokio::test]
    async fn test_tee_body_reclaims_unread_remainder() {
        let state = Arc::new(CaptureState::new(1024));
        let (reclaim_tx, reclaim_rx) = oneshot::channel();
        let tee = TeeBody::new(
            Full::new(Bytes::from_static(b"never read")),
            state.clone(),
            reclaim_tx,
        );

        drop(tee);

        let remainder = reclaim_rx.await.expect("unread body is handed back");
        drain_reclaimed(remainder, &state).await;

        let snap = state.snapshot();
        assert_eq!(snap.request_body.as_deref(), Some(&b"never read"[..]));
    }

    #[tokio::test]
    async fn test_capture_body_signals_done_at_end_of_stream() {
        let state = Arc::new(CaptureState::new(1024));
        let (done_tx, done_rx) = oneshot::channel();
        let body = CaptureBody::new(
            Full::new(Bytes::from_static(b"response")),
            state.clone(),
            done_tx,
        );

        let collected = body.collect().await.unwrap().to_bytes();
        assert_eq!(collected, Bytes::from_static(b"response"));
        assert!(done_rx.await.is_ok());

        let snap = state.snapshot();
        assert_eq!(snap.response_body.as_deref(), Some(&b"response"[..]));
    }

    #[tokio::test]
    async fn test_capture_body_signals_done_on_drop() {
        let state = Arc::new(CaptureState::new(1024));
        let (done_tx, done_rx) = oneshot::channel();
        let body = CaptureBody::new(
            Full::new(Bytes::from_static(b"gone")),
            state.clone(),
            done_tx,
        );

        drop(body);
        assert!(done_rx.await.is_ok());
    }
}

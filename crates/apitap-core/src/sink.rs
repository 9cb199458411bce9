//! Delivery of finished exchange records.
//!
//! [`IngestSink`] is the seam between the capture pipeline and the outside
//! world. The default [`HttpSink`] posts envelopes to the ingest service;
//! [`BufferSink`] keeps them in memory for tests and local inspection.

use crate::error::{Error, Result};
use crate::mask::MaskMetadata;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

const INGEST_PATH: &str = "/v1/ingest";
const API_KEY_HEADER: &str = "x-api-key";

/// One finished exchange, ready for ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Serialized HAR document.
    pub har: String,
    /// Normalized route template, when known.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path_hint: String,
    /// API this exchange belongs to.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_id: String,
    /// Version of that API.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version_id: String,
    /// Caller-attributed customer, when set during the exchange.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub customer_id: String,
    /// Which fields were masked, names only.
    pub masking_metadata: MaskMetadata,
}

/// Destination for finished exchange records.
///
/// Delivery runs on a detached task after the response has gone out, so a
/// slow or failing sink never touches request latency.
#[async_trait]
pub trait IngestSink: Send + Sync + 'static {
    /// Deliver one envelope.
    async fn deliver(&self, envelope: Envelope) -> Result<()>;
}

/// Sink that posts envelopes to the ingest service over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: reqwest::Client,
    endpoint: reqwest::Url,
    api_key: String,
}

impl HttpSink {
    /// Build a sink for the given server. The request timeout should match
    /// the pipeline's delivery deadline.
    pub fn new(server_url: &str, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let endpoint = format!("{}{INGEST_PATH}", server_url.trim_end_matches('/'));
        let endpoint = reqwest::Url::parse(&endpoint)
            .map_err(|_| Error::InvalidServerUrl(server_url.to_string()))?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint,
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl IngestSink for HttpSink {
    async fn deliver(&self, envelope: Envelope) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .header(API_KEY_HEADER, &self.api_key)
            .json(&envelope)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::IngestStatus(status.as_u16()));
        }
        Ok(())
    }
}

/// In-memory sink for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct BufferSink {
    envelopes: Arc<Mutex<Vec<Envelope>>>,
}

impl BufferSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything delivered so far, in delivery order.
    pub fn envelopes(&self) -> Vec<Envelope> {
        self.lock().clone()
    }

    /// Drain everything delivered so far.
    pub fn take(&self) -> Vec<Envelope> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Envelope>> {
        self.envelopes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl IngestSink for BufferSink {
    async fn deliver(&self, envelope: Envelope) -> Result<()> {
        self.lock().push(envelope);
        Ok(())
    }
}

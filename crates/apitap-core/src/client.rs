//! SDK entry point tying configuration, middleware and delivery together.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::middleware::CaptureLayer;
use crate::sink::{HttpSink, IngestSink};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

static DEFAULT_CLIENT: OnceLock<Client> = OnceLock::new();

/// Handle to a configured capture pipeline.
///
/// Cheap to clone; all clones share the same sink. Most applications build
/// one client at startup and hand [`Client::layer`] to their router.
///
/// # Example
///
/// ```ignore
/// let client = apitap_core::Client::new(
///     apitap_core::Config::new(std::env::var("APITAP_API_KEY")?)
///         .api_id("orders")
///         .version_id("v1"),
/// )?;
///
/// let app = Router::new()
///     .route("/orders", post(create_order))
///     .layer(apitap_axum::layer(&client));
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: Config,
    sink: Box<dyn IngestSink>,
}

impl Client {
    /// Build a client that delivers to the configured ingest service.
    pub fn new(config: Config) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(Error::MissingApiKey);
        }
        let sink = HttpSink::new(
            &config.server_url,
            config.api_key.clone(),
            config.ingest_timeout,
        )?;
        Ok(Self::with_sink(config, sink))
    }

    /// Build a client that delivers to a custom sink. No API key is needed
    /// since nothing talks to the ingest service.
    pub fn with_sink(config: Config, sink: impl IngestSink) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                config,
                sink: Box::new(sink),
            }),
        }
    }

    /// Capture layer delivering through this client.
    pub fn layer(&self) -> CaptureLayer {
        CaptureLayer::new(self)
    }

    pub(crate) fn max_capture_size(&self) -> usize {
        self.inner.config.max_capture_size
    }

    pub(crate) fn ingest_timeout(&self) -> Duration {
        self.inner.config.ingest_timeout
    }

    pub(crate) fn api_id(&self) -> &str {
        &self.inner.config.api_id
    }

    pub(crate) fn version_id(&self) -> &str {
        &self.inner.config.version_id
    }

    pub(crate) fn sink(&self) -> &dyn IngestSink {
        self.inner.sink.as_ref()
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

/// Initialize the process-wide default client.
///
/// The first successful call wins; later calls return the existing client
/// and ignore their config.
pub fn init(config: Config) -> Result<&'static Client> {
    if let Some(client) = DEFAULT_CLIENT.get() {
        return Ok(client);
    }
    let client = Client::new(config)?;
    Ok(DEFAULT_CLIENT.get_or_init(|| client))
}

/// The process-wide default client, if [`init`] has run.
pub fn try_global() -> Option<&'static Client> {
    DEFAULT_CLIENT.get()
}

//! Configuration for the capture pipeline.
//!
//! This module provides the `Config` builder for customizing capture
//! behavior and ingest delivery.

use std::time::Duration;

/// Default ingest endpoint.
pub const DEFAULT_SERVER_URL: &str = "https://ingest.apitap.dev";

/// Default shared byte budget for one exchange's request and response buffers.
pub const DEFAULT_MAX_CAPTURE_SIZE: usize = 1024 * 1024;

/// Default bound on a single ingest delivery.
pub const DEFAULT_INGEST_TIMEOUT: Duration = Duration::from_secs(1);

/// Configuration for the capture pipeline.
///
/// Use the builder pattern to customize behavior:
///
/// ```ignore
/// use apitap_core::Config;
///
/// let config = Config::new("my-api-key")
///     .api_id("orders-api")
///     .version_id("v2")
///     .max_capture_size(64 * 1024)
///     .ingest_timeout(std::time::Duration::from_millis(500));
/// ```
#[derive(Clone)]
pub struct Config {
    /// API key sent with every ingest delivery.
    pub(crate) api_key: String,

    /// Identifier of the API this workload serves, attached to every exchange.
    pub(crate) api_id: String,

    /// Version label attached alongside the API id.
    pub(crate) version_id: String,

    /// Base URL of the ingest endpoint.
    pub(crate) server_url: String,

    /// Shared byte budget for one exchange's request and response buffers.
    /// Once the running total would exceed it, the offending side is dropped.
    pub(crate) max_capture_size: usize,

    /// Bound on a single ingest delivery. Expired deliveries are logged and
    /// dropped, never retried.
    pub(crate) ingest_timeout: Duration,
}

impl Config {
    /// Create a new configuration with the given API key and default values.
    ///
    /// Defaults:
    /// - Server URL: the hosted ingest endpoint
    /// - Max capture size: 1 MiB shared across request and response
    /// - Ingest timeout: 1 second
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_id: String::new(),
            version_id: String::new(),
            server_url: DEFAULT_SERVER_URL.to_string(),
            max_capture_size: DEFAULT_MAX_CAPTURE_SIZE,
            ingest_timeout: DEFAULT_INGEST_TIMEOUT,
        }
    }

    /// Set the API identifier attached to every exchange.
    pub fn api_id(mut self, id: impl Into<String>) -> Self {
        self.api_id = id.into();
        self
    }

    /// Set the version label attached alongside the API id.
    pub fn version_id(mut self, id: impl Into<String>) -> Self {
        self.version_id = id.into();
        self
    }

    /// Set the base URL of the ingest endpoint.
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = url.into();
        self
    }

    /// Set the shared byte budget for one exchange's buffers.
    ///
    /// A body that would push the combined request+response total past this
    /// ceiling is replaced by a drop sentinel in the finished record. The
    /// live response is never affected.
    pub fn max_capture_size(mut self, size: usize) -> Self {
        self.max_capture_size = size;
        self
    }

    /// Set the bound on a single ingest delivery.
    pub fn ingest_timeout(mut self, timeout: Duration) -> Self {
        self.ingest_timeout = timeout;
        self
    }
}

// The API key never appears in logs, so Debug is written by hand.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &"<redacted>")
            .field("api_id", &self.api_id)
            .field("version_id", &self.version_id)
            .field("server_url", &self.server_url)
            .field("max_capture_size", &self.max_capture_size)
            .field("ingest_timeout", &self.ingest_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::new("key");
        assert_eq!(config.api_key, "key");
        assert_eq!(config.server_url, DEFAULT_SERVER_URL);
        assert_eq!(config.max_capture_size, DEFAULT_MAX_CAPTURE_SIZE);
        assert_eq!(config.ingest_timeout, DEFAULT_INGEST_TIMEOUT);
        assert!(config.api_id.is_empty());
        assert!(config.version_id.is_empty());
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let rendered = format!("{:?}", Config::new("super-secret"));
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_builder_overrides() {
        let config = Config::new("key")
            .api_id("orders")
            .version_id("v2")
            .server_url("https://ingest.example.com")
            .max_capture_size(512)
            .ingest_timeout(Duration::from_millis(250));

        assert_eq!(config.api_id, "orders");
        assert_eq!(config.version_id, "v2");
        assert_eq!(config.server_url, "https://ingest.example.com");
        assert_eq!(config.max_capture_size, 512);
        assert_eq!(config.ingest_timeout, Duration::from_millis(250));
    }
}

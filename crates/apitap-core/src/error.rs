//! Error types for SDK construction and ingest delivery.

/// Error type for SDK construction and ingest delivery.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No API key was configured.
    #[error("missing API key")]
    MissingApiKey,

    /// The ingest server URL could not be parsed.
    #[error("invalid server URL: {0}")]
    InvalidServerUrl(String),

    /// Transport-level failure while talking to the ingest endpoint.
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The ingest endpoint rejected the delivery.
    #[error("ingest endpoint returned status {0}")]
    IngestStatus(u16),

    /// Serialization of an exchange record failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for SDK operations.
pub type Result<T> = std::result::Result<T, Error>;

//! HAR 1.2 record model.
//!
//! Serde types for the exchange record shipped to the ingest sink. Field
//! names follow the HAR wire format (camelCase), so a serialized record can
//! be loaded by standard HAR tooling.

use serde::{Deserialize, Serialize};

/// Sentinel for sizes that could not be determined.
pub const UNKNOWN_SIZE: i64 = -1;

/// Creator name recorded in the HAR log header.
pub(crate) const CREATOR_NAME: &str = "apitap";

/// Creator version recorded in the HAR log header.
pub(crate) const CREATOR_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Top-level HAR document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Har {
    /// The log being exported.
    pub log: HarLog,
}

impl Har {
    /// Build a single-entry HAR document with the standard creator header.
    pub fn single(entry: HarEntry, comment: impl Into<String>) -> Self {
        Self {
            log: HarLog {
                version: "1.2".to_string(),
                creator: Creator {
                    name: CREATOR_NAME.to_string(),
                    version: CREATOR_VERSION.to_string(),
                },
                comment: comment.into(),
                entries: vec![entry],
            },
        }
    }
}

/// HAR log header plus entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarLog {
    /// HAR format version.
    pub version: String,
    /// Tool that produced the log.
    pub creator: Creator,
    /// Free-text comment.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comment: String,
    /// Captured exchanges.
    pub entries: Vec<HarEntry>,
}

/// Tool identification in the log header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Creator {
    /// Tool name.
    pub name: String,
    /// Tool version.
    pub version: String,
}

/// One captured request/response exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarEntry {
    /// Start of the exchange, RFC 3339 with sub-second precision.
    pub started_date_time: String,
    /// Elapsed handler time in milliseconds.
    pub time: f64,
    /// Captured request.
    pub request: HarRequest,
    /// Captured response.
    pub response: HarResponse,
    /// Cache state. Always empty; this pipeline records no cache info.
    pub cache: Cache,
    /// Phase timings. Unmeasured phases carry -1.
    pub timings: Timings,
    /// Server port of the resolved URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<String>,
    /// Server hostname of the resolved URL.
    #[serde(
        rename = "serverIPAddress",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub server_ip_address: Option<String>,
}

/// Captured request half of an exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarRequest {
    /// Request method.
    pub method: String,
    /// Resolved absolute URL, query masked.
    pub url: String,
    /// Protocol version string, e.g. `HTTP/1.1`.
    pub http_version: String,
    /// Parsed request cookies, values masked.
    pub cookies: Vec<HarCookie>,
    /// Headers sorted by name, values masked.
    pub headers: Vec<NameValuePair>,
    /// Query parameters in document order, values masked.
    pub query_string: Vec<NameValuePair>,
    /// Request body, present only when bytes were observed (or dropped).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_data: Option<PostData>,
    /// Serialized size of the masked header block, -1 when unknown.
    pub headers_size: i64,
    /// Wire size of the request body, -1 when unknown.
    pub body_size: i64,
}

/// Captured response half of an exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarResponse {
    /// Status code.
    pub status: u16,
    /// Canonical reason phrase, empty for unknown codes.
    pub status_text: String,
    /// Protocol version string.
    pub http_version: String,
    /// Parsed Set-Cookie records, values masked.
    pub cookies: Vec<HarCookie>,
    /// Headers sorted by name, values masked.
    pub headers: Vec<NameValuePair>,
    /// Response body details.
    pub content: Content,
    /// Value of the Location header, empty when absent.
    #[serde(rename = "redirectURL")]
    pub redirect_url: String,
    /// Serialized size of the masked header block, -1 when unknown.
    pub headers_size: i64,
    /// Wire size of the response body. Forced to 0 for 304 responses.
    pub body_size: i64,
}

/// A name/value pair used for headers and query parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameValuePair {
    /// Pair name.
    pub name: String,
    /// Pair value, possibly masked.
    pub value: String,
}

impl NameValuePair {
    /// Create a pair.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A parsed cookie.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarCookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value, possibly masked.
    pub value: String,
    /// Path attribute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Domain attribute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Absolute expiry, RFC 3339. Computed from Max-Age relative to the
    /// exchange start when both are present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,
    /// HttpOnly attribute.
    #[serde(default, skip_serializing_if = "is_false")]
    pub http_only: bool,
    /// Secure attribute.
    #[serde(default, skip_serializing_if = "is_false")]
    pub secure: bool,
}

/// Request body details.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostData {
    /// Declared or detected media type.
    pub mime_type: String,
    /// Decoded posted parameters. Always empty; bodies are kept as text.
    pub params: Vec<NameValuePair>,
    /// Body text, masked, or the drop sentinel.
    pub text: String,
}

/// Response body details.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    /// Captured size in bytes, -1 when nothing was captured.
    pub size: i64,
    /// Declared media type.
    pub mime_type: String,
    /// Body text, masked, or the drop sentinel.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
}

/// Cache state for an entry. This pipeline records none.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cache {}

/// Phase timings for an entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timings {
    /// Time spent sending, -1 when unmeasured.
    pub send: f64,
    /// Time spent waiting, -1 when unmeasured.
    pub wait: f64,
    /// Time spent receiving, -1 when unmeasured.
    pub receive: f64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            send: -1.0,
            wait: -1.0,
            receive: -1.0,
        }
    }
}

fn is_false(v: &bool) -> bool {
    !*v
}

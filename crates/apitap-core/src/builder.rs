//! HAR record assembly for one captured exchange.
//!
//! Takes the frozen request/response heads, the capture snapshot and the
//! caller's mask set, and produces the single-entry HAR document shipped to
//! the ingest sink. All masking happens here, after the live exchange has
//! already completed.

use crate::capture::{CaptureSnapshot, DROPPED_BODY_TEXT};
use crate::har::{
    Cache, Content, Har, HarCookie, HarEntry, HarRequest, HarResponse, NameValuePair, PostData,
    Timings, UNKNOWN_SIZE,
};
use crate::mask::MaskSet;
use crate::redact::mask_body;
use cookie::Cookie;
use http::header::{AsHeaderName, CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE};
use http::{HeaderMap, Method, StatusCode, Uri, Version};
use std::collections::BTreeMap;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Frozen heads and timing of one exchange, cloned out of the live
/// request/response before the handler ran.
pub(crate) struct ExchangeParts {
    pub(crate) method: Method,
    pub(crate) uri: Uri,
    /// Negotiated protocol of the connection, reported for both halves.
    pub(crate) version: Version,
    pub(crate) request_headers: HeaderMap,
    pub(crate) status: StatusCode,
    pub(crate) response_headers: HeaderMap,
    pub(crate) started_at: OffsetDateTime,
    pub(crate) elapsed_ms: f64,
}

/// Build the HAR document for one exchange.
pub(crate) fn build(parts: &ExchangeParts, capture: &CaptureSnapshot, masks: &MaskSet) -> Har {
    let (encoded_query, query_pairs) =
        masked_query(parts.uri.query().unwrap_or(""), &masks.query_string_masks);
    let resolved = resolve_url(parts, &encoded_query);

    let entry = HarEntry {
        started_date_time: parts.started_at.format(&Rfc3339).unwrap_or_default(),
        time: parts.elapsed_ms,
        request: build_request(parts, capture, masks, &resolved.url, query_pairs),
        response: build_response(parts, capture, masks),
        cache: Cache::default(),
        timings: Timings::default(),
        connection: resolved.port,
        server_ip_address: resolved.host,
    };
    let comment = format!("request capture for {}", resolved.url);
    Har::single(entry, comment)
}

struct ResolvedUrl {
    url: String,
    host: Option<String>,
    port: Option<String>,
}

/// Reassemble the absolute URL the client used. Forwarded headers win over
/// the URI's own scheme and authority so records from behind a proxy name
/// the public endpoint.
fn resolve_url(parts: &ExchangeParts, encoded_query: &str) -> ResolvedUrl {
    let scheme = header_str(&parts.request_headers, "x-forwarded-proto")
        .unwrap_or_else(|| parts.uri.scheme_str().unwrap_or("http").to_string());
    let authority = header_str(&parts.request_headers, "x-forwarded-host")
        .or_else(|| header_str(&parts.request_headers, "host"))
        .or_else(|| parts.uri.authority().map(|a| a.to_string()))
        .unwrap_or_default();

    let mut url = format!("{scheme}://{authority}{}", parts.uri.path());
    if !encoded_query.is_empty() {
        url.push('?');
        url.push_str(encoded_query);
    }

    let (host, port) = split_host_port(&authority);
    ResolvedUrl {
        url,
        host: Some(host).filter(|h| !h.is_empty()),
        port,
    }
}

fn build_request(
    parts: &ExchangeParts,
    capture: &CaptureSnapshot,
    masks: &MaskSet,
    url: &str,
    query_string: Vec<NameValuePair>,
) -> HarRequest {
    let headers = masked_headers(&parts.request_headers, &masks.request_header_masks);
    let headers_size = headers_size(&headers);
    let post_data = post_data(parts, capture, masks);
    let body_size = if post_data.is_some() {
        capture.request_wire_bytes as i64
    } else {
        UNKNOWN_SIZE
    };

    HarRequest {
        method: parts.method.to_string(),
        url: url.to_string(),
        http_version: version_string(parts.version),
        cookies: request_cookies(&parts.request_headers, &masks.request_cookie_masks),
        headers,
        query_string,
        post_data,
        headers_size,
        body_size,
    }
}

fn build_response(parts: &ExchangeParts, capture: &CaptureSnapshot, masks: &MaskSet) -> HarResponse {
    let headers = masked_headers(&parts.response_headers, &masks.response_header_masks);
    let headers_size = headers_size(&headers);
    let mime_type = header_str(&parts.response_headers, CONTENT_TYPE)
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let mut text = String::new();
    let mut content_size = UNKNOWN_SIZE;
    let body_size;
    if parts.status == StatusCode::NOT_MODIFIED {
        // 304 carries no body by definition; whatever was buffered is noise.
        body_size = 0;
    } else {
        match &capture.response_body {
            Some(body) => {
                text = String::from_utf8_lossy(body).into_owned();
                if !body.is_empty() {
                    content_size = body.len() as i64;
                }
            }
            None => text = DROPPED_BODY_TEXT.to_string(),
        }
        body_size = capture.response_wire_bytes as i64;
    }
    if !text.is_empty() {
        text = mask_body(
            &text,
            &mime_type,
            &masks.response_field_masks_string,
            &masks.response_field_masks_number,
        );
    }

    HarResponse {
        status: parts.status.as_u16(),
        status_text: parts
            .status
            .canonical_reason()
            .unwrap_or_default()
            .to_string(),
        http_version: version_string(parts.version),
        cookies: response_cookies(
            &parts.response_headers,
            &masks.response_cookie_masks,
            parts.started_at,
        ),
        headers,
        content: Content {
            size: content_size,
            mime_type,
            text,
        },
        redirect_url: header_str(&parts.response_headers, LOCATION).unwrap_or_default(),
        headers_size,
        body_size,
    }
}

fn post_data(
    parts: &ExchangeParts,
    capture: &CaptureSnapshot,
    masks: &MaskSet,
) -> Option<PostData> {
    let text = match &capture.request_body {
        Some(body) => String::from_utf8_lossy(body).into_owned(),
        None => DROPPED_BODY_TEXT.to_string(),
    };
    if text.is_empty() {
        return None;
    }

    let mime_type = header_str(&parts.request_headers, CONTENT_TYPE).unwrap_or_else(|| {
        sniff_mime(capture.request_body.as_deref().unwrap_or_default()).to_string()
    });
    let text = mask_body(
        &text,
        &mime_type,
        &masks.request_field_masks_string,
        &masks.request_field_masks_number,
    );

    Some(PostData {
        mime_type,
        params: Vec::new(),
        text,
    })
}

/// Parse and mask the raw query string. Returns the re-encoded query for the
/// URL plus the pair list for the record, both in document order.
fn masked_query(
    raw: &str,
    masks: &BTreeMap<String, String>,
) -> (String, Vec<NameValuePair>) {
    if raw.is_empty() {
        return (String::new(), Vec::new());
    }

    let mut pairs: Vec<(String, String)> = match serde_urlencoded::from_str(raw) {
        Ok(pairs) => pairs,
        Err(error) => {
            tracing::debug!(error = %error, "failed to parse query string, keeping raw");
            return (raw.to_string(), Vec::new());
        }
    };
    for (key, value) in &mut pairs {
        if let Some(mask) = masks.get(key) {
            *value = mask.clone();
        }
    }

    let encoded = serde_urlencoded::to_string(&pairs).unwrap_or_default();
    let listed = pairs
        .into_iter()
        .map(|(name, value)| NameValuePair { name, value })
        .collect();
    (encoded, listed)
}

/// Flatten a header map into masked name/value pairs, sorted by name.
/// Multi-valued headers produce one pair per value.
fn masked_headers(headers: &HeaderMap, masks: &BTreeMap<String, String>) -> Vec<NameValuePair> {
    let mut pairs: Vec<NameValuePair> = headers
        .iter()
        .map(|(name, value)| {
            let name = name.as_str();
            let value = match masks.get(name) {
                Some(mask) => mask.clone(),
                None => String::from_utf8_lossy(value.as_bytes()).into_owned(),
            };
            NameValuePair::new(name, value)
        })
        .collect();
    pairs.sort_by(|a, b| a.name.cmp(&b.name));
    pairs
}

/// Size of the masked header block as it would serialize on the wire,
/// `name: value\r\n` per pair.
fn headers_size(pairs: &[NameValuePair]) -> i64 {
    pairs
        .iter()
        .map(|pair| pair.name.len() + pair.value.len() + 4)
        .sum::<usize>() as i64
}

fn request_cookies(headers: &HeaderMap, masks: &BTreeMap<String, String>) -> Vec<HarCookie> {
    let mut cookies = Vec::new();
    for value in headers.get_all(COOKIE) {
        let Ok(value) = std::str::from_utf8(value.as_bytes()) else {
            continue;
        };
        for cookie in Cookie::split_parse(value).flatten() {
            let value = masks
                .get(cookie.name())
                .cloned()
                .unwrap_or_else(|| cookie.value().to_string());
            cookies.push(HarCookie {
                name: cookie.name().to_string(),
                value,
                ..Default::default()
            });
        }
    }
    cookies
}

fn response_cookies(
    headers: &HeaderMap,
    masks: &BTreeMap<String, String>,
    started_at: OffsetDateTime,
) -> Vec<HarCookie> {
    let mut cookies = Vec::new();
    for value in headers.get_all(SET_COOKIE) {
        let Ok(value) = std::str::from_utf8(value.as_bytes()) else {
            continue;
        };
        let Ok(cookie) = Cookie::parse(value) else {
            continue;
        };
        let masked = masks
            .get(cookie.name())
            .cloned()
            .unwrap_or_else(|| cookie.value().to_string());
        cookies.push(HarCookie {
            name: cookie.name().to_string(),
            value: masked,
            path: cookie.path().map(str::to_string),
            domain: cookie.domain().map(str::to_string),
            expires: cookie_expiry(&cookie, started_at),
            http_only: cookie.http_only().unwrap_or(false),
            secure: cookie.secure().unwrap_or(false),
        });
    }
    cookies
}

/// Absolute expiry of a response cookie. Max-Age is relative to the exchange
/// start and takes precedence over an Expires attribute.
fn cookie_expiry(cookie: &Cookie<'_>, started_at: OffsetDateTime) -> Option<String> {
    let expiry = match cookie.max_age() {
        Some(max_age) => started_at + max_age,
        None => cookie.expires_datetime()?,
    };
    expiry.format(&Rfc3339).ok()
}

/// First value of a header as trimmed text, `None` when absent or empty.
fn header_str(headers: &HeaderMap, name: impl AsHeaderName) -> Option<String> {
    headers
        .get(name)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).trim().to_string())
        .filter(|value| !value.is_empty())
}

fn version_string(version: Version) -> String {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_11 => "HTTP/1.1",
        Version::HTTP_2 => "HTTP/2.0",
        Version::HTTP_3 => "HTTP/3.0",
        _ => "HTTP/1.1",
    }
    .to_string()
}

/// Split an authority into hostname and port, brackets stripped from IPv6
/// literals.
fn split_host_port(authority: &str) -> (String, Option<String>) {
    if let Some(rest) = authority.strip_prefix('[') {
        if let Some((host, port)) = rest.split_once(']') {
            let port = port.strip_prefix(':').filter(|p| !p.is_empty());
            return (host.to_string(), port.map(str::to_string));
        }
    }
    match authority.rsplit_once(':') {
        Some((host, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => {
            (host.to_string(), Some(port.to_string()))
        }
        _ => (authority.to_string(), None),
    }
}

fn sniff_mime(body: &[u8]) -> &'static str {
    if body.is_empty() {
        return "application/octet-stream";
    }
    match std::str::from_utf8(body) {
        Ok(text) if !text.contains('\0') => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

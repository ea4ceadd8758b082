//! Conversions between hyper/http types and Tidewater protocol types.

use std::net::SocketAddr;

use http::{HeaderName, HeaderValue, StatusCode};
use tidewater_core::{HeaderMap, RequestHead, decode_path};
use tracing::warn;

/// Addresses of the TCP connection a request arrived on.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ConnInfo {
    pub client: SocketAddr,
    pub server: SocketAddr,
}

/// Convert a status code from u16.
pub fn status_from_u16(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Convert hyper headers, keeping duplicates and order.
///
/// Values are decoded as Latin-1 so that no byte is lost.
pub fn headers_from_http(headers: &http::HeaderMap) -> HeaderMap {
    headers
        .iter()
        .map(|(name, value)| {
            let value: String = value.as_bytes().iter().map(|&b| b as char).collect();
            (name.as_str().to_string(), value)
        })
        .collect()
}

/// Convert Tidewater headers for hyper. Invalid names or values are dropped.
///
/// Values are encoded as Latin-1, the inverse of [`headers_from_http`], so
/// a character above U+00FF makes the value invalid.
pub fn headers_to_http(headers: HeaderMap) -> http::HeaderMap {
    let mut map = http::HeaderMap::with_capacity(headers.len());
    for header in headers {
        let value = latin1(&header.value).and_then(|bytes| HeaderValue::from_bytes(&bytes).ok());
        match (HeaderName::from_bytes(header.name.as_bytes()), value) {
            (Ok(name), Some(value)) => {
                map.append(name, value);
            }
            _ => warn!(name = %header.name, "dropping invalid response header"),
        }
    }
    map
}

fn latin1(value: &str) -> Option<Vec<u8>> {
    value.chars().map(|c| u8::try_from(c).ok()).collect()
}

/// Build the connect-event metadata for a request.
pub(crate) fn request_head(parts: &http::request::Parts, conn: ConnInfo) -> RequestHead {
    let raw_path = parts.uri.path();
    let raw_path = if raw_path.is_empty() { "/" } else { raw_path };
    RequestHead {
        method: parts.method.as_str().to_string(),
        root_path: String::new(),
        path: decode_path(raw_path),
        raw_path: raw_path.to_string(),
        query_string: parts.uri.query().unwrap_or("").to_string(),
        headers: headers_from_http(&parts.headers),
        http_version: format!("{:?}", parts.version),
        scheme: parts.uri.scheme_str().unwrap_or("http").to_string(),
        client: Some(conn.client),
        server: Some(conn.server),
    }
}

/// The exact body length declared by a final header set, if any.
///
/// Chunked framing takes precedence over a stray length.
pub fn declared_length(headers: &HeaderMap) -> Option<u64> {
    if headers.contains("transfer-encoding") {
        return None;
    }
    headers.get("content-length")?.trim().parse().ok()
}

use std::net::SocketAddr;

use bytes::Bytes;

use crate::header::HeaderMap;
use crate::protocol::RequestHead;
use crate::query::QueryParams;

/// An inbound HTTP request as seen by a synchronous handler.
///
/// A `Request` is an immutable value. It is assembled by the adapter only
/// after the connect event and every body fragment have arrived, so the
/// body accessor always returns the complete payload.
#[derive(Debug, Clone)]
pub struct Request {
    head: RequestHead,
    query: QueryParams,
    body: Bytes,
}

impl Request {
    /// Assemble a request from its protocol metadata and full body.
    pub fn from_head(head: RequestHead, body: impl Into<Bytes>) -> Self {
        let query = QueryParams::parse(&head.query_string);
        Self {
            head,
            query,
            body: body.into(),
        }
    }

    /// Create a request from a method and a `path?query` target.
    pub fn new(
        method: impl Into<String>,
        target: &str,
        headers: HeaderMap,
        body: impl Into<Bytes>,
    ) -> Self {
        let (path, query) = target.split_once('?').unwrap_or((target, ""));
        let head = RequestHead {
            method: method.into(),
            path: path.to_string(),
            raw_path: path.to_string(),
            query_string: query.to_string(),
            headers,
            ..RequestHead::default()
        };
        Self::from_head(head, body)
    }

    pub fn method(&self) -> &str {
        &self.head.method
    }

    /// Mount prefix configured on the server. Not part of [`path`](Self::path).
    pub fn root_path(&self) -> &str {
        &self.head.root_path
    }

    /// Decoded path, always starting with `/`.
    pub fn path(&self) -> &str {
        &self.head.path
    }

    /// Path exactly as it appeared in the request line.
    pub fn raw_path(&self) -> &str {
        &self.head.raw_path
    }

    /// Undecoded query string, without the leading `?`.
    pub fn query_string(&self) -> &str {
        &self.head.query_string
    }

    pub fn query(&self) -> &QueryParams {
        &self.query
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.head.headers
    }

    /// The full request payload.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// The payload as UTF-8, with invalid sequences replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Protocol version, e.g. `HTTP/1.1`.
    pub fn http_version(&self) -> &str {
        &self.head.http_version
    }

    pub fn scheme(&self) -> &str {
        &self.head.scheme
    }

    pub fn client_addr(&self) -> Option<SocketAddr> {
        self.head.client
    }

    pub fn server_addr(&self) -> Option<SocketAddr> {
        self.head.server
    }

    pub fn head(&self) -> &RequestHead {
        &self.head
    }
}

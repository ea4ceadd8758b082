use bytes::Bytes;

use crate::body::{Body, LazyBody};
use crate::header::HeaderMap;

/// An outgoing HTTP response produced by a synchronous handler.
///
/// Use [`Response::new()`] for a fixed body whose length is known up front
/// and [`Response::lazy()`] for output produced incrementally. The adapter
/// consumes the response by value, so headers are final by the time the
/// first body chunk goes out.
#[derive(Debug)]
pub struct Response {
    status: u16,
    headers: HeaderMap,
    body: Body,
}

impl Response {
    pub fn new(status: u16, headers: HeaderMap, body: impl Into<Body>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// Create a response with an empty body.
    pub fn empty(status: u16) -> Self {
        Self::new(status, HeaderMap::new(), Body::empty())
    }

    /// A `text/plain; charset=utf-8` response.
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "text/plain; charset=utf-8");
        Self::new(status, headers, Body::from(body.into()))
    }

    /// Create a response whose body is pulled from `chunks` on demand.
    pub fn lazy<I, T>(status: u16, headers: HeaderMap, chunks: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
        T: Into<Bytes> + 'static,
    {
        Self::new(status, headers, LazyBody::new(chunks))
    }

    /// Like [`Response::lazy()`] for producers that can fail mid-stream.
    pub fn try_lazy<I, T, E>(status: u16, headers: HeaderMap, chunks: I) -> Self
    where
        I: IntoIterator<Item = Result<T, E>>,
        I::IntoIter: Send + 'static,
        T: Into<Bytes> + 'static,
        E: Into<anyhow::Error> + 'static,
    {
        Self::new(status, headers, LazyBody::try_new(chunks))
    }

    /// Builder method: append a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Returns `true` if the body is produced lazily.
    pub fn is_lazy(&self) -> bool {
        self.body.is_lazy()
    }

    pub fn into_parts(self) -> (u16, HeaderMap, Body) {
        (self.status, self.headers, self.body)
    }
}

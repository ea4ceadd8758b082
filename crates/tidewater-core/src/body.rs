//! Response body representations.
//!
//! A body is either a fixed buffer or a lazy, single-pass producer of
//! chunks. Lazy bodies are pulled one item at a time by the adapter and
//! are never collected into a single buffer on the serving path.

use std::fmt;

use bytes::Bytes;

/// Default chunk size for splitting fixed bodies into protocol frames (64 KB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// The boxed producer behind a [`LazyBody`].
pub type ChunkProducer = Box<dyn Iterator<Item = anyhow::Result<Bytes>> + Send>;

/// A response body.
pub enum Body {
    /// A complete buffer with a known length.
    Full(Bytes),
    /// A single-pass producer of chunks with unknown total length.
    Lazy(LazyBody),
}

impl Body {
    pub fn empty() -> Self {
        Body::Full(Bytes::new())
    }

    pub fn is_lazy(&self) -> bool {
        matches!(self, Body::Lazy(_))
    }
}

impl Default for Body {
    fn default() -> Self {
        Body::empty()
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Full(bytes) => f.debug_tuple("Full").field(&bytes.len()).finish(),
            Body::Lazy(_) => f.write_str("Lazy(..)"),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Full(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Full(Bytes::from(bytes))
    }
}

impl From<&'static str> for Body {
    fn from(s: &'static str) -> Self {
        Body::Full(Bytes::from_static(s.as_bytes()))
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Body::Full(Bytes::from(s))
    }
}

impl From<LazyBody> for Body {
    fn from(lazy: LazyBody) -> Self {
        Body::Lazy(lazy)
    }
}

/// A lazily produced body.
///
/// Wraps a blocking iterator. Pulling an item may block (file reads,
/// computation), so callers on an event loop must pull from a worker
/// thread. Dropping the body drops the producer, which releases whatever
/// the producer holds.
pub struct LazyBody {
    producer: ChunkProducer,
}

impl LazyBody {
    /// Wrap an infallible producer.
    pub fn new<I, T>(iter: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
        T: Into<Bytes> + 'static,
    {
        Self {
            producer: Box::new(iter.into_iter().map(|chunk| Ok(chunk.into()))),
        }
    }

    /// Wrap a producer that may fail partway through.
    pub fn try_new<I, T, E>(iter: I) -> Self
    where
        I: IntoIterator<Item = Result<T, E>>,
        I::IntoIter: Send + 'static,
        T: Into<Bytes> + 'static,
        E: Into<anyhow::Error> + 'static,
    {
        Self {
            producer: Box::new(
                iter.into_iter()
                    .map(|item| item.map(Into::into).map_err(Into::into)),
            ),
        }
    }

    /// Pull the next chunk. Blocks for as long as the producer does.
    pub fn next_chunk(&mut self) -> Option<anyhow::Result<Bytes>> {
        self.producer.next()
    }
}

impl Iterator for LazyBody {
    type Item = anyhow::Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_chunk()
    }
}

impl fmt::Debug for LazyBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LazyBody(..)")
    }
}

/// Splits a buffer into fixed-size chunks without copying.
///
/// Each chunk is a `Bytes::slice()` of the original allocation.
pub struct Chunks {
    buf: Bytes,
    chunk_size: usize,
    offset: usize,
}

impl Chunks {
    pub fn new(buf: Bytes, chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk_size must be > 0");
        Self {
            buf,
            chunk_size,
            offset: 0,
        }
    }
}

impl Iterator for Chunks {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        if self.offset >= self.buf.len() {
            return None;
        }
        let end = std::cmp::min(self.offset + self.chunk_size, self.buf.len());
        let chunk = self.buf.slice(self.offset..end);
        self.offset = end;
        Some(chunk)
    }
}

//! Response body fed by outbound protocol events.

use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};
use tidewater_core::OutboundEvent;
use tokio::sync::mpsc;

use crate::error::BodyError;

/// An [`http_body::Body`] that forwards the application's body events.
///
/// `Body` events become data frames and `End` finishes the body. If the
/// application drops its sender without `End`, the body yields
/// [`BodyError::Truncated`] so hyper aborts the connection instead of
/// writing the terminating chunk. Dropping this body closes the
/// channel, which is how the application learns the client is gone.
pub struct OutboundBody {
    events: Option<mpsc::Receiver<OutboundEvent>>,
    length: Option<u64>,
}

impl OutboundBody {
    /// `length` is the exact body size when the headers declared one.
    pub fn new(events: mpsc::Receiver<OutboundEvent>, length: Option<u64>) -> Self {
        Self {
            events: Some(events),
            length,
        }
    }

    /// A fixed body that does not involve the application.
    pub fn full(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let (tx, rx) = mpsc::channel(2);
        let length = data.len() as u64;
        if !data.is_empty() {
            let _ = tx.try_send(OutboundEvent::Body(data));
        }
        let _ = tx.try_send(OutboundEvent::End);
        Self::new(rx, Some(length))
    }
}

impl Body for OutboundBody {
    type Data = Bytes;
    type Error = BodyError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let Some(events) = this.events.as_mut() else {
            return Poll::Ready(None);
        };

        match ready!(events.poll_recv(cx)) {
            Some(OutboundEvent::Body(data)) => Poll::Ready(Some(Ok(Frame::data(data)))),
            Some(OutboundEvent::End) => {
                this.events = None;
                Poll::Ready(None)
            }
            Some(OutboundEvent::Start { .. }) => {
                this.events = None;
                Poll::Ready(Some(Err(BodyError::DuplicateStart)))
            }
            None => {
                this.events = None;
                Poll::Ready(Some(Err(BodyError::Truncated)))
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.events.is_none()
    }

    fn size_hint(&self) -> SizeHint {
        match self.length {
            Some(len) => SizeHint::with_exact(len),
            None => SizeHint::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn forwards_body_events_until_end() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(OutboundEvent::Body(Bytes::from("foo"))).await.unwrap();
        tx.send(OutboundEvent::Body(Bytes::from("bar"))).await.unwrap();
        tx.send(OutboundEvent::End).await.unwrap();

        let body = OutboundBody::new(rx, None);
        let collected = body.collect().await.unwrap().to_bytes();
        assert_eq!(collected, "foobar");
    }

    #[tokio::test]
    async fn missing_end_is_truncation() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(OutboundEvent::Body(Bytes::from("partial"))).await.unwrap();
        drop(tx);

        let mut body = OutboundBody::new(rx, None);
        let first = body.frame().await.unwrap().unwrap();
        assert_eq!(first.into_data().unwrap(), "partial");

        let err = body.frame().await.unwrap().unwrap_err();
        assert!(matches!(err, BodyError::Truncated));
        assert!(body.is_end_stream());
        assert!(body.frame().await.is_none());
    }

    #[tokio::test]
    async fn second_start_is_an_error() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(OutboundEvent::Start {
            status: 200,
            headers: Default::default(),
        })
        .await
        .unwrap();

        let mut body = OutboundBody::new(rx, None);
        let err = body.frame().await.unwrap().unwrap_err();
        assert!(matches!(err, BodyError::DuplicateStart));
    }

    #[tokio::test]
    async fn full_body_has_exact_size() {
        let body = OutboundBody::full("Internal Server Error");
        assert_eq!(body.size_hint().exact(), Some(21));
        let collected = body.collect().await.unwrap().to_bytes();
        assert_eq!(collected, "Internal Server Error");
    }

    #[test]
    fn unknown_length_has_no_exact_hint() {
        let (_tx, rx) = mpsc::channel(1);
        let body = OutboundBody::new(rx, None);
        assert_eq!(body.size_hint().exact(), None);
        assert!(!body.is_end_stream());
    }
}

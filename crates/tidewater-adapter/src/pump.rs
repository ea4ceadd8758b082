//! Lazy body pump.
//!
//! Moves a [`LazyBody`] onto the blocking pool for each pull and hands it
//! back afterwards, so a slow producer never stalls the event loop. One
//! chunk is in flight at a time; the body is never collected.

use bytes::Bytes;
use tidewater_core::{Connection, LazyBody, OutboundEvent};
use tracing::{debug, warn};

use crate::error::{AdapterError, AdapterResult};

/// Pull one item from `body` on a worker thread.
async fn pull(mut body: LazyBody) -> AdapterResult<(LazyBody, Option<anyhow::Result<Bytes>>)> {
    tokio::task::spawn_blocking(move || {
        let next = body.next_chunk();
        (body, next)
    })
    .await
    .map_err(|e| AdapterError::Producer(anyhow::anyhow!("body producer panicked: {e}")))
}

/// Drop the producer on a worker thread. Producers may block in `Drop`
/// (closing files, joining helpers).
fn release(body: LazyBody) {
    drop(tokio::task::spawn_blocking(move || drop(body)));
}

/// Forward every chunk of `body` to `conn`, then emit `End`.
///
/// Empty chunks are skipped. Returns the number of body bytes sent.
/// Stops at the next chunk boundary once the receiving side is gone
/// ([`AdapterError::Cancelled`]). A producer error ends the stream
/// without `End` ([`AdapterError::Producer`]).
pub(crate) async fn stream_lazy(conn: &Connection, mut body: LazyBody) -> AdapterResult<u64> {
    let mut sent: u64 = 0;
    loop {
        if conn.is_closed() {
            debug!(sent, "client went away; stopping body producer");
            release(body);
            return Err(AdapterError::Cancelled);
        }

        let (returned, next) = pull(body).await?;
        body = returned;

        match next {
            None => break,
            Some(Ok(chunk)) if chunk.is_empty() => continue,
            Some(Ok(chunk)) => {
                let len = chunk.len() as u64;
                if conn.send(OutboundEvent::Body(chunk)).await.is_err() {
                    debug!(sent, "client went away; stopping body producer");
                    release(body);
                    return Err(AdapterError::Cancelled);
                }
                sent += len;
            }
            Some(Err(e)) => {
                warn!(sent, error = %e, "body producer failed; truncating response");
                release(body);
                return Err(AdapterError::Producer(e));
            }
        }
    }

    release(body);
    conn.send(OutboundEvent::End).await?;
    Ok(sent)
}

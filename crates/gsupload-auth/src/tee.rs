//! A byte stream that copies everything it yields into a capture writer.

use std::io::Write;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use futures::Stream;
use tracing::debug;

/// Wraps any fallible stream of byte chunks.
///
/// Each chunk is written to `capture` as it passes through and is then
/// yielded unchanged, so the downstream reader sees exactly the original
/// bytes.  Errors from the inner stream pass through without being
/// captured; errors writing to `capture` are logged and ignored.
pub struct Tee<S, W> {
    inner: S,
    capture: W,
}

impl<S, W> Tee<S, W> {
    pub fn new(inner: S, capture: W) -> Self {
        Self { inner, capture }
    }
}

impl<S, W, B, E> Stream for Tee<S, W>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    W: Write + Unpin,
{
    type Item = Result<B, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let item = ready!(Pin::new(&mut this.inner).poll_next(cx));
        if let Some(Ok(chunk)) = &item {
            if let Err(e) = this.capture.write_all(chunk.as_ref()) {
                debug!(error = %e, "tee capture write failed");
            }
        }
        Poll::Ready(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

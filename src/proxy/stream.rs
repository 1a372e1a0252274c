// Streaming pass-through with a completion hook: the byte stream is handed
// to the client untouched while a finalizer reports how much was emitted so
// accounting still runs after disconnects.

use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy)]
pub struct StreamStats {
    pub bytes: i64,
    /// False when the client vanished before the upstream finished.
    pub completed: bool,
}

pub fn completion_channel() -> (oneshot::Sender<StreamStats>, oneshot::Receiver<StreamStats>) {
    oneshot::channel()
}

/// Wraps an upstream byte stream, counting payload bytes and firing the
/// completion channel exactly once, on end-of-stream or on drop.
pub struct MeteredStream<S> {
    inner: S,
    bytes: i64,
    done: Option<oneshot::Sender<StreamStats>>,
}

impl<S> MeteredStream<S> {
    pub fn new(inner: S, done: oneshot::Sender<StreamStats>) -> Self {
        Self {
            inner,
            bytes: 0,
            done: Some(done),
        }
    }

    fn finish(&mut self, completed: bool) {
        if let Some(done) = self.done.take() {
            let _ = done.send(StreamStats {
                bytes: self.bytes,
                completed,
            });
        }
    }
}

impl<S> Stream for MeteredStream<S>
where
    S: Stream<Item = reqwest::Result<Bytes>> + Unpin,
{
    type Item = std::result::Result<Bytes, std::io::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.bytes += chunk.len() as i64;
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                // Partial stream: surface the break, then account what flowed.
                this.finish(false);
                Poll::Ready(Some(Err(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    e,
                ))))
            }
            Poll::Ready(None) => {
                this.finish(true);
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<S> Drop for MeteredStream<S> {
    fn drop(&mut self) {
        self.finish(false);
    }
}

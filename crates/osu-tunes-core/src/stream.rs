//! Cold, single-subscriber event streams backed by a producer task

use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

const CHANNEL_CAPACITY: usize = 32;

/// Sending half handed to a producer task
#[derive(Debug)]
pub struct EventSink<T> {
    tx: mpsc::Sender<T>,
}

impl<T> Clone for EventSink<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> EventSink<T> {
    /// Deliver an event. Returns `false` once the consumer has gone away.
    pub async fn emit(&self, event: T) -> bool {
        self.tx.send(event).await.is_ok()
    }

    /// True once the consumer dropped its stream
    pub fn is_cancelled(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Events of one pipeline run.
///
/// Every call that returns an `EventStream` starts a fresh producer; there is
/// no replay to late subscribers. Dropping the stream aborts the producer,
/// which releases whatever HTTP responses and files it holds.
#[derive(Debug)]
pub struct EventStream<T> {
    inner: ReceiverStream<T>,
    task: JoinHandle<()>,
}

impl<T: Send + 'static> EventStream<T> {
    /// Spawn `producer` on the runtime and stream what it emits
    pub fn spawn<F, Fut>(producer: F) -> Self
    where
        F: FnOnce(EventSink<T>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let task = tokio::spawn(producer(EventSink { tx }));
        Self {
            inner: ReceiverStream::new(rx),
            task,
        }
    }
}

// The stream never pins its fields in place.
impl<T> Unpin for EventStream<T> {}

impl<T> Stream for EventStream<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        Pin::new(&mut self.get_mut().inner).poll_next(cx)
    }
}

impl<T> Drop for EventStream<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

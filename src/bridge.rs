//! Async access to a [`BoundedBuffer`] from tokio tasks.
//!
//! The buffer blocks OS threads, so every operation here runs on tokio's
//! blocking pool via `spawn_blocking` and never stalls a runtime worker.
//! Threads and tasks can share the same buffer.

use futures::stream::{self, Stream};
use std::sync::Arc;
use std::time::Duration;

use crate::buffer::BoundedBuffer;
use crate::core::{Message, Result};

/// An async handle to a shared [`BoundedBuffer`].
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use handoff::bridge::AsyncBuffer;
/// use handoff::buffer::BoundedBuffer;
///
/// # tokio_test::block_on(async {
/// let buffer = AsyncBuffer::new(Arc::new(BoundedBuffer::new(4)?));
/// buffer.put("hello", None).await?;
/// assert_eq!(buffer.take(None).await?, "hello");
/// # Ok::<(), handoff::Error>(())
/// # }).unwrap();
/// ```
pub struct AsyncBuffer<T> {
    inner: Arc<BoundedBuffer<T>>,
}

impl<T> AsyncBuffer<T> {
    /// Wrap a shared buffer
    pub fn new(inner: Arc<BoundedBuffer<T>>) -> Self {
        Self { inner }
    }

    /// The underlying blocking buffer
    pub fn inner(&self) -> &Arc<BoundedBuffer<T>> {
        &self.inner
    }
}

impl<T: Send + 'static> AsyncBuffer<T> {
    /// Put `item`, waiting on the blocking pool while the buffer is full
    pub async fn put(&self, item: T, timeout: Option<Duration>) -> Result<()> {
        let buffer = self.inner.clone();
        tokio::task::spawn_blocking(move || buffer.put(item, timeout)).await?
    }

    /// Take the head item, waiting on the blocking pool while the buffer is empty
    pub async fn take(&self, timeout: Option<Duration>) -> Result<T> {
        let buffer = self.inner.clone();
        tokio::task::spawn_blocking(move || buffer.take(timeout)).await?
    }
}

impl<T: Send + 'static> AsyncBuffer<Message<T>> {
    /// Stream payloads until the first `Message::Shutdown`.
    ///
    /// The stream takes exactly one sentinel, so it plays the part of one
    /// consumer in a pipeline's shutdown count. If the blocking task fails
    /// the error is yielded as the last element, so a failure is never
    /// mistaken for a clean shutdown.
    pub fn into_stream(self) -> impl Stream<Item = Result<T>> + Send {
        stream::unfold(Some(self), |state| async move {
            let buffer = state?;
            match buffer.take(None).await {
                Ok(Message::Item(item)) => Some((Ok(item), Some(buffer))),
                Ok(Message::Shutdown) => None,
                Err(e) => {
                    tracing::error!(error = %e, "buffer stream stopped");
                    Some((Err(e), None))
                }
            }
        })
    }
}

impl<T> Clone for AsyncBuffer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

//! The producing stage: source → buffer.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::buffer::BoundedBuffer;
use crate::core::error::millis;
use crate::core::{Error, Message, Result, Source};
use crate::stages::{spawn_stage, ShutdownLatch, StageHandle, StageState, StateWatch};
use crate::util::RetryPolicy;

/// Summary of a producer that finished normally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerReport {
    /// Stage name
    pub name: String,
    /// Items put into the buffer, sentinels excluded
    pub produced: usize,
    /// Sentinels this producer delivered (non-zero only for the last one)
    pub sentinels: usize,
}

/// Pulls items from a [`Source`] and puts them into a shared buffer.
///
/// When the source is exhausted, or when a put fails, the producer signs off
/// on the run's [`ShutdownLatch`]. If it is the last producer to do so it
/// delivers one `Message::Shutdown` per consumer. The sign-off happens on
/// every exit path, a panicking source included, so consumers are never left
/// waiting on a dead producer.
pub struct Producer<S: Source> {
    name: String,
    source: Arc<S>,
    buffer: Arc<BoundedBuffer<Message<S::Item>>>,
    latch: Arc<ShutdownLatch>,
    put_timeout: Option<Duration>,
    retry: RetryPolicy,
    state: StateWatch,
}

impl<S: Source> Producer<S> {
    /// Create a new producer
    pub fn new(
        name: impl Into<String>,
        source: Arc<S>,
        buffer: Arc<BoundedBuffer<Message<S::Item>>>,
        latch: Arc<ShutdownLatch>,
    ) -> Self {
        Self {
            name: name.into(),
            source,
            buffer,
            latch,
            put_timeout: None,
            retry: RetryPolicy::none(),
            state: StateWatch::new(),
        }
    }

    /// Bound each put to `timeout`. `None` waits indefinitely.
    pub fn put_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.put_timeout = timeout;
        self
    }

    /// Retry timed-out puts according to `policy`
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// The stage name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A handle to observe this producer's state from another thread
    pub fn watch(&self) -> StateWatch {
        self.state.clone()
    }

    /// Run the producer on the current thread until it finishes.
    pub fn run(self) -> Result<ProducerReport> {
        let _span = tracing::info_span!("producer", unit = %self.name).entered();
        tracing::info!("producer starting");
        self.state.set(StageState::Running);

        let mut unwinding = ReleaseOnUnwind {
            producer: &self,
            armed: true,
        };
        let drained = self.drain();
        unwinding.armed = false;
        let released = self.release_consumers();

        let result = match (drained, released) {
            (Ok(produced), Ok(sentinels)) => Ok(ProducerReport {
                name: self.name.clone(),
                produced,
                sentinels,
            }),
            (Err(e), Ok(_)) | (Ok(_), Err(e)) => Err(e),
            (Err(drain_err), Err(release_err)) => Err(Error::Multiple(vec![drain_err, release_err])),
        };

        match &result {
            Ok(report) => {
                self.state.set(StageState::Finished);
                tracing::info!(produced = report.produced, "producer finished");
            }
            Err(e) => {
                self.state.set(StageState::Failed);
                tracing::error!(error = %e, "producer failed");
            }
        }
        result
    }

    /// Pull until the source is empty, putting every item into the buffer.
    fn drain(&self) -> Result<usize> {
        let mut produced = 0;
        loop {
            self.state.set(StageState::Pulling);
            let Some(item) = self.source.next_item() else {
                return Ok(produced);
            };

            self.state.set(StageState::Pushing);
            self.deliver(Message::Item(item))?;
            produced += 1;
            tracing::debug!(produced, "item produced");
        }
    }

    /// Sign off on the latch and deliver the sentinels if we were last.
    ///
    /// Sentinels skip the retry policy: they are re-offered for as long as a
    /// consumer is live to take them.
    fn release_consumers(&self) -> Result<usize> {
        self.state.set(StageState::Pushing);
        self.latch.release(&self.buffer, self.put_timeout)
    }

    fn deliver(&self, message: Message<S::Item>) -> Result<()> {
        let mut backoff = self.retry.backoff();
        let mut message = message;
        let mut attempt = 1;

        loop {
            match self.buffer.offer(message, self.put_timeout) {
                Ok(()) => return Ok(()),
                Err(rejected) => match backoff.next() {
                    Some(delay) => {
                        tracing::warn!(
                            attempt,
                            waited_ms = millis(rejected.waited()),
                            retry_in_ms = millis(delay),
                            "put timed out, retrying"
                        );
                        thread::sleep(delay);
                        message = rejected.into_inner();
                        attempt += 1;
                    }
                    None => {
                        tracing::warn!(attempt, "put timed out, giving up");
                        return Err(rejected.into_error());
                    }
                },
            }
        }
    }
}

/// Signs off for a producer whose source panicked mid-drain.
struct ReleaseOnUnwind<'a, S: Source> {
    producer: &'a Producer<S>,
    armed: bool,
}

impl<S: Source> Drop for ReleaseOnUnwind<'_, S> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        tracing::error!("producer unwinding, releasing consumers");
        if let Err(e) = self.producer.release_consumers() {
            tracing::error!(error = %e, "shutdown delivery failed while unwinding");
        }
    }
}

impl<S> Producer<S>
where
    S: Source + 'static,
{
    /// Run the producer on a new thread named after the stage.
    pub fn spawn(self) -> Result<StageHandle<ProducerReport>> {
        let name = self.name.clone();
        let state = self.state.clone();
        spawn_stage(name, state, move || self.run())
    }
}

//! The consuming stage: buffer → sink.

use std::sync::Arc;
use std::time::Duration;

use crate::buffer::BoundedBuffer;
use crate::core::{Message, Result, Sink};
use crate::stages::{spawn_stage, ShutdownLatch, StageHandle, StageState, StateWatch};

/// Summary of a consumer that received its sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerReport {
    /// Stage name
    pub name: String,
    /// Items stored into the sink, sentinel excluded
    pub consumed: usize,
}

/// Takes messages from a shared buffer and appends the items to a [`Sink`].
///
/// Only `Message::Shutdown` ends the loop. A take timeout is an error, not
/// a shutdown.
pub struct Consumer<D: Sink> {
    name: String,
    buffer: Arc<BoundedBuffer<Message<D::Item>>>,
    sink: Arc<D>,
    take_timeout: Option<Duration>,
    latch: Option<Arc<ShutdownLatch>>,
    state: StateWatch,
}

impl<D: Sink> Consumer<D> {
    /// Create a new consumer
    pub fn new(
        name: impl Into<String>,
        buffer: Arc<BoundedBuffer<Message<D::Item>>>,
        sink: Arc<D>,
    ) -> Self {
        Self {
            name: name.into(),
            buffer,
            sink,
            take_timeout: None,
            latch: None,
            state: StateWatch::new(),
        }
    }

    /// Bound each take to `timeout`. `None` waits indefinitely.
    pub fn take_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.take_timeout = timeout;
        self
    }

    /// Report to `latch` when this consumer stops, however it stops.
    ///
    /// The last producer then stops waiting to hand this consumer a
    /// sentinel once it is gone.
    pub fn attach(mut self, latch: Arc<ShutdownLatch>) -> Self {
        self.latch = Some(latch);
        self
    }

    /// The stage name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A handle to observe this consumer's state from another thread
    pub fn watch(&self) -> StateWatch {
        self.state.clone()
    }

    /// Run the consumer on the current thread until it sees its sentinel.
    pub fn run(self) -> Result<ConsumerReport> {
        let _span = tracing::info_span!("consumer", unit = %self.name).entered();
        tracing::info!("consumer starting");
        self.state.set(StageState::Running);
        let _departure = self.latch.clone().map(Departure);

        let mut consumed = 0;
        loop {
            self.state.set(StageState::Pulling);
            let message = match self.buffer.take(self.take_timeout) {
                Ok(message) => message,
                Err(e) => {
                    self.state.set(StageState::Failed);
                    tracing::error!(error = %e, consumed, "consumer failed");
                    return Err(e);
                }
            };

            match message {
                Message::Item(item) => {
                    self.state.set(StageState::Pushing);
                    self.sink.append(item);
                    consumed += 1;
                    tracing::debug!(consumed, "item consumed");
                }
                Message::Shutdown => {
                    tracing::info!("consumer received shutdown");
                    break;
                }
            }
        }

        self.state.set(StageState::Finished);
        tracing::info!(consumed, "consumer finished");
        Ok(ConsumerReport {
            name: self.name,
            consumed,
        })
    }
}

/// Tells the latch a consumer stopped, including by panic.
struct Departure(Arc<ShutdownLatch>);

impl Drop for Departure {
    fn drop(&mut self) {
        self.0.consumer_stopped();
    }
}

impl<D> Consumer<D>
where
    D: Sink + 'static,
{
    /// Run the consumer on a new thread named after the stage.
    pub fn spawn(self) -> Result<StageHandle<ConsumerReport>> {
        let name = self.name.clone();
        let state = self.state.clone();
        spawn_stage(name, state, move || self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Error;
    use crate::sinks::DestinationContainer;

    #[test]
    fn stores_items_until_sentinel() {
        let buffer = Arc::new(BoundedBuffer::new(8).unwrap());
        for message in [
            Message::Item("a"),
            Message::Item("b"),
            Message::Shutdown,
            Message::Item("left behind"),
        ] {
            buffer.put(message, None).unwrap();
        }
        let destination = Arc::new(DestinationContainer::new());

        let report = Consumer::new("c", buffer.clone(), destination.clone())
            .run()
            .unwrap();

        assert_eq!(report.consumed, 2);
        assert_eq!(destination.snapshot(), vec!["a", "b"]);
        // nothing past the sentinel is taken
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn take_timeout_is_an_error_not_a_shutdown() {
        let buffer = Arc::new(BoundedBuffer::<Message<u8>>::new(1).unwrap());
        let destination = Arc::new(DestinationContainer::new());

        let consumer = Consumer::new("c", buffer, destination)
            .take_timeout(Some(Duration::from_millis(20)));
        let watch = consumer.watch();

        let err = consumer.run().unwrap_err();
        assert!(err.is_timeout());
        assert!(matches!(err, Error::Timeout { .. }));
        assert_eq!(watch.get(), StageState::Failed);
    }

    struct RefusingSink;

    impl Sink for RefusingSink {
        type Item = u8;

        fn append(&self, item: u8) {
            panic!("refusing {item}");
        }
    }

    #[test]
    fn attached_consumer_reports_departure() {
        let latch = Arc::new(ShutdownLatch::new(1, 2).unwrap());
        let buffer = Arc::new(BoundedBuffer::<Message<u8>>::new(4).unwrap());
        buffer.put(Message::Shutdown, None).unwrap();
        buffer.put(Message::Item(1), None).unwrap();

        Consumer::new("c0", buffer.clone(), Arc::new(DestinationContainer::new()))
            .attach(latch.clone())
            .run()
            .unwrap();
        assert_eq!(latch.live_consumers(), 1);

        let err = Consumer::new("c1", buffer, Arc::new(RefusingSink))
            .attach(latch.clone())
            .spawn()
            .unwrap()
            .join()
            .unwrap_err();
        assert!(matches!(err, Error::Panicked { .. }));
        assert_eq!(latch.live_consumers(), 0);
    }

    #[test]
    fn spawned_consumer_joins_after_sentinel() {
        let buffer = Arc::new(BoundedBuffer::new(1).unwrap());
        let destination = Arc::new(DestinationContainer::new());

        let handle = Consumer::new("c-thread", buffer.clone(), destination.clone())
            .spawn()
            .unwrap();
        assert_eq!(handle.name(), "c-thread");

        buffer.put(Message::Item(5), None).unwrap();
        buffer.put(Message::Shutdown, None).unwrap();

        let report = handle.join().unwrap();
        assert_eq!(report.consumed, 1);
        assert_eq!(destination.snapshot(), vec![5]);
    }
}

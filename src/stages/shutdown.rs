//! Poison-pill fan-out.
//!
//! One [`ShutdownLatch`] is created per run and shared by every producer.
//! It counts the producers that are still running. The producer that signs
//! off last is told to deliver one `Message::Shutdown` per consumer, so no
//! consumer stops while another producer could still put items, and every
//! consumer sees exactly one sentinel.
//!
//! Consumers attached to the latch also report when they stop, which lets
//! the last producer tell a slow consumer from a missing one while it
//! delivers the sentinels.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::buffer::BoundedBuffer;
use crate::core::{Error, Message, Result};

/// How long one sentinel put waits before checking whether any consumer is
/// still around to make room.
const SENTINEL_ROUND: Duration = Duration::from_millis(50);

/// Countdown of live producers that releases the consumers' sentinels.
#[derive(Debug)]
pub struct ShutdownLatch {
    remaining: AtomicUsize,
    producers: usize,
    consumers: AtomicUsize,
    live_consumers: AtomicUsize,
}

impl ShutdownLatch {
    /// Create a latch for `producers` producers draining into `consumers`
    /// consumers. Both must be positive.
    pub fn new(producers: usize, consumers: usize) -> Result<Self> {
        if producers == 0 {
            return Err(Error::configuration("at least one producer is required"));
        }
        if consumers == 0 {
            return Err(Error::configuration("at least one consumer is required"));
        }

        Ok(Self {
            remaining: AtomicUsize::new(producers),
            producers,
            consumers: AtomicUsize::new(consumers),
            live_consumers: AtomicUsize::new(consumers),
        })
    }

    /// Record that one producer has stopped.
    ///
    /// Returns how many sentinels the caller must now deliver: the number of
    /// consumers for the last producer, zero for everyone else. Calls beyond
    /// the producer count are ignored.
    pub fn sign_off(&self) -> usize {
        let previous = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));

        match previous {
            Ok(1) => self.consumers.load(Ordering::Acquire),
            _ => 0,
        }
    }

    /// Sign off and, if this was the last producer, put one sentinel per
    /// consumer into `buffer`.
    ///
    /// Each sentinel put waits `round` (or a short default) at a time and is
    /// retried for as long as an attached consumer is still live, so a slow
    /// consumer is waited for and a missing one is not. Returns the number of
    /// sentinels delivered.
    pub fn release<T>(
        &self,
        buffer: &BoundedBuffer<Message<T>>,
        round: Option<Duration>,
    ) -> Result<usize> {
        let sentinels = self.sign_off();
        let round = round.unwrap_or(SENTINEL_ROUND);

        for _ in 0..sentinels {
            let mut message = Message::Shutdown;
            loop {
                match buffer.offer(message, Some(round)) {
                    Ok(()) => break,
                    Err(rejected) if self.live_consumers() == 0 => {
                        tracing::warn!("no consumer left to take the shutdown sentinel");
                        return Err(rejected.into_error());
                    }
                    Err(rejected) => {
                        tracing::debug!(
                            live_consumers = self.live_consumers(),
                            "buffer still full, waiting to deliver shutdown"
                        );
                        message = rejected.into_inner();
                    }
                }
            }
        }

        if sentinels > 0 {
            tracing::info!(sentinels, "last producer delivered shutdown");
        }
        Ok(sentinels)
    }

    /// Producers that have not signed off yet
    pub fn remaining_producers(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    /// Number of producers the latch was created for
    pub fn producers(&self) -> usize {
        self.producers
    }

    /// Number of sentinels the last producer delivers
    pub fn consumers(&self) -> usize {
        self.consumers.load(Ordering::Acquire)
    }

    /// Record that an attached consumer has stopped, for whatever reason.
    pub fn consumer_stopped(&self) {
        let _ = self
            .live_consumers
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    /// Drop a consumer that never started: it needs no sentinel and will
    /// never take one. Must be called before any producer signs off.
    pub fn retire_consumer(&self) {
        let _ = self
            .consumers
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        self.consumer_stopped();
    }

    /// Consumers that may still take from the buffer
    pub fn live_consumers(&self) -> usize {
        self.live_consumers.load(Ordering::Acquire)
    }
}

//! The bounded blocking buffer at the center of every pipeline.
//!
//! A [`BoundedBuffer`] is a fixed-capacity FIFO guarded by one mutex and two
//! condition variables bound to it:
//!
//! - `not_full` is waited on by `put` while the buffer holds `capacity`
//!   items and is signalled by every successful `take`.
//! - `not_empty` is waited on by `take` while the buffer is empty and is
//!   signalled by every successful `put`.
//!
//! Every wait sits inside a loop that re-checks its predicate, so spurious
//! wake-ups and lost races to another thread only cause another wait.
//! Timeouts are turned into a single deadline per call; a waiter whose
//! deadline passed but whose predicate now holds still completes.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use crate::core::{Error, Operation, Result};

/// A fixed-capacity, thread-safe FIFO with blocking `put` and `take`.
///
/// Share it between threads with an `Arc`.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use std::thread;
/// use handoff::buffer::BoundedBuffer;
///
/// let buffer = Arc::new(BoundedBuffer::new(2)?);
///
/// let tx = buffer.clone();
/// let producer = thread::spawn(move || {
///     for i in 0..5 {
///         tx.put(i, None).unwrap();
///     }
/// });
///
/// let received: Vec<_> = (0..5).map(|_| buffer.take(None).unwrap()).collect();
/// producer.join().unwrap();
/// assert_eq!(received, vec![0, 1, 2, 3, 4]);
/// # Ok::<(), handoff::Error>(())
/// ```
pub struct BoundedBuffer<T> {
    capacity: usize,
    queue: Mutex<VecDeque<T>>,
    not_full: Condvar,
    not_empty: Condvar,
}

/// An item handed back by [`BoundedBuffer::offer`] because no slot opened
/// up before the deadline.
#[derive(Debug)]
pub struct Rejected<T> {
    item: T,
    waited: Duration,
}

impl<T> Rejected<T> {
    /// Recover the item that was not inserted
    pub fn into_inner(self) -> T {
        self.item
    }

    /// How long the caller was blocked before giving up
    pub fn waited(&self) -> Duration {
        self.waited
    }

    /// Drop the item and turn the rejection into a put timeout error
    pub fn into_error(self) -> Error {
        Error::timeout(Operation::Put, self.waited)
    }
}

impl<T> BoundedBuffer<T> {
    /// Create a buffer that holds at most `capacity` items.
    ///
    /// A capacity of zero is a configuration error.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::configuration("buffer capacity must be positive"));
        }

        Ok(Self {
            capacity,
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        })
    }

    /// Insert `item` at the tail, blocking while the buffer is full.
    ///
    /// With `timeout = None` this waits indefinitely. If the timeout elapses
    /// first the item is dropped and `Error::Timeout` is returned; the
    /// buffer is left exactly as it was. Use [`offer`](Self::offer) to get
    /// the item back instead.
    pub fn put(&self, item: T, timeout: Option<Duration>) -> Result<()> {
        self.offer(item, timeout).map_err(Rejected::into_error)
    }

    /// Like [`put`](Self::put), but hands the item back on timeout.
    pub fn offer(&self, item: T, timeout: Option<Duration>) -> std::result::Result<(), Rejected<T>> {
        let started = Instant::now();
        let deadline = timeout.and_then(|t| started.checked_add(t));

        let mut queue = self.queue.lock();
        while queue.len() >= self.capacity {
            match deadline {
                None => self.not_full.wait(&mut queue),
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        drop(queue);
                        #[cfg(feature = "metrics")]
                        crate::metrics::record_timeout(Operation::Put);
                        tracing::trace!(capacity = self.capacity, "put timed out on full buffer");
                        return Err(Rejected {
                            item,
                            waited: started.elapsed(),
                        });
                    }
                    self.not_full.wait_until(&mut queue, deadline);
                }
            }
        }

        queue.push_back(item);
        self.not_empty.notify_one();

        #[cfg(feature = "metrics")]
        crate::metrics::record_transfer(Operation::Put, queue.len());

        Ok(())
    }

    /// Remove and return the head item, blocking while the buffer is empty.
    ///
    /// With `timeout = None` this waits indefinitely. If the timeout elapses
    /// first `Error::Timeout` is returned and the buffer is unchanged.
    pub fn take(&self, timeout: Option<Duration>) -> Result<T> {
        let started = Instant::now();
        let deadline = timeout.and_then(|t| started.checked_add(t));

        let mut queue = self.queue.lock();
        loop {
            if let Some(item) = queue.pop_front() {
                self.not_full.notify_one();

                #[cfg(feature = "metrics")]
                crate::metrics::record_transfer(Operation::Take, queue.len());

                return Ok(item);
            }

            match deadline {
                None => self.not_empty.wait(&mut queue),
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        drop(queue);
                        #[cfg(feature = "metrics")]
                        crate::metrics::record_timeout(Operation::Take);
                        tracing::trace!(capacity = self.capacity, "take timed out on empty buffer");
                        return Err(Error::timeout(Operation::Take, started.elapsed()));
                    }
                    self.not_empty.wait_until(&mut queue, deadline);
                }
            }
        }
    }

    /// Insert without blocking; hands the item back if the buffer is full.
    pub fn try_put(&self, item: T) -> std::result::Result<(), T> {
        self.offer(item, Some(Duration::ZERO))
            .map_err(Rejected::into_inner)
    }

    /// Remove the head item without blocking.
    pub fn try_take(&self) -> Option<T> {
        self.take(Some(Duration::ZERO)).ok()
    }

    /// The fixed capacity chosen at construction
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current occupancy
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Whether the buffer currently holds no items
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Whether the buffer currently holds `capacity` items
    pub fn is_full(&self) -> bool {
        self.queue.lock().len() >= self.capacity
    }
}

impl<T> fmt::Debug for BoundedBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedBuffer")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn zero_capacity_is_rejected() {
        let err = BoundedBuffer::<i32>::new(0).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn put_then_take_single_item() {
        let buffer = BoundedBuffer::new(1).unwrap();
        buffer.put(42, None).unwrap();
        assert_eq!(buffer.take(None).unwrap(), 42);
        assert!(buffer.is_empty());
    }

    #[test]
    fn preserves_fifo_order() {
        let buffer = BoundedBuffer::new(5).unwrap();
        for i in 1..=5 {
            buffer.put(i, None).unwrap();
        }
        assert!(buffer.is_full());

        let taken: Vec<_> = (0..5).map(|_| buffer.take(None).unwrap()).collect();
        assert_eq!(taken, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn try_variants_do_not_block() {
        let buffer = BoundedBuffer::new(1).unwrap();
        assert_eq!(buffer.try_take(), None);
        assert_eq!(buffer.try_put("a"), Ok(()));
        assert_eq!(buffer.try_put("b"), Err("b"));
        assert_eq!(buffer.try_take(), Some("a"));
    }

    #[test]
    fn offer_hands_item_back_on_timeout() {
        let buffer = BoundedBuffer::new(1).unwrap();
        buffer.put(String::from("first"), None).unwrap();

        let rejected = buffer
            .offer(String::from("second"), Some(Duration::from_millis(20)))
            .unwrap_err();
        assert!(rejected.waited() >= Duration::from_millis(20));
        assert_eq!(rejected.into_inner(), "second");
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn take_timeout_leaves_buffer_unchanged() {
        let buffer = BoundedBuffer::<u8>::new(3).unwrap();
        let started = Instant::now();

        let err = buffer.take(Some(Duration::from_millis(200))).unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(
            err,
            Error::Timeout {
                operation: Operation::Take,
                ..
            }
        ));
        assert!(elapsed >= Duration::from_millis(180));
        assert!(elapsed < Duration::from_millis(1000));
        assert!(buffer.is_empty());
    }

    #[test]
    fn blocked_take_wakes_on_put() {
        let buffer = Arc::new(BoundedBuffer::new(5).unwrap());
        let done = Arc::new(AtomicBool::new(false));

        let handle = {
            let buffer = buffer.clone();
            let done = done.clone();
            thread::spawn(move || {
                let item = buffer.take(None).unwrap();
                done.store(true, Ordering::SeqCst);
                item
            })
        };

        thread::sleep(Duration::from_millis(100));
        assert!(!done.load(Ordering::SeqCst), "take should block on empty buffer");

        buffer.put(99, None).unwrap();
        assert_eq!(handle.join().unwrap(), 99);
    }

    #[test]
    fn blocked_put_wakes_on_take() {
        let buffer = Arc::new(BoundedBuffer::new(1).unwrap());
        buffer.put(1, None).unwrap();
        let done = Arc::new(AtomicBool::new(false));

        let handle = {
            let buffer = buffer.clone();
            let done = done.clone();
            thread::spawn(move || {
                buffer.put(2, None).unwrap();
                done.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(100));
        assert!(!done.load(Ordering::SeqCst), "put should block on full buffer");

        assert_eq!(buffer.take(None).unwrap(), 1);
        handle.join().unwrap();
        assert_eq!(buffer.take(None).unwrap(), 2);
    }

    #[test]
    fn timed_waiter_succeeds_when_space_frees_before_deadline() {
        let buffer = Arc::new(BoundedBuffer::new(1).unwrap());
        buffer.put(1, None).unwrap();

        let handle = {
            let buffer = buffer.clone();
            thread::spawn(move || buffer.put(2, Some(Duration::from_secs(5))))
        };

        thread::sleep(Duration::from_millis(50));
        buffer.take(None).unwrap();
        handle.join().unwrap().unwrap();
        assert_eq!(buffer.take(None).unwrap(), 2);
    }

    #[test]
    fn occupancy_never_exceeds_capacity() {
        const CAPACITY: usize = 3;
        let buffer = Arc::new(BoundedBuffer::new(CAPACITY).unwrap());
        let max_seen = Arc::new(AtomicUsize::new(0));

        let producers: Vec<_> = (0..2)
            .map(|_| {
                let buffer = buffer.clone();
                let max_seen = max_seen.clone();
                thread::spawn(move || {
                    for i in 0..2_000 {
                        buffer.put(i, None).unwrap();
                        max_seen.fetch_max(buffer.len(), Ordering::SeqCst);
                    }
                })
            })
            .collect();

        let consumers: Vec<_> = (0..2)
            .map(|_| {
                let buffer = buffer.clone();
                thread::spawn(move || {
                    for _ in 0..2_000 {
                        buffer.take(None).unwrap();
                    }
                })
            })
            .collect();

        for handle in producers.into_iter().chain(consumers) {
            handle.join().unwrap();
        }

        assert!(max_seen.load(Ordering::SeqCst) <= CAPACITY);
        assert!(buffer.is_empty());
    }
}

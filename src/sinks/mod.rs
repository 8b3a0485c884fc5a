//! Sink implementations for the handoff library.
//!
//! Sinks are appended to concurrently by any number of consumers.

use parking_lot::Mutex;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::core::Sink;

/// An append-only collection of consumed items.
///
/// Items are never removed or reordered once appended. Read the result
/// with [`snapshot`](Self::snapshot) after every consumer has been joined.
pub struct DestinationContainer<T> {
    items: Mutex<Vec<T>>,
}

impl<T> DestinationContainer<T> {
    /// Create an empty destination
    pub fn new() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
        }
    }

    /// Append one item at the end
    pub fn append(&self, item: T) {
        self.items.lock().push(item);
    }

    /// Number of items appended so far
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Whether nothing has been appended yet
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Take ownership of the collected items
    pub fn into_items(self) -> Vec<T> {
        self.items.into_inner()
    }
}

impl<T: Clone> DestinationContainer<T> {
    /// A consistent copy of everything appended so far
    pub fn snapshot(&self) -> Vec<T> {
        self.items.lock().clone()
    }
}

impl<T> Default for DestinationContainer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> Sink for DestinationContainer<T> {
    type Item = T;

    fn append(&self, item: Self::Item) {
        DestinationContainer::append(self, item)
    }
}

/// A sink that only counts items
pub struct CountSink<T> {
    count: AtomicUsize,
    _phantom: PhantomData<fn(T)>,
}

impl<T> CountSink<T> {
    /// Create a new count sink
    pub fn new() -> Self {
        Self {
            count: AtomicUsize::new(0),
            _phantom: PhantomData,
        }
    }

    /// Get the current count
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }
}

impl<T> Default for CountSink<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> Sink for CountSink<T> {
    type Item = T;

    fn append(&self, _item: Self::Item) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }
}

//! Core traits for the source/sink system.
//!
//! Sources and sinks are shared between threads, so every method takes
//! `&self` and implementations carry their own locking. A source hands out
//! each item to exactly one caller; a sink accepts items from any number of
//! callers.

/// A thread-safe supplier of items.
///
/// # Examples
///
/// ```rust
/// use std::sync::atomic::{AtomicU64, Ordering};
/// use handoff::core::Source;
///
/// struct CounterSource {
///     next: AtomicU64,
///     max: u64,
/// }
///
/// impl Source for CounterSource {
///     type Item = u64;
///
///     fn next_item(&self) -> Option<Self::Item> {
///         let n = self.next.fetch_add(1, Ordering::SeqCst);
///         (n <= self.max).then_some(n)
///     }
/// }
///
/// let source = CounterSource { next: AtomicU64::new(1), max: 2 };
/// assert_eq!(source.next_item(), Some(1));
/// assert_eq!(source.next_item(), Some(2));
/// assert_eq!(source.next_item(), None);
/// ```
pub trait Source: Send + Sync {
    /// The type of items this source supplies
    type Item: Send + 'static;

    /// Hand out the next item, or `None` once the source is exhausted.
    ///
    /// Exhaustion is permanent: after the first `None` every later call
    /// must also return `None`.
    fn next_item(&self) -> Option<Self::Item>;
}

/// A thread-safe, append-only destination for items.
pub trait Sink: Send + Sync {
    /// The type of items this sink accepts
    type Item: Send + 'static;

    /// Store one item.
    fn append(&self, item: Self::Item);
}

/// What actually travels through a buffer shared by producers and consumers.
///
/// `Shutdown` is the poison pill. Because it is a separate variant it can
/// never be confused with a real payload, whatever `T` is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message<T> {
    /// A real payload
    Item(T),
    /// No more items will be produced for the receiving consumer
    Shutdown,
}

impl<T> Message<T> {
    /// Whether this is the shutdown sentinel
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Message::Shutdown)
    }

    /// The payload, if any
    pub fn into_item(self) -> Option<T> {
        match self {
            Message::Item(item) => Some(item),
            Message::Shutdown => None,
        }
    }
}

impl<T> From<T> for Message<T> {
    fn from(item: T) -> Self {
        Message::Item(item)
    }
}

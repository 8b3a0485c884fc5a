//! Source implementations for the handoff library.
//!
//! Sources are pulled concurrently by any number of producers. Each keeps
//! its read position behind its own lock, held only long enough to hand
//! out one item.

use parking_lot::Mutex;

use crate::core::Source;

/// A fixed list of items handed out in order, each exactly once.
///
/// Exhaustion is reported as `None` from [`next_item`](Self::next_item)
/// rather than as an error.
pub struct SourceContainer<T> {
    items: Vec<T>,
    cursor: Mutex<usize>,
}

impl<T: Clone> SourceContainer<T> {
    /// Create a source over `items`
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            cursor: Mutex::new(0),
        }
    }

    /// Hand out the item under the cursor and advance it
    pub fn next_item(&self) -> Option<T> {
        let mut cursor = self.cursor.lock();
        let item = self.items.get(*cursor)?.clone();
        *cursor += 1;
        Some(item)
    }
}

impl<T> SourceContainer<T> {
    /// Total number of items, handed out or not
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the source was created empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of items not yet handed out
    pub fn remaining(&self) -> usize {
        self.items.len() - *self.cursor.lock()
    }

    /// Whether every item has been handed out
    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }
}

impl<T> From<Vec<T>> for SourceContainer<T>
where
    T: Clone,
{
    fn from(items: Vec<T>) -> Self {
        Self::new(items)
    }
}

impl<T: Clone + Send + Sync + 'static> Source for SourceContainer<T> {
    type Item = T;

    fn next_item(&self) -> Option<Self::Item> {
        SourceContainer::next_item(self)
    }
}

/// A source that drains any iterator, one item per call.
///
/// Useful for ranges and generated input that should not be collected
/// up front.
pub struct IterSource<I> {
    iter: Mutex<Option<I>>,
}

impl<I: Iterator> IterSource<I> {
    /// Create a source from anything iterable
    pub fn new<T>(iter: T) -> Self
    where
        T: IntoIterator<IntoIter = I>,
    {
        Self {
            iter: Mutex::new(Some(iter.into_iter())),
        }
    }
}

impl<I> Source for IterSource<I>
where
    I: Iterator + Send,
    I::Item: Send + 'static,
{
    type Item = I::Item;

    fn next_item(&self) -> Option<Self::Item> {
        let mut guard = self.iter.lock();
        let item = guard.as_mut()?.next();
        if item.is_none() {
            // fuse so exhaustion is permanent
            *guard = None;
        }
        item
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn hands_out_items_in_order() {
        let source = SourceContainer::new(vec![1, 2, 3]);
        assert_eq!(source.next_item(), Some(1));
        assert_eq!(source.next_item(), Some(2));
        assert_eq!(source.remaining(), 1);
        assert_eq!(source.next_item(), Some(3));
        assert_eq!(source.next_item(), None);
        assert_eq!(source.next_item(), None);
        assert!(source.is_exhausted());
        assert_eq!(source.len(), 3);
    }

    #[test]
    fn concurrent_readers_get_each_item_once() {
        let items: Vec<u32> = (0..1_000).collect();
        let source = Arc::new(SourceContainer::new(items.clone()));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let source = source.clone();
                thread::spawn(move || {
                    let mut seen = Vec::new();
                    while let Some(item) = source.next_item() {
                        seen.push(item);
                    }
                    seen
                })
            })
            .collect();

        let mut all: Vec<u32> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        assert_eq!(all, items);
    }

    #[test]
    fn iter_source_is_fused() {
        let source = IterSource::new(0..2);
        assert_eq!(Source::next_item(&source), Some(0));
        assert_eq!(Source::next_item(&source), Some(1));
        assert_eq!(Source::next_item(&source), None);
        assert_eq!(Source::next_item(&source), None);
    }
}

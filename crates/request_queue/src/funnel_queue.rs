//! crates/request_queue/src/funnel_queue.rs
//! Lock-free multi-producer queue drained by a single consumer.

use crossbeam_queue::SegQueue;

/// Unbounded lock-free FIFO; any thread may [`put`](Self::put), one thread
/// drains it with [`poll`](Self::poll).
#[derive(Debug)]
pub struct FunnelQueue<T> {
    entries: SegQueue<T>,
}

impl<T> FunnelQueue<T> {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: SegQueue::new(),
        }
    }

    /// Appends `entry`.
    pub fn put(&self, entry: T) {
        self.entries.push(entry);
    }

    /// Removes the oldest entry, if any.
    pub fn poll(&self) -> Option<T> {
        self.entries.pop()
    }

    /// Reports whether the queue currently looks empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Approximate number of queued entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<T> Default for FunnelQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn fifo_order_for_one_producer() {
        let queue = FunnelQueue::new();
        for i in 0..5 {
            queue.put(i);
        }
        assert_eq!(queue.len(), 5);
        let drained: Vec<_> = std::iter::from_fn(|| queue.poll()).collect();
        assert_eq!(drained, [0, 1, 2, 3, 4]);
        assert!(queue.is_empty());
    }

    #[test]
    fn many_producers_lose_nothing() {
        let queue = Arc::new(FunnelQueue::new());
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..1000 {
                        queue.put(p * 1000 + i);
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        let mut drained: Vec<_> = std::iter::from_fn(|| queue.poll()).collect();
        drained.sort_unstable();
        assert_eq!(drained, (0..4000).collect::<Vec<_>>());
    }
}

//! Bounded priority queue (spec §4.5 "Priority queue").

use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Notify;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Normal = 0,
    High = 1,
    Critical = 2,
}

struct Entry<T> {
    priority: Priority,
    created_at: Instant,
    seq: u64,
    payload: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.created_at == other.created_at && self.seq == other.seq
    }
}
impl<T> Eq for Entry<T> {}

impl<T> Ord for Entry<T> {
    /// Higher priority first; within the same priority, earlier
    /// `created_at` first (FIFO). `BinaryHeap` is a max-heap, so "comes
    /// first" means "compares greater".
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.created_at.cmp(&self.created_at))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}
impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A binary heap ordered by `(priority_level, created_at)`
/// (spec §4.5). Capacity-bounded: enqueue on a full queue returns
/// `false` and increments `dropped`.
pub struct PriorityQueue<T> {
    heap: Mutex<BinaryHeap<Entry<T>>>,
    capacity: usize,
    dropped: AtomicU64,
    next_seq: AtomicU64,
    notify: Notify,
    closed: AtomicBool,
}

impl<T> PriorityQueue<T> {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            heap: Mutex::new(BinaryHeap::new()),
            capacity,
            dropped: AtomicU64::new(0),
            next_seq: AtomicU64::new(0),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        })
    }

    pub fn enqueue(&self, priority: Priority, payload: T) -> bool {
        let mut heap = self.heap.lock();
        if heap.len() >= self.capacity {
            self.dropped.fetch_add(1, AtomicOrdering::Relaxed);
            return false;
        }
        let seq = self.next_seq.fetch_add(1, AtomicOrdering::Relaxed);
        heap.push(Entry { priority, created_at: Instant::now(), seq, payload });
        drop(heap);
        self.notify.notify_one();
        true
    }

    /// Blocks until an item is available or the queue is closed.
    pub async fn dequeue(&self) -> Option<T> {
        loop {
            {
                let mut heap = self.heap.lock();
                if let Some(entry) = heap.pop() {
                    return Some(entry.payload);
                }
                if self.closed.load(AtomicOrdering::Acquire) {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    pub fn close(&self) {
        self.closed.store(true, AtomicOrdering::Release);
        self.notify.notify_waiters();
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(AtomicOrdering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn higher_priority_dequeues_first() {
        let q: Arc<PriorityQueue<&str>> = PriorityQueue::new(10);
        q.enqueue(Priority::Normal, "normal");
        q.enqueue(Priority::Critical, "critical");
        q.enqueue(Priority::High, "high");

        assert_eq!(q.dequeue().await, Some("critical"));
        assert_eq!(q.dequeue().await, Some("high"));
        assert_eq!(q.dequeue().await, Some("normal"));
    }

    #[tokio::test]
    async fn same_priority_is_fifo() {
        let q: Arc<PriorityQueue<u32>> = PriorityQueue::new(10);
        q.enqueue(Priority::Normal, 1);
        q.enqueue(Priority::Normal, 2);
        q.enqueue(Priority::Normal, 3);
        assert_eq!(q.dequeue().await, Some(1));
        assert_eq!(q.dequeue().await, Some(2));
        assert_eq!(q.dequeue().await, Some(3));
    }

    #[tokio::test]
    async fn capacity_plus_one_is_dropped() {
        let q: Arc<PriorityQueue<u32>> = PriorityQueue::new(2);
        assert!(q.enqueue(Priority::Normal, 1));
        assert!(q.enqueue(Priority::Normal, 2));
        assert!(!q.enqueue(Priority::Normal, 3));
        assert_eq!(q.dropped(), 1);
    }

    #[tokio::test]
    async fn close_unblocks_dequeue() {
        let q: Arc<PriorityQueue<u32>> = PriorityQueue::new(2);
        let q2 = q.clone();
        let handle = tokio::spawn(async move { q2.dequeue().await });
        tokio::task::yield_now().await;
        q.close();
        assert_eq!(handle.await.unwrap(), None);
    }
}

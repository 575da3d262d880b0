//! Thread-safe bag of pending work.
//!
//! Consumers only ever see [`WorkQueue::try_dequeue`], a single
//! check-and-remove under one lock. There is deliberately no blocking
//! `dequeue`: a worker that finds the queue empty is done, because nothing is
//! enqueued once the drain phase starts.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rowtally_core::types::WorkItem;

#[derive(Debug)]
pub struct WorkQueue<T = WorkItem> {
    items: Mutex<VecDeque<T>>,
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
        }
    }
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    // A panicking holder cannot leave the deque half-updated, so a poisoned
    // lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn enqueue(&self, item: T) {
        self.lock().push_back(item);
    }

    /// Remove and return one item, or `None` if the queue is empty.
    pub fn try_dequeue(&self) -> Option<T> {
        self.lock().pop_front()
    }

    /// Remove everything still queued.
    pub fn drain_all(&self) -> Vec<T> {
        self.lock().drain(..).collect()
    }

    /// Advisory only: may be stale by the time the caller acts on it.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Advisory only; never gate a read on this.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl<T> FromIterator<T> for WorkQueue<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            items: Mutex::new(iter.into_iter().collect()),
        }
    }
}

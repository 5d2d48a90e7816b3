//! Bounded batch feed from the tracking loop to consumers.
//!
//! The producer never blocks: when the queue is full the oldest batch is
//! discarded and counted. Consumers either poll with [`BatchQueue::try_recv`]
//! or await [`BatchQueue::recv`].

use crate::types::DetectionBatch;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Notify;

pub struct BatchQueue {
    capacity: usize,
    queue: Mutex<VecDeque<DetectionBatch>>,
    notify: Notify,
    dropped: AtomicU64,
}

impl BatchQueue {
    /// `capacity` is clamped to at least one batch.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue a batch, evicting the oldest one if full.
    /// Returns `true` when an older batch was dropped.
    pub fn push(&self, batch: DetectionBatch) -> bool {
        let evicted = {
            let mut q = self.queue.lock();
            let evicted = if q.len() >= self.capacity {
                q.pop_front();
                true
            } else {
                false
            };
            q.push_back(batch);
            evicted
        };
        if evicted {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.notify.notify_one();
        evicted
    }

    pub fn try_recv(&self) -> Option<DetectionBatch> {
        self.queue.lock().pop_front()
    }

    /// Wait for the next batch.
    pub async fn recv(&self) -> DetectionBatch {
        loop {
            let notified = self.notify.notified();
            if let Some(batch) = self.try_recv() {
                return batch;
            }
            notified.await;
        }
    }

    /// Remove and return every queued batch, oldest first.
    pub fn drain(&self) -> Vec<DetectionBatch> {
        self.queue.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Total batches discarded because no consumer kept up.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

//! Ingestion queue: ordered buffer of committed balance-change events
//! between the fast path and the batch persistence worker.
//!
//! Bounded by design. A full queue rejects the fast-path call *before* any
//! balance mutation, so backpressure surfaces as a retry-safe error instead
//! of unbounded memory growth.

use crossbeam_queue::ArrayQueue;

use crate::errors::WalletError;
use crate::events::LedgerEvent;

pub struct IngestionQueue {
    inner: ArrayQueue<LedgerEvent>,
}

impl IngestionQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: ArrayQueue::new(capacity),
        }
    }

    pub fn push(&self, event: LedgerEvent) -> Result<(), WalletError> {
        self.inner.push(event).map_err(|_| WalletError::QueueFull)
    }

    /// Non-blocking: pops up to `max` events, preserving enqueue order.
    pub fn pop_batch(&self, max: usize) -> Vec<LedgerEvent> {
        let mut batch = Vec::with_capacity(max.min(self.inner.len()));
        while batch.len() < max {
            match self.inner.pop() {
                Some(event) => batch.push(event),
                None => break,
            }
        }
        batch
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

//! History Batch Buffer: secondary, loss-tolerant audit trail.
//!
//! Rows accumulate in memory and flush on whichever comes first: the size
//! threshold or the flush interval. A failed flush is logged and the batch
//! discarded - the primary ledger stays authoritative and this flow is
//! rebuildable from it, so bounding memory wins over retrying forever.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::WalletConfig;
use crate::events::HistoryRow;
use crate::store::AccountStore;

pub struct HistoryBuffer {
    store: Arc<dyn AccountStore>,
    buffer: Mutex<Vec<HistoryRow>>,
    batch_size: usize,
    flush_interval: Duration,
}

impl HistoryBuffer {
    pub fn new(store: Arc<dyn AccountStore>, config: &WalletConfig) -> Self {
        Self {
            store,
            buffer: Mutex::new(Vec::new()),
            batch_size: config.history_batch_size,
            flush_interval: Duration::from_millis(config.history_flush_ms),
        }
    }

    /// Fire-and-forget append; flushes inline when the size threshold hits.
    pub async fn push(&self, row: HistoryRow) {
        let should_flush = {
            let mut buffer = self.buffer.lock().unwrap();
            buffer.push(row);
            buffer.len() >= self.batch_size
        };
        if should_flush {
            self.flush().await;
        }
    }

    pub async fn push_all(&self, rows: Vec<HistoryRow>) {
        let should_flush = {
            let mut buffer = self.buffer.lock().unwrap();
            buffer.extend(rows);
            buffer.len() >= self.batch_size
        };
        if should_flush {
            self.flush().await;
        }
    }

    pub async fn flush(&self) {
        let chunk: Vec<HistoryRow> = {
            let mut buffer = self.buffer.lock().unwrap();
            std::mem::take(&mut *buffer)
        };
        if chunk.is_empty() {
            return;
        }

        match self.store.insert_history_rows(&chunk).await {
            Ok(()) => debug!(rows = chunk.len(), "history batch flushed"),
            // Recoverable from the primary ledger; drop rather than grow.
            Err(e) => warn!(rows = chunk.len(), error = %e, "history flush failed, batch dropped"),
        }
    }

    pub fn pending(&self) -> usize {
        self.buffer.lock().unwrap().len()
    }

    /// Interval-driven flush loop; spawn once at startup.
    pub async fn run_flusher(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.flush_interval);
        loop {
            ticker.tick().await;
            self.flush().await;
        }
    }
}

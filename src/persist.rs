//! Batch Persistence Worker.
//!
//! Long-lived background loop draining the ingestion queue into the durable
//! store: pop up to N events, drop the ones already carrying a durable dedup
//! marker (crash replays), aggregate the rest into per-user net deltas, then
//! commit the balance adjustments, ledger rows, and dedup markers in one
//! durable transaction.
//!
//! Failure policy: a failed durable write keeps the popped batch in-worker and
//! retries it on the next cycle. Events are never logged-and-dropped here; a
//! crash delays persistence but cannot corrupt it, because the cache stays the
//! authority for current balance and replays are filtered by the markers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::{error, warn};

use crate::config::WalletConfig;
use crate::errors::WalletError;
use crate::events::{LedgerEvent, LedgerRow};
use crate::ingest::IngestionQueue;
use crate::store::AccountStore;

pub struct BatchPersistWorker {
    queue: Arc<IngestionQueue>,
    store: Arc<dyn AccountStore>,
    batch_size: usize,
    empty_sleep: Duration,
    /// Popped but not yet durably flushed. Retained across failed cycles.
    pending: Vec<LedgerEvent>,
}

impl BatchPersistWorker {
    pub fn new(
        queue: Arc<IngestionQueue>,
        store: Arc<dyn AccountStore>,
        config: &WalletConfig,
    ) -> Self {
        Self {
            queue,
            store,
            batch_size: config.persist_batch_size,
            empty_sleep: Duration::from_millis(config.persist_empty_sleep_ms),
            pending: Vec::new(),
        }
    }

    pub async fn run(mut self) {
        loop {
            let started = std::time::Instant::now();
            match self.drain_once().await {
                Ok(0) => tokio::time::sleep(self.empty_sleep).await,
                Ok(flushed) => {
                    let elapsed = started.elapsed();
                    if elapsed > Duration::from_secs(1) {
                        warn!(flushed, ?elapsed, "slow persistence batch");
                    }
                    // A partial batch means the queue is drained; breathe.
                    if flushed < self.batch_size {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                    }
                }
                Err(e) => {
                    error!(error = %e, retained = self.pending.len(), "persistence cycle failed, batch retained");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    /// One drain cycle. Returns the number of events flushed (0 when idle).
    /// On error the popped events stay in `pending` for the next cycle.
    pub async fn drain_once(&mut self) -> Result<usize, WalletError> {
        if self.pending.is_empty() {
            self.pending = self.queue.pop_batch(self.batch_size);
        }
        if self.pending.is_empty() {
            return Ok(0);
        }

        // Durable dedup: a worker restart replays popped-but-unflushed events;
        // anything already marked is dropped here.
        let ids: Vec<String> = self
            .pending
            .iter()
            .map(|e| e.transaction_id.clone())
            .collect();
        let fresh_flags = self.store.filter_unprocessed(&ids).await?;

        let mut deltas: HashMap<String, Decimal> = HashMap::new();
        let mut rows: Vec<LedgerRow> = Vec::new();
        let mut fresh_ids: Vec<String> = Vec::new();

        for (event, fresh) in self.pending.iter().zip(fresh_flags) {
            if !fresh {
                continue;
            }
            *deltas.entry(event.username.clone()).or_insert(Decimal::ZERO) += event.net();
            rows.push(LedgerRow::from_event(event));
            fresh_ids.push(event.transaction_id.clone());
        }

        if fresh_ids.is_empty() {
            self.pending.clear();
            return Ok(0);
        }

        // One durable transaction for the whole flush. The batch is replayed
        // from the top on failure, so a partially committed flush would
        // double-apply deltas on retry.
        let deltas: Vec<(String, Decimal)> = deltas.into_iter().collect();
        self.store.persist_batch(&deltas, &rows, &fresh_ids).await?;

        let flushed = fresh_ids.len();
        self.pending.clear();
        Ok(flushed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::store::{Account, AccountStatus, MemStore};

    fn event(id: &str, username: &str, bet: i64, payout: i64) -> LedgerEvent {
        LedgerEvent {
            kind: if payout > 0 {
                EventKind::Settle
            } else {
                EventKind::Bet
            },
            transaction_id: id.into(),
            round_id: "r-1".into(),
            user_id: format!("id-{}", username),
            agent_id: "agent-1".into(),
            username: username.into(),
            bet_amount: Decimal::from(bet),
            payout_amount: Decimal::from(payout),
            balance_before: Decimal::ZERO,
            balance_after: Decimal::from(payout - bet),
            product_id: "p-1".into(),
            game_code: "g-1".into(),
            game_name: String::new(),
            timestamp_millis: 1_700_000_000_000,
        }
    }

    async fn fixture(balance: i64) -> (Arc<IngestionQueue>, Arc<MemStore>, BatchPersistWorker) {
        let queue = Arc::new(IngestionQueue::new(128));
        let store = Arc::new(MemStore::new(60));
        store
            .upsert_account(Account {
                id: "id-demo1".into(),
                username: "demo1".into(),
                balance: Decimal::from(balance),
                agent_id: "agent-1".into(),
                status: AccountStatus::Active,
            })
            .await
            .unwrap();
        let worker = BatchPersistWorker::new(
            queue.clone(),
            store.clone() as Arc<dyn AccountStore>,
            &WalletConfig::default(),
        );
        (queue, store, worker)
    }

    #[tokio::test]
    async fn test_aggregates_per_user_and_marks_processed() {
        let (queue, store, mut worker) = fixture(100).await;
        queue.push(event("tx-1", "demo1", 20, 0)).unwrap();
        queue.push(event("tx-2", "demo1", 0, 50)).unwrap();

        let flushed = worker.drain_once().await.unwrap();
        assert_eq!(flushed, 2);

        let account = store.find_by_username("demo1").await.unwrap().unwrap();
        assert_eq!(account.balance, Decimal::from(130));
        assert_eq!(store.ledger_rows().len(), 2);
        assert_eq!(
            store.filter_unprocessed(&["tx-1".into()]).await.unwrap(),
            vec![false]
        );
    }

    #[tokio::test]
    async fn test_replayed_events_are_filtered() {
        let (queue, store, mut worker) = fixture(100).await;
        queue.push(event("tx-1", "demo1", 20, 0)).unwrap();
        worker.drain_once().await.unwrap();

        // Simulate a crash replay: the same event is popped again.
        queue.push(event("tx-1", "demo1", 20, 0)).unwrap();
        let flushed = worker.drain_once().await.unwrap();
        assert_eq!(flushed, 0);

        let account = store.find_by_username("demo1").await.unwrap().unwrap();
        assert_eq!(account.balance, Decimal::from(80)); // applied exactly once
        assert_eq!(store.ledger_rows().len(), 1);
    }

    /// Delegates to a MemStore but rejects the first N flush attempts, to
    /// drive the worker's retry path with a store that fails atomically.
    struct FlakyStore {
        inner: Arc<MemStore>,
        fail_remaining: std::sync::atomic::AtomicU32,
        flush_calls: std::sync::atomic::AtomicU32,
    }

    #[async_trait::async_trait]
    impl AccountStore for FlakyStore {
        async fn find_by_username(
            &self,
            username: &str,
        ) -> Result<Option<Account>, WalletError> {
            self.inner.find_by_username(username).await
        }

        async fn upsert_account(&self, account: Account) -> Result<(), WalletError> {
            self.inner.upsert_account(account).await
        }

        async fn persist_batch(
            &self,
            deltas: &[(String, Decimal)],
            rows: &[crate::events::LedgerRow],
            transaction_ids: &[String],
        ) -> Result<(), WalletError> {
            use std::sync::atomic::Ordering;
            self.flush_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_remaining.load(Ordering::SeqCst) > 0 {
                self.fail_remaining.fetch_sub(1, Ordering::SeqCst);
                return Err(WalletError::Internal("flush rejected".into()));
            }
            self.inner.persist_batch(deltas, rows, transaction_ids).await
        }

        async fn filter_unprocessed(
            &self,
            transaction_ids: &[String],
        ) -> Result<Vec<bool>, WalletError> {
            self.inner.filter_unprocessed(transaction_ids).await
        }

        async fn has_ledger_row(
            &self,
            transaction_id: &str,
            kind: crate::events::LedgerKind,
        ) -> Result<bool, WalletError> {
            self.inner.has_ledger_row(transaction_id, kind).await
        }

        async fn apply_resolution(
            &self,
            username: &str,
            delta: Decimal,
            rows: &[crate::events::LedgerRow],
        ) -> Result<Decimal, WalletError> {
            self.inner.apply_resolution(username, delta, rows).await
        }

        async fn insert_history_rows(
            &self,
            rows: &[crate::events::HistoryRow],
        ) -> Result<(), WalletError> {
            self.inner.insert_history_rows(rows).await
        }
    }

    #[tokio::test]
    async fn test_flush_failure_then_retry_applies_deltas_once() {
        // The whole flush is one store call; a failed cycle must leave the
        // durable balance untouched and the retry must apply each event's
        // delta exactly once.
        let queue = Arc::new(IngestionQueue::new(128));
        let mem = Arc::new(MemStore::new(60));
        mem.upsert_account(Account {
            id: "id-demo1".into(),
            username: "demo1".into(),
            balance: Decimal::from(100),
            agent_id: "agent-1".into(),
            status: AccountStatus::Active,
        })
        .await
        .unwrap();
        let store = Arc::new(FlakyStore {
            inner: mem.clone(),
            fail_remaining: std::sync::atomic::AtomicU32::new(1),
            flush_calls: std::sync::atomic::AtomicU32::new(0),
        });
        let mut worker = BatchPersistWorker::new(
            queue.clone(),
            store.clone() as Arc<dyn AccountStore>,
            &WalletConfig::default(),
        );

        queue.push(event("tx-1", "demo1", 20, 0)).unwrap();
        assert!(worker.drain_once().await.is_err());
        let account = mem.find_by_username("demo1").await.unwrap().unwrap();
        assert_eq!(account.balance, Decimal::from(100)); // nothing landed

        let flushed = worker.drain_once().await.unwrap();
        assert_eq!(flushed, 1);
        let account = mem.find_by_username("demo1").await.unwrap().unwrap();
        assert_eq!(account.balance, Decimal::from(80)); // applied exactly once
        assert_eq!(mem.ledger_rows().len(), 1);
        assert_eq!(
            store
                .flush_calls
                .load(std::sync::atomic::Ordering::SeqCst),
            2
        ); // one call per cycle, no per-step store calls to land partially
    }

    #[tokio::test]
    async fn test_failed_write_retains_batch_for_retry() {
        let (queue, store, mut worker) = fixture(100).await;
        queue.push(event("tx-1", "demo1", 20, 0)).unwrap();

        store.set_fail_writes(true);
        assert!(worker.drain_once().await.is_err());
        // Nothing marked processed, nothing lost.
        assert_eq!(
            store.filter_unprocessed(&["tx-1".into()]).await.unwrap(),
            vec![true]
        );

        store.set_fail_writes(false);
        let flushed = worker.drain_once().await.unwrap();
        assert_eq!(flushed, 1);
        let account = store.find_by_username("demo1").await.unwrap().unwrap();
        assert_eq!(account.balance, Decimal::from(80));
    }
}

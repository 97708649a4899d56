//! In-memory store: simulation mode (no PostgreSQL configured) and tests.
//!
//! Mirrors the durable contract exactly, including the long-TTL dedup tier,
//! so the pipeline behaves identically against either backend. `fail_writes`
//! lets tests exercise the persistence worker's retry-on-failure policy.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use cached::{Cached, TimedCache};
use rust_decimal::Decimal;

use super::{Account, AccountStore};
use crate::core_types::TransactionId;
use crate::errors::WalletError;
use crate::events::{HistoryRow, LedgerKind, LedgerRow};

pub struct MemStore {
    accounts: Mutex<HashMap<String, Account>>,
    ledger: Mutex<Vec<LedgerRow>>,
    history: Mutex<Vec<HistoryRow>>,
    processed: Mutex<TimedCache<TransactionId, ()>>,
    fail_writes: AtomicBool,
}

impl MemStore {
    pub fn new(durable_dedup_ttl_secs: u64) -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            ledger: Mutex::new(Vec::new()),
            history: Mutex::new(Vec::new()),
            processed: Mutex::new(TimedCache::with_lifespan(durable_dedup_ttl_secs)),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make every durable write fail until cleared. Test hook for the
    /// worker's must-retry failure policy.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), WalletError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(WalletError::Internal("simulated write failure".into()));
        }
        Ok(())
    }

    /// Snapshot of all ledger rows, in insertion order.
    pub fn ledger_rows(&self) -> Vec<LedgerRow> {
        self.ledger.lock().unwrap().clone()
    }

    pub fn history_rows(&self) -> Vec<HistoryRow> {
        self.history.lock().unwrap().clone()
    }
}

#[async_trait]
impl AccountStore for MemStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, WalletError> {
        Ok(self.accounts.lock().unwrap().get(username).cloned())
    }

    async fn upsert_account(&self, account: Account) -> Result<(), WalletError> {
        self.accounts
            .lock()
            .unwrap()
            .insert(account.username.clone(), account);
        Ok(())
    }

    async fn persist_batch(
        &self,
        deltas: &[(String, Decimal)],
        rows: &[LedgerRow],
        transaction_ids: &[TransactionId],
    ) -> Result<(), WalletError> {
        // All-or-nothing, mirroring the single database transaction the
        // Postgres store uses.
        self.check_writable()?;
        {
            let mut accounts = self.accounts.lock().unwrap();
            for (username, delta) in deltas {
                if let Some(account) = accounts.get_mut(username) {
                    account.balance += *delta;
                }
            }
        }
        self.ledger.lock().unwrap().extend_from_slice(rows);
        let mut processed = self.processed.lock().unwrap();
        for id in transaction_ids {
            processed.cache_set(id.clone(), ());
        }
        Ok(())
    }

    async fn filter_unprocessed(
        &self,
        transaction_ids: &[TransactionId],
    ) -> Result<Vec<bool>, WalletError> {
        let mut processed = self.processed.lock().unwrap();
        Ok(transaction_ids
            .iter()
            .map(|id| processed.cache_get(id).is_none())
            .collect())
    }

    async fn has_ledger_row(
        &self,
        transaction_id: &str,
        kind: LedgerKind,
    ) -> Result<bool, WalletError> {
        Ok(self
            .ledger
            .lock()
            .unwrap()
            .iter()
            .any(|row| row.transaction_id == transaction_id && row.kind == kind))
    }

    async fn apply_resolution(
        &self,
        username: &str,
        delta: Decimal,
        rows: &[LedgerRow],
    ) -> Result<Decimal, WalletError> {
        self.check_writable()?;
        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts
            .get_mut(username)
            .ok_or_else(|| WalletError::AccountNotFound(username.to_string()))?;
        account.balance += delta;
        let balance = account.balance;
        drop(accounts);
        self.ledger.lock().unwrap().extend_from_slice(rows);
        Ok(balance)
    }

    async fn insert_history_rows(&self, rows: &[HistoryRow]) -> Result<(), WalletError> {
        self.check_writable()?;
        self.history.lock().unwrap().extend_from_slice(rows);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::AccountStatus;

    fn account(username: &str, balance: i64) -> Account {
        Account {
            id: format!("id-{}", username),
            username: username.to_string(),
            balance: Decimal::from(balance),
            agent_id: "agent-1".into(),
            status: AccountStatus::Active,
        }
    }

    #[tokio::test]
    async fn test_persist_batch_adjusts_and_marks() {
        let store = MemStore::new(60);
        store.upsert_account(account("demo1", 100)).await.unwrap();

        store
            .persist_batch(&[("demo1".into(), Decimal::from(-30))], &[], &["tx-1".into()])
            .await
            .unwrap();

        let found = store.find_by_username("demo1").await.unwrap().unwrap();
        assert_eq!(found.balance, Decimal::from(70));

        let flags = store
            .filter_unprocessed(&["tx-1".into(), "tx-2".into()])
            .await
            .unwrap();
        assert_eq!(flags, vec![false, true]);
    }

    #[tokio::test]
    async fn test_failed_persist_batch_leaves_no_trace() {
        let store = MemStore::new(60);
        store.upsert_account(account("demo1", 100)).await.unwrap();
        store.set_fail_writes(true);

        assert!(store
            .persist_batch(
                &[("demo1".into(), Decimal::ONE)],
                &[],
                &["tx-1".into()]
            )
            .await
            .is_err());

        // Nothing committed: balance, markers, ledger all untouched.
        let found = store.find_by_username("demo1").await.unwrap().unwrap();
        assert_eq!(found.balance, Decimal::from(100));
        assert_eq!(
            store.filter_unprocessed(&["tx-1".into()]).await.unwrap(),
            vec![true]
        );
        assert!(store.ledger_rows().is_empty());

        store.set_fail_writes(false);
        assert!(store
            .persist_batch(&[("demo1".into(), Decimal::ONE)], &[], &["tx-1".into()])
            .await
            .is_ok());
    }
}

//! Balance Cache + Fast-Path Executor.
//!
//! The cache is the read-of-record for "current" balance: one entry per
//! canonical username, created lazily on first hydrate, overwritten on every
//! mutation and on explicit resync (block/unblock, cancel, rollback). The
//! durable store converges within one persistence-worker flush cycle and must
//! never silently overwrite an entry outside of resync.
//!
//! ALL fast-path mutations go through [`FastPathExecutor::execute`] - the
//! single `compareAndApply(key, fn)` call site. The per-username critical
//! section is the dashmap entry guard held across dedup-check, funds-check,
//! event enqueue, mutation, and dedup marking. There is no suspension point
//! inside the guard.
//!
//! Lock order: entry guard, then dedup tier. No path acquires an entry guard
//! while holding the dedup lock.

use std::sync::{Arc, Mutex};

use cached::{Cached, TimedCache};
use dashmap::DashMap;
use rust_decimal::Decimal;

use crate::core_types::{AccountId, AgentId, TransactionId};
use crate::errors::WalletError;
use crate::events::{EventKind, LedgerEvent};
use crate::game_catalog::GameCatalog;
use crate::ingest::IngestionQueue;

/// Cached view of one account. Identity fields ride along so the fast path
/// can stamp ledger events without a store round trip.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub balance: Decimal,
    pub account_id: AccountId,
    pub agent_id: AgentId,
}

pub struct BalanceCache {
    entries: DashMap<String, CacheEntry>,
    /// Fast-path dedup tier (~10 min TTL). Stores the recorded balance_after
    /// so provider retries get the original result back.
    dedup: Mutex<TimedCache<TransactionId, Decimal>>,
}

impl BalanceCache {
    pub fn new(fast_dedup_ttl_secs: u64) -> Self {
        Self {
            entries: DashMap::new(),
            dedup: Mutex::new(TimedCache::with_lifespan(fast_dedup_ttl_secs)),
        }
    }

    /// Current cached balance, if the entry exists.
    pub fn balance(&self, username: &str) -> Option<Decimal> {
        self.entries.get(username).map(|e| e.balance)
    }

    pub fn entry(&self, username: &str) -> Option<CacheEntry> {
        self.entries.get(username).map(|e| e.clone())
    }

    /// Lazy creation on first touch. A concurrent mutation wins: if the entry
    /// already exists the hydrate is a no-op.
    pub fn hydrate(&self, username: &str, entry: CacheEntry) {
        self.entries.entry(username.to_string()).or_insert(entry);
    }

    /// Explicit resync: overwrite the cached balance from the durable store.
    /// Only the resync operations (block/unblock, cancel, rollback) call this.
    pub fn resync(&self, username: &str, entry: CacheEntry) {
        self.entries.insert(username.to_string(), entry);
    }

    /// Balance recorded for an already-processed transaction, if still in TTL.
    pub fn recorded_balance(&self, transaction_id: &str) -> Option<Decimal> {
        let mut dedup = self.dedup.lock().unwrap();
        dedup.cache_get(&transaction_id.to_string()).copied()
    }

    fn mark_processed(&self, transaction_id: &str, balance_after: Decimal) {
        let mut dedup = self.dedup.lock().unwrap();
        dedup.cache_set(transaction_id.to_string(), balance_after);
    }
}

/// Everything the executor needs to stamp a [`LedgerEvent`] besides the
/// balances it captures itself. Amounts are the *effective* amounts: the net
/// delta applied is always `payout_amount - bet_amount`.
#[derive(Debug, Clone)]
pub struct EventDraft {
    pub kind: EventKind,
    pub round_id: String,
    pub bet_amount: Decimal,
    pub payout_amount: Decimal,
    pub product_id: String,
    pub game_code: String,
    pub timestamp_millis: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FastPathOutcome {
    /// Mutation committed and event enqueued.
    Applied {
        balance_before: Decimal,
        balance_after: Decimal,
    },
    /// Transaction id already processed - idempotent success, prior result.
    Duplicate { balance: Decimal },
    /// No cache entry. Caller hydrates from the store and retries exactly
    /// once; dedup has NOT been marked.
    CacheMiss,
    /// Debit would overdraw. Terminal, no mutation, no event.
    InsufficientFunds { balance: Decimal },
}

pub struct FastPathExecutor {
    cache: Arc<BalanceCache>,
    catalog: Arc<GameCatalog>,
    queue: Arc<IngestionQueue>,
}

impl FastPathExecutor {
    pub fn new(
        cache: Arc<BalanceCache>,
        catalog: Arc<GameCatalog>,
        queue: Arc<IngestionQueue>,
    ) -> Self {
        Self {
            cache,
            catalog,
            queue,
        }
    }

    /// Atomic dedup-check + funds-check + mutation + event-enqueue.
    ///
    /// The applied delta is `draft.payout_amount - draft.bet_amount`.
    /// A full ingestion queue aborts BEFORE the mutation, so `QueueFull`
    /// is retry safe.
    pub fn execute(
        &self,
        username: &str,
        transaction_id: &str,
        draft: EventDraft,
    ) -> Result<FastPathOutcome, WalletError> {
        // 1. Dedup pre-check outside the entry guard: duplicates of evicted
        // or unknown users still short-circuit here.
        if let Some(balance) = self.cache.recorded_balance(transaction_id) {
            return Ok(FastPathOutcome::Duplicate { balance });
        }

        // 2. Per-username critical section.
        let Some(mut entry) = self.cache.entries.get_mut(username) else {
            return Ok(FastPathOutcome::CacheMiss);
        };

        // Re-check dedup now that we are serialized: an identical concurrent
        // call may have committed between step 1 and the guard acquisition.
        if let Some(balance) = self.cache.recorded_balance(transaction_id) {
            return Ok(FastPathOutcome::Duplicate { balance });
        }

        let net = draft.payout_amount - draft.bet_amount;

        // 3. Debits must not overdraw.
        if net < Decimal::ZERO && entry.balance < -net {
            return Ok(FastPathOutcome::InsufficientFunds {
                balance: entry.balance,
            });
        }

        let balance_before = entry.balance;
        let balance_after = balance_before + net;

        // 4/5. Stamp the event and enqueue it before mutating: if the queue
        // is full the balance is untouched and dedup unmarked.
        let game_name = self.catalog.resolve(&draft.product_id, &draft.game_code);
        let event = LedgerEvent {
            kind: draft.kind,
            transaction_id: transaction_id.to_string(),
            round_id: draft.round_id,
            user_id: entry.account_id.clone(),
            agent_id: entry.agent_id.clone(),
            username: username.to_string(),
            bet_amount: draft.bet_amount,
            payout_amount: draft.payout_amount,
            balance_before,
            balance_after,
            product_id: draft.product_id,
            game_code: draft.game_code,
            game_name,
            timestamp_millis: draft.timestamp_millis,
        };
        self.queue.push(event)?;

        // 6. Commit: mutate and mark processed.
        entry.balance = balance_after;
        self.cache.mark_processed(transaction_id, balance_after);

        Ok(FastPathOutcome::Applied {
            balance_before,
            balance_after,
        })
    }
}

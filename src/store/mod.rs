//! Durable Account Store collaborators.
//!
//! The store owns accounts and the durable side of the pipeline: bulk balance
//! adjustments and ledger rows from the persistence worker, the long-TTL dedup
//! tier, single-transaction application for the queued resolution operations,
//! and the loss-tolerant history rows.

mod memory;
mod postgres;

pub use memory::MemStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core_types::{AccountId, AgentId, TransactionId};
use crate::errors::WalletError;
use crate::events::{HistoryRow, LedgerKind, LedgerRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountStatus {
    Active,
    Blocked,
}

/// Durable account record. `username` is stored in canonical (lowercased) form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub username: String,
    pub balance: Decimal,
    pub agent_id: AgentId,
    pub status: AccountStatus,
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, WalletError>;

    /// Insert or replace an account. Used by seeding and admin resync paths.
    async fn upsert_account(&self, account: Account) -> Result<(), WalletError>;

    /// Flush one persistence-worker batch in ONE durable transaction:
    /// aggregated per-user balance deltas, the ledger rows, and the dedup
    /// markers (TTL ~24h, store-level configuration) commit or fail together.
    /// A partial flush must be impossible: the worker replays the whole batch
    /// on failure, so any sub-step landing alone would double-apply deltas.
    async fn persist_batch(
        &self,
        deltas: &[(String, Decimal)],
        rows: &[LedgerRow],
        transaction_ids: &[TransactionId],
    ) -> Result<(), WalletError>;

    /// Durable dedup existence check, batched. Returns one flag per input id,
    /// `true` when the id has NOT been durably processed yet.
    async fn filter_unprocessed(
        &self,
        transaction_ids: &[TransactionId],
    ) -> Result<Vec<bool>, WalletError>;

    /// Per-transaction + operation-type idempotency marker for the queued
    /// resolution path: has a ledger row of this kind already been written?
    async fn has_ledger_row(
        &self,
        transaction_id: &str,
        kind: LedgerKind,
    ) -> Result<bool, WalletError>;

    /// Apply a resolution adjustment and its ledger rows within ONE durable
    /// transaction. Returns the new durable balance.
    async fn apply_resolution(
        &self,
        username: &str,
        delta: Decimal,
        rows: &[LedgerRow],
    ) -> Result<Decimal, WalletError>;

    /// Secondary audit flow. Callers may drop the batch on failure.
    async fn insert_history_rows(&self, rows: &[HistoryRow]) -> Result<(), WalletError>;
}

//! Immutable settlement records flowing between pipeline stages.
//!
//! A [`LedgerEvent`] is created exactly once by the fast path, carried through
//! the ingestion queue, and consumed exactly once by the persistence worker.
//! [`LedgerRow`] is its durable form (also written directly by the queued
//! resolution path); [`HistoryRow`] feeds the loss-tolerant audit buffer.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core_types::{AccountId, AgentId, TransactionId};

/// Balance-affecting operation class on the fast path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Bet,
    Settle,
}

/// Durable ledger row class. Supersets [`EventKind`] with the
/// durably-confirmed reversal operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerKind {
    Bet,
    Settle,
    Cancel,
    Rollback,
    Void,
}

impl From<EventKind> for LedgerKind {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Bet => LedgerKind::Bet,
            EventKind::Settle => LedgerKind::Settle,
        }
    }
}

impl LedgerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerKind::Bet => "BET",
            LedgerKind::Settle => "SETTLE",
            LedgerKind::Cancel => "CANCEL",
            LedgerKind::Rollback => "ROLLBACK",
            LedgerKind::Void => "VOID",
        }
    }
}

/// Committed balance-change event awaiting durable persistence.
///
/// Invariant: `balance_after - balance_before` equals the net delta
/// (`payout_amount - bet_amount`) applied to the cache at mutation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub kind: EventKind,
    pub transaction_id: TransactionId,
    pub round_id: String,
    pub user_id: AccountId,
    pub agent_id: AgentId,
    pub username: String,
    pub bet_amount: Decimal,
    pub payout_amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub product_id: String,
    pub game_code: String,
    pub game_name: String,
    pub timestamp_millis: i64,
}

impl LedgerEvent {
    /// Net delta applied to the balance when this event was committed.
    #[inline]
    pub fn net(&self) -> Decimal {
        self.payout_amount - self.bet_amount
    }
}

/// Durable ledger row (game-detail flow, the authoritative audit trail).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerRow {
    pub user_id: AccountId,
    pub username: String,
    pub agent_id: AgentId,
    pub product_id: String,
    pub game_code: String,
    pub game_name: String,
    pub kind: LedgerKind,
    pub bet_amount: Decimal,
    pub payout_amount: Decimal,
    pub net_amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub transaction_id: TransactionId,
    pub round_id: String,
    pub status: String,
    pub transaction_time: DateTime<Utc>,
}

impl LedgerRow {
    /// Durable form of a committed fast-path event.
    pub fn from_event(event: &LedgerEvent) -> Self {
        Self {
            user_id: event.user_id.clone(),
            username: event.username.clone(),
            agent_id: event.agent_id.clone(),
            product_id: event.product_id.clone(),
            game_code: event.game_code.clone(),
            game_name: event.game_name.clone(),
            kind: event.kind.into(),
            bet_amount: event.bet_amount,
            payout_amount: event.payout_amount,
            net_amount: event.net(),
            balance_before: event.balance_before,
            balance_after: event.balance_after,
            transaction_id: event.transaction_id.clone(),
            round_id: event.round_id.clone(),
            status: "SUCCESS".to_string(),
            transaction_time: DateTime::from_timestamp_millis(event.timestamp_millis)
                .unwrap_or_else(Utc::now),
        }
    }
}

/// Secondary audit row (balance flow). Loss-tolerant: recoverable from the
/// primary ledger, so a failed flush drops the batch instead of retrying.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRow {
    pub user_id: AccountId,
    pub agent_id: AgentId,
    pub amount: Decimal,
    pub before_amount: Decimal,
    pub after_amount: Decimal,
    pub kind: LedgerKind,
    pub round_id: String,
    pub date: DateTime<Utc>,
}

//! Core type aliases shared across the wallet engine.
//!
//! Account ids are opaque strings owned by the durable store; transaction ids
//! are supplied by the game provider and are the dedup key everywhere.

use rust_decimal::Decimal;

/// Durable account id (store-owned, opaque).
pub type AccountId = String;

/// Agent (upline) id.
pub type AgentId = String;

/// Provider-supplied transaction id - the exactly-once key.
pub type TransactionId = String;

/// Fixed-point money amount.
pub type Amount = Decimal;

/// Canonical username form used for every cache key and shard assignment.
#[inline]
pub fn canonical_username(username: &str) -> String {
    username.to_lowercase()
}

/// Current wall-clock time in milliseconds since the epoch.
#[inline]
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

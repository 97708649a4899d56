//! Provider wire protocol: request/response shapes and the status taxonomy.
//!
//! Providers POST JSON with camelCase field names. Every request carries the
//! provider call id, the product, the player username, and a `txns` array of
//! operation-specific sub-transactions; the call id is the idempotency key for
//! the whole call.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const STATUS_SUCCESS: u32 = 0;
pub const STATUS_ACCOUNT_NOT_FOUND: u32 = 10_001;
pub const STATUS_INSUFFICIENT_FUNDS: u32 = 10_002;
pub const STATUS_INTERNAL_ERROR: u32 = 50_001;

/// Common envelope for every seamless operation. `T` is the per-operation
/// sub-transaction shape.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderRequest<T> {
    pub id: String,
    pub product_id: String,
    pub username: String,
    #[serde(default)]
    pub currency: Option<String>,
    pub timestamp_millis: i64,
    #[serde(default = "Vec::new")]
    pub txns: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetTxn {
    pub id: String,
    pub round_id: String,
    #[serde(default)]
    pub game_code: Option<String>,
    pub bet_amount: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleTxn {
    pub id: String,
    pub round_id: String,
    #[serde(default)]
    pub game_code: Option<String>,
    #[serde(default)]
    pub bet_amount: Decimal,
    pub payout_amount: Decimal,
    /// When set, the provider settles bet and payout in one call and the bet
    /// amount is debited alongside the payout credit.
    #[serde(default)]
    pub is_single_state: Option<bool>,
    #[serde(default)]
    pub is_end_round: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WinRewardTxn {
    pub id: String,
    pub round_id: String,
    #[serde(default)]
    pub game_code: Option<String>,
    pub payout_amount: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelTxn {
    pub id: String,
    pub round_id: String,
    #[serde(default)]
    pub game_code: Option<String>,
    pub bet_amount: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackTxn {
    pub id: String,
    pub round_id: String,
    /// State of the transaction being rolled back: `SETTLED` or `REFUND`.
    pub status: String,
    #[serde(default)]
    pub bet_amount: Decimal,
    #[serde(default)]
    pub payout_amount: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoidSettleTxn {
    pub id: String,
    pub round_id: String,
    #[serde(default)]
    pub bet_amount: Decimal,
    #[serde(default)]
    pub payout_amount: Decimal,
}

/// Manual operator correction; `status` selects the direction.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustBalanceTxn {
    pub ref_id: String,
    pub status: AdjustDirection,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AdjustDirection {
    Debit,
    Credit,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckBalanceRequest {
    pub id: String,
    pub product_id: String,
    pub username: String,
    #[serde(default)]
    pub currency: Option<String>,
    pub timestamp_millis: i64,
    #[serde(default)]
    pub game_code: Option<String>,
    #[serde(default)]
    pub session_token: Option<String>,
}

/// Uniform response envelope. Balance fields are present only when the
/// operation resolved them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletResponse {
    pub id: String,
    pub status_code: u32,
    pub timestamp_millis: i64,
    pub product_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance_before: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance_after: Option<Decimal>,
}

impl WalletResponse {
    pub fn new(id: &str, product_id: &str, status_code: u32) -> Self {
        Self {
            id: id.to_string(),
            status_code,
            timestamp_millis: crate::core_types::now_millis(),
            product_id: product_id.to_string(),
            currency: None,
            username: None,
            balance: None,
            balance_before: None,
            balance_after: None,
        }
    }

    pub fn with_currency(mut self, currency: Option<String>) -> Self {
        self.currency = currency;
        self
    }

    pub fn with_username(mut self, username: &str) -> Self {
        self.username = Some(username.to_string());
        self
    }

    pub fn with_balance(mut self, balance: Decimal) -> Self {
        self.balance = Some(balance);
        self
    }

    pub fn with_balances(mut self, before: Decimal, after: Decimal) -> Self {
        self.balance_before = Some(before);
        self.balance_after = Some(after);
        self.balance = Some(after);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settle_request_parses_camel_case() {
        let raw = r#"{
            "id": "call-1",
            "productId": "p-1",
            "username": "Demo1",
            "currency": "USD",
            "timestampMillis": 1700000000000,
            "txns": [
                {"id": "tx-1", "roundId": "r-1", "betAmount": 30, "payoutAmount": 20, "isSingleState": true}
            ]
        }"#;
        let req: ProviderRequest<SettleTxn> = serde_json::from_str(raw).unwrap();
        assert_eq!(req.username, "Demo1");
        assert_eq!(req.txns.len(), 1);
        assert_eq!(req.txns[0].is_single_state, Some(true));
        assert_eq!(req.txns[0].payout_amount, Decimal::from(20));
    }

    #[test]
    fn test_adjust_direction_uppercase() {
        let txn: AdjustBalanceTxn =
            serde_json::from_str(r#"{"refId": "adj-1", "status": "DEBIT", "amount": 5}"#).unwrap();
        assert_eq!(txn.status, AdjustDirection::Debit);
    }

    #[test]
    fn test_response_omits_absent_balances() {
        let resp = WalletResponse::new("call-1", "p-1", STATUS_ACCOUNT_NOT_FOUND);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["statusCode"], 10_001);
        assert!(json.get("balanceAfter").is_none());
        assert!(json.get("balance").is_none());
    }

    #[test]
    fn test_response_with_balances_serializes_all_fields() {
        let resp = WalletResponse::new("call-1", "p-1", STATUS_SUCCESS)
            .with_username("demo1")
            .with_balances(Decimal::from(100), Decimal::from(80));
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["balanceBefore"], serde_json::json!(100.0));
        assert_eq!(json["balanceAfter"], serde_json::json!(80.0));
        assert_eq!(json["username"], "demo1");
    }
}

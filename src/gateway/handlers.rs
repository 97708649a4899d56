//! One handler per seamless operation. The handlers stay thin: deserialize,
//! delegate to the service, return the uniform response envelope. Provider
//! errors are expressed through `statusCode`, never through HTTP status.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use super::state::AppState;
use crate::protocol::{
    AdjustBalanceTxn, BetTxn, CancelTxn, CheckBalanceRequest, ProviderRequest, RollbackTxn,
    SettleTxn, VoidSettleTxn, WalletResponse, WinRewardTxn,
};

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "git_hash": env!("GIT_HASH"),
    }))
}

pub async fn check_balance(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CheckBalanceRequest>,
) -> Json<WalletResponse> {
    Json(state.service.check_balance(req).await)
}

pub async fn place_bets(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProviderRequest<BetTxn>>,
) -> Json<WalletResponse> {
    Json(state.service.place_bets(req).await)
}

pub async fn settle_bets(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProviderRequest<SettleTxn>>,
) -> Json<WalletResponse> {
    Json(state.service.settle_bets(req).await)
}

pub async fn win_rewards(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProviderRequest<WinRewardTxn>>,
) -> Json<WalletResponse> {
    Json(state.service.win_rewards(req).await)
}

pub async fn place_tips(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProviderRequest<BetTxn>>,
) -> Json<WalletResponse> {
    Json(state.service.place_tips(req).await)
}

pub async fn adjust_bets(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProviderRequest<BetTxn>>,
) -> Json<WalletResponse> {
    Json(state.service.adjust_bets(req).await)
}

pub async fn adjust_balance(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProviderRequest<AdjustBalanceTxn>>,
) -> Json<WalletResponse> {
    Json(state.service.adjust_balance(req).await)
}

pub async fn cancel_bets(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProviderRequest<CancelTxn>>,
) -> Json<WalletResponse> {
    Json(state.service.cancel_bets(req).await)
}

pub async fn cancel_tips(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProviderRequest<CancelTxn>>,
) -> Json<WalletResponse> {
    Json(state.service.cancel_tips(req).await)
}

pub async fn rollback(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProviderRequest<RollbackTxn>>,
) -> Json<WalletResponse> {
    Json(state.service.rollback(req).await)
}

pub async fn void_settled(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProviderRequest<VoidSettleTxn>>,
) -> Json<WalletResponse> {
    Json(state.service.void_settled(req).await)
}

#[cfg(feature = "mock-api")]
pub mod mock {
    //! Internal seeding endpoints for integration environments. Excluded from
    //! production builds via the `mock-api` feature.

    use super::*;
    use crate::store::{Account, AccountStatus};
    use rust_decimal::Decimal;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct SeedAccountRequest {
        pub username: String,
        pub balance: Decimal,
        #[serde(default)]
        pub agent_id: Option<String>,
    }

    pub async fn seed_account(
        State(state): State<Arc<AppState>>,
        Json(req): Json<SeedAccountRequest>,
    ) -> Json<Value> {
        let account = Account {
            id: format!("acct-{}", req.username.to_lowercase()),
            username: req.username.clone(),
            balance: req.balance,
            agent_id: req.agent_id.unwrap_or_else(|| "mock-agent".to_string()),
            status: AccountStatus::Active,
        };
        match state.service.seed_account(account).await {
            Ok(()) => Json(json!({"status": "ok"})),
            Err(e) => Json(json!({"status": "error", "message": e.to_string()})),
        }
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct BlockAccountRequest {
        pub username: String,
        pub blocked: bool,
    }

    pub async fn block_account(
        State(state): State<Arc<AppState>>,
        Json(req): Json<BlockAccountRequest>,
    ) -> Json<Value> {
        match state.service.set_blocked(&req.username, req.blocked).await {
            Ok(()) => Json(json!({"status": "ok"})),
            Err(e) => Json(json!({"status": "error", "message": e.to_string()})),
        }
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct RegisterGameRequest {
        pub product_id: String,
        pub game_code: String,
        pub display_name: String,
    }

    pub async fn register_game(
        State(state): State<Arc<AppState>>,
        Json(req): Json<RegisterGameRequest>,
    ) -> Json<Value> {
        state
            .service
            .register_game(&req.product_id, &req.game_code, req.display_name);
        Json(json!({"status": "ok"}))
    }
}

//! Service orchestration: one method per provider operation.
//!
//! Responsibilities here are the ones neither the executor nor the stores own:
//! username canonicalization, per-call sub-transaction aggregation, picking the
//! fast path or the sharded queue, hydrate-and-retry-once on cache miss, and
//! shaping the provider response.
//!
//! Fast-path operations respond as soon as the cache mutation and event
//! enqueue commit. Reversal operations (cancel, rollback, cancel-tip,
//! void-settled) go through [`ResolutionHandler`] on the sharded queue and are
//! durably confirmed before the response leaves.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::balance_cache::{BalanceCache, CacheEntry, EventDraft, FastPathExecutor, FastPathOutcome};
use crate::config::WalletConfig;
use crate::core_types::canonical_username;
use crate::errors::WalletError;
use crate::events::{EventKind, HistoryRow, LedgerKind, LedgerRow};
use crate::game_catalog::GameCatalog;
use crate::history::HistoryBuffer;
use crate::ingest::IngestionQueue;
use crate::protocol::{
    AdjustBalanceTxn, AdjustDirection, BetTxn, CancelTxn, CheckBalanceRequest, ProviderRequest,
    RollbackTxn, SettleTxn, VoidSettleTxn, WalletResponse, WinRewardTxn, STATUS_ACCOUNT_NOT_FOUND,
    STATUS_INSUFFICIENT_FUNDS, STATUS_INTERNAL_ERROR, STATUS_SUCCESS,
};
use crate::shard_queue::{JobHandler, ShardedJobQueue};
use crate::store::{Account, AccountStatus, AccountStore};

pub struct WalletService {
    cache: Arc<BalanceCache>,
    catalog: Arc<GameCatalog>,
    store: Arc<dyn AccountStore>,
    history: Arc<HistoryBuffer>,
    executor: FastPathExecutor,
    jobs: ShardedJobQueue<ResolutionHandler>,
}

impl WalletService {
    /// Wire up the executor and spawn the shard workers. Must run inside a
    /// tokio runtime.
    pub fn new(
        cache: Arc<BalanceCache>,
        catalog: Arc<GameCatalog>,
        ingest: Arc<IngestionQueue>,
        store: Arc<dyn AccountStore>,
        history: Arc<HistoryBuffer>,
        config: &WalletConfig,
    ) -> Self {
        let executor = FastPathExecutor::new(cache.clone(), catalog.clone(), ingest);
        let handler = Arc::new(ResolutionHandler {
            store: store.clone(),
            cache: cache.clone(),
            history: history.clone(),
        });
        let jobs = ShardedJobQueue::start(handler, config);
        Self {
            cache,
            catalog,
            store,
            history,
            executor,
            jobs,
        }
    }

    /// Register a game display name for ledger enrichment (catalogue sync).
    pub fn register_game(&self, product_id: &str, game_code: &str, display_name: String) {
        self.catalog.insert(product_id, game_code, display_name);
    }

    // ---- fast-path operations ----

    pub async fn place_bets(&self, req: ProviderRequest<BetTxn>) -> WalletResponse {
        let bet_total: Decimal = req.txns.iter().map(|t| t.bet_amount).sum();
        let draft = EventDraft {
            kind: EventKind::Bet,
            round_id: first_round(&req.txns, |t| &t.round_id),
            bet_amount: bet_total,
            payout_amount: Decimal::ZERO,
            product_id: req.product_id.clone(),
            game_code: first_game_code(&req.txns, |t| t.game_code.as_deref()),
            timestamp_millis: req.timestamp_millis,
        };
        self.fast_op(&req.id, &req.product_id, req.currency.clone(), &req.username, draft)
            .await
    }

    /// Settlement credit. When a sub-transaction carries `isSingleState` with
    /// a positive bet amount, that bet is debited in the same call; otherwise
    /// the bet amount is informational and only the payout moves balance.
    pub async fn settle_bets(&self, req: ProviderRequest<SettleTxn>) -> WalletResponse {
        let mut bet_total = Decimal::ZERO;
        let mut payout_total = Decimal::ZERO;
        for txn in &req.txns {
            payout_total += txn.payout_amount;
            if txn.is_single_state.unwrap_or(false) && txn.bet_amount > Decimal::ZERO {
                bet_total += txn.bet_amount;
            }
        }
        let draft = EventDraft {
            kind: EventKind::Settle,
            round_id: first_round(&req.txns, |t| &t.round_id),
            bet_amount: bet_total,
            payout_amount: payout_total,
            product_id: req.product_id.clone(),
            game_code: first_game_code(&req.txns, |t| t.game_code.as_deref()),
            timestamp_millis: req.timestamp_millis,
        };
        self.fast_op(&req.id, &req.product_id, req.currency.clone(), &req.username, draft)
            .await
    }

    pub async fn win_rewards(&self, req: ProviderRequest<WinRewardTxn>) -> WalletResponse {
        let payout_total: Decimal = req.txns.iter().map(|t| t.payout_amount).sum();
        let draft = EventDraft {
            kind: EventKind::Settle,
            round_id: first_round(&req.txns, |t| &t.round_id),
            bet_amount: Decimal::ZERO,
            payout_amount: payout_total,
            product_id: req.product_id.clone(),
            game_code: first_game_code(&req.txns, |t| t.game_code.as_deref()),
            timestamp_millis: req.timestamp_millis,
        };
        self.fast_op(&req.id, &req.product_id, req.currency.clone(), &req.username, draft)
            .await
    }

    pub async fn place_tips(&self, req: ProviderRequest<BetTxn>) -> WalletResponse {
        self.place_bets(req).await
    }

    pub async fn adjust_bets(&self, req: ProviderRequest<BetTxn>) -> WalletResponse {
        self.place_bets(req).await
    }

    /// Operator correction; net = sum(credit) - sum(debit), funds-checked
    /// when the net is a debit.
    pub async fn adjust_balance(&self, req: ProviderRequest<AdjustBalanceTxn>) -> WalletResponse {
        let mut net = Decimal::ZERO;
        for txn in &req.txns {
            match txn.status {
                AdjustDirection::Credit => net += txn.amount,
                AdjustDirection::Debit => net -= txn.amount,
            }
        }
        let (kind, bet, payout) = if net < Decimal::ZERO {
            (EventKind::Bet, -net, Decimal::ZERO)
        } else {
            (EventKind::Settle, Decimal::ZERO, net)
        };
        let draft = EventDraft {
            kind,
            round_id: req.txns.first().map(|t| t.ref_id.clone()).unwrap_or_default(),
            bet_amount: bet,
            payout_amount: payout,
            product_id: req.product_id.clone(),
            game_code: String::new(),
            timestamp_millis: req.timestamp_millis,
        };
        self.fast_op(&req.id, &req.product_id, req.currency.clone(), &req.username, draft)
            .await
    }

    pub async fn check_balance(&self, req: CheckBalanceRequest) -> WalletResponse {
        let username = canonical_username(&req.username);
        let balance = match self.cache.balance(&username) {
            Some(balance) => Some(balance),
            None => match self.hydrate(&username).await {
                Ok(true) => self.cache.balance(&username),
                Ok(false) => {
                    return WalletResponse::new(&req.id, &req.product_id, STATUS_ACCOUNT_NOT_FOUND)
                        .with_currency(req.currency)
                        .with_username(&username);
                }
                Err(e) => {
                    warn!(%username, error = %e, "balance hydrate failed");
                    return WalletResponse::new(&req.id, &req.product_id, STATUS_INTERNAL_ERROR)
                        .with_currency(req.currency);
                }
            },
        };
        match balance {
            Some(balance) => WalletResponse::new(&req.id, &req.product_id, STATUS_SUCCESS)
                .with_currency(req.currency)
                .with_username(&username)
                .with_balance(balance),
            None => WalletResponse::new(&req.id, &req.product_id, STATUS_INTERNAL_ERROR)
                .with_currency(req.currency),
        }
    }

    // ---- queued operations ----

    pub async fn cancel_bets(&self, req: ProviderRequest<CancelTxn>) -> WalletResponse {
        let username = canonical_username(&req.username);
        let job = ResolutionJob::Cancel {
            username: username.clone(),
            product_id: req.product_id.clone(),
            txns: req.txns,
        };
        self.queued_op(&req.id, &req.product_id, req.currency, &username, job)
            .await
    }

    pub async fn cancel_tips(&self, req: ProviderRequest<CancelTxn>) -> WalletResponse {
        self.cancel_bets(req).await
    }

    pub async fn rollback(&self, req: ProviderRequest<RollbackTxn>) -> WalletResponse {
        let username = canonical_username(&req.username);
        let job = ResolutionJob::Rollback {
            username: username.clone(),
            product_id: req.product_id.clone(),
            txns: req.txns,
        };
        self.queued_op(&req.id, &req.product_id, req.currency, &username, job)
            .await
    }

    pub async fn void_settled(&self, req: ProviderRequest<VoidSettleTxn>) -> WalletResponse {
        let username = canonical_username(&req.username);
        let job = ResolutionJob::VoidSettled {
            username: username.clone(),
            product_id: req.product_id.clone(),
            txns: req.txns,
        };
        self.queued_op(&req.id, &req.product_id, req.currency, &username, job)
            .await
    }

    // ---- account administration ----

    /// Create or replace an account and force the cache to match.
    pub async fn seed_account(&self, account: Account) -> Result<(), WalletError> {
        let username = canonical_username(&account.username);
        let account = Account {
            username: username.clone(),
            ..account
        };
        let entry = CacheEntry {
            balance: account.balance,
            account_id: account.id.clone(),
            agent_id: account.agent_id.clone(),
        };
        self.store.upsert_account(account).await?;
        self.cache.resync(&username, entry);
        Ok(())
    }

    /// Block or unblock an account, resyncing the cache from the durable
    /// balance either way.
    pub async fn set_blocked(&self, username: &str, blocked: bool) -> Result<(), WalletError> {
        let username = canonical_username(username);
        let mut account = self
            .store
            .find_by_username(&username)
            .await?
            .ok_or_else(|| WalletError::AccountNotFound(username.clone()))?;
        account.status = if blocked {
            AccountStatus::Blocked
        } else {
            AccountStatus::Active
        };
        let entry = CacheEntry {
            balance: account.balance,
            account_id: account.id.clone(),
            agent_id: account.agent_id.clone(),
        };
        self.store.upsert_account(account).await?;
        self.cache.resync(&username, entry);
        info!(%username, blocked, "account status changed");
        Ok(())
    }

    // ---- internals ----

    /// Load the account from the durable store into the cache.
    /// `Ok(false)` means the account does not exist.
    async fn hydrate(&self, username: &str) -> Result<bool, WalletError> {
        let Some(account) = self.store.find_by_username(username).await? else {
            return Ok(false);
        };
        self.cache.hydrate(
            username,
            CacheEntry {
                balance: account.balance,
                account_id: account.id,
                agent_id: account.agent_id,
            },
        );
        Ok(true)
    }

    async fn fast_op(
        &self,
        call_id: &str,
        product_id: &str,
        currency: Option<String>,
        raw_username: &str,
        draft: EventDraft,
    ) -> WalletResponse {
        let username = canonical_username(raw_username);
        match self.apply_fast(&username, call_id, draft).await {
            Ok(FastPathOutcome::Applied {
                balance_before,
                balance_after,
            }) => WalletResponse::new(call_id, product_id, STATUS_SUCCESS)
                .with_currency(currency)
                .with_username(&username)
                .with_balances(balance_before, balance_after),
            // Duplicates answer with the recorded post-transaction balance in
            // every balance field; the call moved no money this time around.
            Ok(FastPathOutcome::Duplicate { balance }) => {
                WalletResponse::new(call_id, product_id, STATUS_SUCCESS)
                    .with_currency(currency)
                    .with_username(&username)
                    .with_balances(balance, balance)
            }
            Ok(FastPathOutcome::InsufficientFunds { balance }) => {
                WalletResponse::new(call_id, product_id, STATUS_INSUFFICIENT_FUNDS)
                    .with_currency(currency)
                    .with_username(&username)
                    .with_balances(balance, balance)
            }
            Ok(FastPathOutcome::CacheMiss) => {
                WalletResponse::new(call_id, product_id, STATUS_ACCOUNT_NOT_FOUND)
                    .with_currency(currency)
                    .with_username(&username)
            }
            Err(e) => {
                warn!(%username, call_id, error = %e, "fast path call failed");
                WalletResponse::new(call_id, product_id, STATUS_INTERNAL_ERROR)
                    .with_currency(currency)
            }
        }
    }

    /// Execute with hydrate-and-retry-exactly-once on cache miss. A returned
    /// `CacheMiss` here means the account does not exist.
    async fn apply_fast(
        &self,
        username: &str,
        call_id: &str,
        draft: EventDraft,
    ) -> Result<FastPathOutcome, WalletError> {
        let outcome = self.executor.execute(username, call_id, draft.clone())?;
        let outcome = if matches!(outcome, FastPathOutcome::CacheMiss) {
            if !self.hydrate(username).await? {
                return Ok(FastPathOutcome::CacheMiss);
            }
            match self.executor.execute(username, call_id, draft.clone())? {
                // Hydrated yet still missing: transient, retry safe.
                FastPathOutcome::CacheMiss => {
                    return Err(WalletError::CacheMiss(username.to_string()));
                }
                outcome => outcome,
            }
        } else {
            outcome
        };

        if let FastPathOutcome::Applied {
            balance_before,
            balance_after,
        } = &outcome
        {
            if let Some(entry) = self.cache.entry(username) {
                self.history
                    .push(HistoryRow {
                        user_id: entry.account_id,
                        agent_id: entry.agent_id,
                        amount: draft.payout_amount - draft.bet_amount,
                        before_amount: *balance_before,
                        after_amount: *balance_after,
                        kind: draft.kind.into(),
                        round_id: draft.round_id.clone(),
                        date: Utc::now(),
                    })
                    .await;
            }
        }
        Ok(outcome)
    }

    async fn queued_op(
        &self,
        call_id: &str,
        product_id: &str,
        currency: Option<String>,
        username: &str,
        job: ResolutionJob,
    ) -> WalletResponse {
        match self.jobs.submit(username, call_id, job).await {
            Ok(Resolution::Applied {
                balance_before,
                balance_after,
            }) => WalletResponse::new(call_id, product_id, STATUS_SUCCESS)
                .with_currency(currency)
                .with_username(username)
                .with_balances(balance_before, balance_after),
            Ok(Resolution::AccountNotFound) => {
                WalletResponse::new(call_id, product_id, STATUS_ACCOUNT_NOT_FOUND)
                    .with_currency(currency)
                    .with_username(username)
            }
            Err(WalletError::QueueTimeout) => {
                // Outcome unknown: the job keeps running. The provider retries
                // with the same call id and attaches to the recorded result.
                warn!(%username, call_id, "queued operation timed out, outcome unknown");
                WalletResponse::new(call_id, product_id, STATUS_INTERNAL_ERROR)
                    .with_currency(currency)
            }
            Err(e) => {
                warn!(%username, call_id, error = %e, "queued operation failed");
                WalletResponse::new(call_id, product_id, STATUS_INTERNAL_ERROR)
                    .with_currency(currency)
            }
        }
    }
}

fn first_round<T>(txns: &[T], round: impl Fn(&T) -> &String) -> String {
    txns.first().map(|t| round(t).clone()).unwrap_or_default()
}

fn first_game_code<T>(txns: &[T], code: impl Fn(&T) -> Option<&str>) -> String {
    txns.first()
        .and_then(|t| code(t))
        .unwrap_or_default()
        .to_string()
}

/// Work item for the sharded queue. One job per provider call; the job id is
/// the provider call id.
#[derive(Debug, Clone)]
pub enum ResolutionJob {
    Cancel {
        username: String,
        product_id: String,
        txns: Vec<CancelTxn>,
    },
    Rollback {
        username: String,
        product_id: String,
        txns: Vec<RollbackTxn>,
    },
    VoidSettled {
        username: String,
        product_id: String,
        txns: Vec<VoidSettleTxn>,
    },
}

impl ResolutionJob {
    fn username(&self) -> &str {
        match self {
            ResolutionJob::Cancel { username, .. } => username,
            ResolutionJob::Rollback { username, .. } => username,
            ResolutionJob::VoidSettled { username, .. } => username,
        }
    }

    fn product_id(&self) -> &str {
        match self {
            ResolutionJob::Cancel { product_id, .. } => product_id,
            ResolutionJob::Rollback { product_id, .. } => product_id,
            ResolutionJob::VoidSettled { product_id, .. } => product_id,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Resolution {
    Applied {
        balance_before: Decimal,
        balance_after: Decimal,
    },
    AccountNotFound,
}

/// Shard-worker body for the reversal operations.
///
/// Idempotency is durable: each sub-transaction is skipped when a ledger row
/// with the same (transaction id, kind) already exists. The surviving deltas
/// apply in one durable transaction, then the cache is resynced from the
/// durable balance. Errors returned here are transient and retried by the
/// shard worker.
pub struct ResolutionHandler {
    store: Arc<dyn AccountStore>,
    cache: Arc<BalanceCache>,
    history: Arc<HistoryBuffer>,
}

/// Per-sub-transaction reversal delta, `None` when the txn does not qualify.
fn reversal_delta(job: &ResolutionJob, index: usize) -> Option<(String, String, LedgerKind, Decimal)> {
    match job {
        ResolutionJob::Cancel { txns, .. } => {
            let txn = txns.get(index)?;
            Some((
                txn.id.clone(),
                txn.round_id.clone(),
                LedgerKind::Cancel,
                txn.bet_amount,
            ))
        }
        ResolutionJob::Rollback { txns, .. } => {
            let txn = txns.get(index)?;
            // Settled rounds give back the payout; refunded rounds give back
            // the refunded stake. Anything else is a no-op.
            let delta = if txn.status == "SETTLED" && txn.payout_amount > Decimal::ZERO {
                -txn.payout_amount
            } else if txn.status == "REFUND" && txn.bet_amount > Decimal::ZERO {
                -txn.bet_amount
            } else {
                return None;
            };
            Some((txn.id.clone(), txn.round_id.clone(), LedgerKind::Rollback, delta))
        }
        ResolutionJob::VoidSettled { txns, .. } => {
            let txn = txns.get(index)?;
            // Claw back the payout, restore the stake.
            let delta = txn.bet_amount - txn.payout_amount;
            Some((txn.id.clone(), txn.round_id.clone(), LedgerKind::Void, delta))
        }
    }
}

fn job_len(job: &ResolutionJob) -> usize {
    match job {
        ResolutionJob::Cancel { txns, .. } => txns.len(),
        ResolutionJob::Rollback { txns, .. } => txns.len(),
        ResolutionJob::VoidSettled { txns, .. } => txns.len(),
    }
}

#[async_trait]
impl JobHandler for ResolutionHandler {
    type Job = ResolutionJob;
    type Output = Resolution;

    async fn handle(&self, job: &ResolutionJob) -> Result<Resolution, WalletError> {
        let username = job.username();
        let Some(account) = self.store.find_by_username(username).await? else {
            return Ok(Resolution::AccountNotFound);
        };

        let mut total = Decimal::ZERO;
        let mut rows: Vec<LedgerRow> = Vec::new();
        let mut running = account.balance;
        for index in 0..job_len(job) {
            let Some((txn_id, round_id, kind, delta)) = reversal_delta(job, index) else {
                continue;
            };
            if self.store.has_ledger_row(&txn_id, kind).await? {
                continue; // already reversed
            }
            let before = running;
            running += delta;
            total += delta;
            rows.push(LedgerRow {
                user_id: account.id.clone(),
                username: username.to_string(),
                agent_id: account.agent_id.clone(),
                product_id: job.product_id().to_string(),
                game_code: String::new(),
                game_name: String::new(),
                kind,
                bet_amount: Decimal::ZERO,
                payout_amount: Decimal::ZERO,
                net_amount: delta,
                balance_before: before,
                balance_after: running,
                transaction_id: txn_id,
                round_id,
                status: "SUCCESS".to_string(),
                transaction_time: Utc::now(),
            });
        }

        if rows.is_empty() {
            // Fully idempotent call: everything already reversed.
            self.resync(username, &account, account.balance);
            return Ok(Resolution::Applied {
                balance_before: account.balance,
                balance_after: account.balance,
            });
        }

        let balance_after = self.store.apply_resolution(username, total, &rows).await?;
        self.resync(username, &account, balance_after);

        let history: Vec<HistoryRow> = rows
            .iter()
            .map(|row| HistoryRow {
                user_id: row.user_id.clone(),
                agent_id: row.agent_id.clone(),
                amount: row.net_amount,
                before_amount: row.balance_before,
                after_amount: row.balance_after,
                kind: row.kind,
                round_id: row.round_id.clone(),
                date: row.transaction_time,
            })
            .collect();
        self.history.push_all(history).await;

        Ok(Resolution::Applied {
            balance_before: account.balance,
            balance_after,
        })
    }
}

impl ResolutionHandler {
    fn resync(&self, username: &str, account: &Account, balance: Decimal) {
        self.cache.resync(
            username,
            CacheEntry {
                balance,
                account_id: account.id.clone(),
                agent_id: account.agent_id.clone(),
            },
        );
    }
}

use thiserror::Error;

/// Error taxonomy for the settlement engine.
///
/// Terminal vs transient matters for the provider contract:
/// - `AccountNotFound` / `InsufficientFunds` are terminal, no mutation happened.
/// - `CacheMiss` is transient: hydrate once and retry.
/// - `QueueTimeout` is outcome-unknown: the job keeps running, retry is safe
///   because every mutation path re-checks dedup before acting.
#[derive(Error, Debug)]
pub enum WalletError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("insufficient funds")]
    InsufficientFunds,

    #[error("balance cache miss for {0}")]
    CacheMiss(String),

    #[error("ingestion queue full")]
    QueueFull,

    #[error("job queue timeout")]
    QueueTimeout,

    #[error("job failed after retries: {0}")]
    JobFailed(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl WalletError {
    /// Safe to retry without risking a double mutation?
    pub fn is_retry_safe(&self) -> bool {
        matches!(
            self,
            WalletError::CacheMiss(_)
                | WalletError::QueueFull
                | WalletError::QueueTimeout
                | WalletError::Database(_)
                | WalletError::Internal(_)
        )
    }
}

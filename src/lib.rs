//! Seamless-wallet settlement engine.
//!
//! Real-money balance ledger for a gaming platform integrating third-party
//! game providers. Architecture:
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌───────────┐   ┌──────────┐
//! │ Provider │──▶│  Fast Path  │──▶│ Ingestion │──▶│ Persist  │
//! │ (HTTP)   │   │ (cache+dedup)│  │  Queue    │   │ Worker   │
//! └──────────┘   └─────────────┘   └───────────┘   └──────────┘
//!       │        ┌─────────────┐   ┌───────────┐
//!       └───────▶│ Sharded Job │──▶│  Durable  │  (cancel/rollback:
//!                │   Queue     │   │   Store   │   confirm before respond)
//!                └─────────────┘   └───────────┘
//! ```
//!
//! # Modules
//!
//! - [`core_types`] - id aliases and canonical username form
//! - [`balance_cache`] - balance read-of-record and the fast-path executor
//! - [`ingest`] - lock-free queue between fast path and persistence
//! - [`persist`] - batch persistence worker (exactly-once into the ledger)
//! - [`shard_queue`] - per-user FIFO queue for confirm-before-respond ops
//! - [`service`] - per-operation orchestration and reversal resolution
//! - [`store`] - durable account store (PostgreSQL or in-memory)
//! - [`history`] - loss-tolerant audit-row buffer
//! - [`gateway`] - axum HTTP surface

pub mod balance_cache;
pub mod config;
pub mod core_types;
pub mod errors;
pub mod events;
pub mod game_catalog;
pub mod gateway;
pub mod history;
pub mod ingest;
pub mod logging;
pub mod persist;
pub mod protocol;
pub mod service;
pub mod shard_queue;
pub mod store;

// Convenient re-exports at crate root
pub use balance_cache::{BalanceCache, CacheEntry, EventDraft, FastPathExecutor, FastPathOutcome};
pub use config::{AppConfig, WalletConfig};
pub use errors::WalletError;
pub use events::{EventKind, HistoryRow, LedgerEvent, LedgerKind, LedgerRow};
pub use ingest::IngestionQueue;
pub use persist::BatchPersistWorker;
pub use service::WalletService;
pub use shard_queue::{JobHandler, ShardedJobQueue};
pub use store::{Account, AccountStatus, AccountStore, MemStore, PgStore};

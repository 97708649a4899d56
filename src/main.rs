//! Seamless-wallet settlement engine entry point.
//!
//! Startup order matters: config, logging, durable store, caches, then the
//! background workers (persistence, history flusher, shard workers) before the
//! gateway starts accepting provider callbacks.

use std::sync::Arc;

use seamless_wallet::balance_cache::BalanceCache;
use seamless_wallet::config::AppConfig;
use seamless_wallet::game_catalog::GameCatalog;
use seamless_wallet::gateway;
use seamless_wallet::history::HistoryBuffer;
use seamless_wallet::ingest::IngestionQueue;
use seamless_wallet::logging::init_logging;
use seamless_wallet::persist::BatchPersistWorker;
use seamless_wallet::service::WalletService;
use seamless_wallet::store::{AccountStore, MemStore, PgStore};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

/// Get port override from command line (--port argument)
fn get_port_override() -> Option<u16> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "--port" && i + 1 < args.len() {
            return args[i + 1].parse().ok();
        }
    }
    None
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let config = AppConfig::load(&env);
    let _log_guard = init_logging(&config);

    tracing::info!(
        "Starting seamless-wallet in {} mode (git {})",
        env,
        env!("GIT_HASH")
    );

    let wallet = &config.wallet;
    let store: Arc<dyn AccountStore> = match &config.postgres_url {
        Some(url) => {
            let pg = PgStore::connect(url, wallet.durable_dedup_ttl_secs).await?;
            println!("🐘 PostgreSQL store connected");
            Arc::new(pg)
        }
        None => {
            println!("⚠️  No postgres_url configured, running in simulation mode (in-memory store)");
            Arc::new(MemStore::new(wallet.durable_dedup_ttl_secs))
        }
    };

    let cache = Arc::new(BalanceCache::new(wallet.fast_dedup_ttl_secs));
    let catalog = Arc::new(GameCatalog::new(wallet.game_cache_ttl_secs));
    let ingest = Arc::new(IngestionQueue::new(wallet.ingest_capacity));
    let history = Arc::new(HistoryBuffer::new(store.clone(), wallet));

    let persist_worker = BatchPersistWorker::new(ingest.clone(), store.clone(), wallet);
    tokio::spawn(persist_worker.run());
    tokio::spawn(history.clone().run_flusher());
    println!("🔄 Persistence worker and history flusher started");

    let service = Arc::new(WalletService::new(
        cache, catalog, ingest, store, history, wallet,
    ));

    let port = get_port_override().unwrap_or(config.gateway.port);
    gateway::run_server(&config.gateway.host, port, service).await;
    Ok(())
}

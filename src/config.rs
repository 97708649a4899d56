use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub enable_tracing: bool,
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
    /// PostgreSQL connection URL for the durable account store.
    /// When absent the engine runs against the in-memory store (simulation mode).
    #[serde(default)]
    pub postgres_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

/// Settlement pipeline tuning.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WalletConfig {
    /// Capacity of the ingestion queue between fast path and persistence worker.
    pub ingest_capacity: usize,
    /// Max events popped per persistence-worker cycle.
    pub persist_batch_size: usize,
    /// Sleep when the ingestion queue is empty (ms).
    pub persist_empty_sleep_ms: u64,
    /// Fast-path dedup tier TTL (seconds).
    pub fast_dedup_ttl_secs: u64,
    /// Durable dedup marker TTL (seconds).
    pub durable_dedup_ttl_secs: u64,
    /// Number of job-queue shards (one worker each).
    pub job_shards: usize,
    /// Max processing attempts per job.
    pub job_max_attempts: u32,
    /// Base delay for exponential backoff between attempts (ms).
    pub job_backoff_ms: u64,
    /// How long an HTTP caller blocks on a queued job before giving up (ms).
    pub job_wait_timeout_ms: u64,
    /// History buffer flush threshold (rows).
    pub history_batch_size: usize,
    /// History buffer flush interval (ms).
    pub history_flush_ms: u64,
    /// Game display-name side cache retention (seconds).
    pub game_cache_ttl_secs: u64,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            ingest_capacity: 65_536,
            persist_batch_size: 2_000,
            persist_empty_sleep_ms: 50,
            fast_dedup_ttl_secs: 600,
            durable_dedup_ttl_secs: 86_400,
            job_shards: 4,
            job_max_attempts: 3,
            job_backoff_ms: 1_000,
            job_wait_timeout_ms: 10_000,
            history_batch_size: 500,
            history_flush_ms: 1_000,
            game_cache_ttl_secs: 7 * 86_400,
        }
    }
}

impl AppConfig {
    pub fn load(env: &str) -> Self {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .unwrap_or_else(|_| panic!("Failed to read config file: {}", config_path));
        serde_yaml::from_str(&content).expect("Failed to parse config yaml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_defaults_match_reference_system() {
        let cfg = WalletConfig::default();
        assert_eq!(cfg.job_shards, 4);
        assert_eq!(cfg.persist_batch_size, 2_000);
        assert_eq!(cfg.fast_dedup_ttl_secs, 600);
        assert_eq!(cfg.durable_dedup_ttl_secs, 86_400);
    }

    #[test]
    fn test_minimal_yaml_parses_with_defaults() {
        let yaml = r#"
log_level: info
log_dir: ./logs
log_file: wallet.log
use_json: false
rotation: daily
enable_tracing: true
gateway:
  host: 0.0.0.0
  port: 8080
"#;
        let cfg: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.gateway.port, 8080);
        assert!(cfg.postgres_url.is_none());
        assert_eq!(cfg.wallet.job_shards, 4);
    }
}

//! Game display-name side cache, keyed `productId:gameCode`.
//!
//! Populated by the catalogue sync (external collaborator); the fast path only
//! reads it. Unknown games resolve to the empty string - a ledger row with a
//! blank game name is preferable to blocking a settlement on a lookup.

use cached::{Cached, TimedCache};
use std::sync::Mutex;

pub struct GameCatalog {
    cache: Mutex<TimedCache<String, String>>,
}

impl GameCatalog {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            cache: Mutex::new(TimedCache::with_lifespan(ttl_secs)),
        }
    }

    fn key(product_id: &str, game_code: &str) -> String {
        format!("{}:{}", product_id, game_code)
    }

    pub fn insert(&self, product_id: &str, game_code: &str, display_name: String) {
        let mut cache = self.cache.lock().unwrap();
        cache.cache_set(Self::key(product_id, game_code), display_name);
    }

    /// Resolve a display name; empty string when unknown or expired.
    pub fn resolve(&self, product_id: &str, game_code: &str) -> String {
        let mut cache = self.cache.lock().unwrap();
        cache
            .cache_get(&Self::key(product_id, game_code))
            .cloned()
            .unwrap_or_default()
    }
}

/// Caching layer
///
/// LRU caches with a per-entry TTL for blocks (by height and by hash) and
/// classified transactions (by txid). Every lookup feeds the hit/miss metrics.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::block::Block;
use crate::config::CacheSettings;
use crate::metrics;
use crate::tx::Tx;

const BLOCK_BY_HEIGHT: &str = "block_by_height";
const BLOCK_BY_HASH: &str = "block_by_hash";
const TX: &str = "tx";

/// Cache entry with an expiry time
#[derive(Debug, Clone)]
pub struct CachedEntry<T> {
    value: T,
    expires_at: Instant,
}

impl<T> CachedEntry<T> {
    pub fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    pub fn value(&self) -> &T {
        &self.value
    }
}

type Shared<K, V> = Arc<RwLock<LruCache<K, CachedEntry<V>>>>;

fn lru<K: std::hash::Hash + Eq, V>(capacity: usize) -> Shared<K, V> {
    let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
    Arc::new(RwLock::new(LruCache::new(capacity)))
}

/// Look up a live entry, dropping it if it has expired
async fn lookup<K, V>(cache: &Shared<K, V>, name: &str, key: &K) -> Option<V>
where
    K: std::hash::Hash + Eq,
    V: Clone,
{
    let mut guard = cache.write().await;
    let live = guard
        .get(key)
        .map(|entry| (!entry.is_expired()).then(|| entry.value().clone()));
    let found = match live {
        Some(Some(value)) => Some(value),
        Some(None) => {
            guard.pop(key);
            None
        }
        None => None,
    };
    metrics::record_cache_lookup(name, found.is_some());
    found
}

#[derive(Clone)]
pub struct CacheManager {
    blocks_by_height: Shared<u32, Block>,
    blocks_by_hash: Shared<String, Block>,
    transactions: Shared<String, Tx>,
    ttl: Duration,
}

impl CacheManager {
    pub fn new(settings: &CacheSettings) -> Self {
        Self::with_capacities(
            settings.block_capacity,
            settings.tx_capacity,
            Duration::from_secs(settings.ttl_secs),
        )
    }

    pub fn with_capacities(block_capacity: usize, tx_capacity: usize, ttl: Duration) -> Self {
        Self {
            blocks_by_height: lru(block_capacity),
            blocks_by_hash: lru(block_capacity),
            transactions: lru(tx_capacity),
            ttl,
        }
    }

    // ========== Blocks ==========

    pub async fn get_block_by_height(&self, height: u32) -> Option<Block> {
        lookup(&self.blocks_by_height, BLOCK_BY_HEIGHT, &height).await
    }

    pub async fn get_block_by_hash(&self, hash: &str) -> Option<Block> {
        lookup(&self.blocks_by_hash, BLOCK_BY_HASH, &hash.to_string()).await
    }

    /// Store a block under both its height and its hash
    pub async fn put_block(&self, block: Block) {
        {
            let mut cache = self.blocks_by_height.write().await;
            cache.put(block.height, CachedEntry::new(block.clone(), self.ttl));
            metrics::set_cache_entries(BLOCK_BY_HEIGHT, cache.len());
        }
        let mut cache = self.blocks_by_hash.write().await;
        cache.put(block.hash.clone(), CachedEntry::new(block, self.ttl));
        metrics::set_cache_entries(BLOCK_BY_HASH, cache.len());
    }

    pub async fn invalidate_block(&self, height: u32, hash: &str) {
        self.blocks_by_height.write().await.pop(&height);
        self.blocks_by_hash.write().await.pop(&hash.to_string());
    }

    // ========== Transactions ==========

    pub async fn get_tx(&self, txid: &str) -> Option<Tx> {
        lookup(&self.transactions, TX, &txid.to_string()).await
    }

    pub async fn put_tx(&self, tx: Tx) {
        let mut cache = self.transactions.write().await;
        cache.put(tx.id().to_string(), CachedEntry::new(tx, self.ttl));
        metrics::set_cache_entries(TX, cache.len());
    }

    // ========== Statistics ==========

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            blocks_by_height_count: self.blocks_by_height.read().await.len(),
            blocks_by_hash_count: self.blocks_by_hash.read().await.len(),
            transactions_count: self.transactions.read().await.len(),
        }
    }

    pub async fn clear_all(&self) {
        self.blocks_by_height.write().await.clear();
        self.blocks_by_hash.write().await.clear();
        self.transactions.write().await.clear();
    }
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::new(&CacheSettings::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub blocks_by_height_count: usize,
    pub blocks_by_hash_count: usize,
    pub transactions_count: usize,
}

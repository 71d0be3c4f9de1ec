//! Cache Client Module
//!
//! Facade over [`Store`] with a single on/off switch. Callers code against
//! one interface whether or not caching is active; when disabled every
//! operation is a no-op and `get_or_compute` always runs the computation.

use tracing::{debug, info};

use crate::cache::{short_key, CacheStats, EntryInfo, Metadata, Store};
use crate::config::CacheConfig;
use crate::error::Result;

/// Switchable cache handle.
pub struct CacheClient<V> {
    store: Store<V>,
    enabled: bool,
    log_hits: bool,
}

/// Builds a client from `config`.
///
/// A disabled client never starts a cleanup thread.
///
/// # Example
/// ```ignore
/// let cache: CacheClient<Vec<String>> = create_cache(&CacheConfig::from_env())?;
/// let plots = cache.get_or_compute("ensemble:1f3a", || suggest_plots(&frame), None, None)?;
/// ```
pub fn create_cache<V>(config: &CacheConfig) -> Result<CacheClient<V>>
where
    V: Clone + serde::Serialize + Send + 'static,
{
    CacheClient::new(config)
}

impl<V> CacheClient<V>
where
    V: Clone + serde::Serialize + Send + 'static,
{
    pub fn new(config: &CacheConfig) -> Result<Self> {
        let store = if config.enabled {
            Store::new(config)?
        } else {
            let inert = CacheConfig {
                cleanup_interval: None,
                ..config.clone()
            };
            Store::new(&inert)?
        };

        info!(
            "Cache client ready: enabled={}, capacity={}, policy={}",
            config.enabled, config.capacity, config.eviction_policy
        );
        Ok(Self::from_store(store, config.enabled, config.log_hits))
    }

    /// Wraps an existing store.
    pub fn from_store(store: Store<V>, enabled: bool, log_hits: bool) -> Self {
        Self {
            store,
            enabled,
            log_hits,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The wrapped store.
    pub fn store(&self) -> &Store<V> {
        &self.store
    }

    // == Reads ==
    pub fn get(&self, key: &str) -> Option<V> {
        if !self.enabled {
            return None;
        }
        let value = self.store.get(key);
        self.log_lookup(key, value.is_some());
        value
    }

    pub fn peek(&self, key: &str) -> Option<V> {
        if !self.enabled {
            return None;
        }
        self.store.peek(key)
    }

    pub fn info(&self, key: &str) -> Option<EntryInfo> {
        if !self.enabled {
            return None;
        }
        self.store.info(key)
    }

    // == Writes ==
    pub fn set(
        &self,
        key: impl Into<String>,
        value: V,
        ttl: Option<u64>,
        metadata: Option<Metadata>,
    ) {
        if self.enabled {
            self.store.set(key, value, ttl, metadata);
        }
    }

    /// Memoized computation; runs `compute` directly when disabled.
    pub fn get_or_compute<F, E>(
        &self,
        key: &str,
        compute: F,
        ttl: Option<u64>,
        metadata: Option<Metadata>,
    ) -> std::result::Result<V, E>
    where
        F: FnOnce() -> std::result::Result<V, E>,
    {
        if !self.enabled {
            return compute();
        }
        if self.log_hits {
            let cached = self.store.peek(key).is_some();
            self.log_lookup(key, cached);
        }
        self.store.get_or_compute(key, compute, ttl, metadata)
    }

    // == Removal ==
    pub fn invalidate(&self, key: &str) -> bool {
        self.enabled && self.store.invalidate(key)
    }

    pub fn invalidate_pattern(&self, prefix: &str) -> usize {
        if !self.enabled {
            return 0;
        }
        self.store.invalidate_pattern(prefix)
    }

    pub fn clear(&self) {
        if self.enabled {
            self.store.clear();
        }
    }

    /// Sweeps expired entries now. Returns the number removed.
    pub fn cleanup(&self) -> usize {
        if !self.enabled {
            return 0;
        }
        self.store.cleanup_expired()
    }

    /// Counters of the wrapped store; all zero when disabled.
    pub fn stats(&self) -> CacheStats {
        if !self.enabled {
            return CacheStats::default();
        }
        self.store.stats()
    }

    /// Stops the background cleanup thread. Safe to call repeatedly.
    pub fn close(&self) {
        self.store.close();
    }

    fn log_lookup(&self, key: &str, hit: bool) {
        let outcome = if hit { "HIT" } else { "MISS" };
        if self.log_hits {
            info!("Cache {}: {}", outcome, short_key(key));
        } else {
            debug!("Cache {}: {}", outcome, short_key(key));
        }
    }
}

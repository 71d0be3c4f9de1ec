//! Cache Store Module
//!
//! Main cache engine: a keyed map under one coarse lock, an optional recency
//! order, lazy TTL expiry, policy-driven capacity eviction and per-key compute
//! locks so concurrent misses on one key run the computation only once.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use chrono::Duration;
use parking_lot::Mutex;
use rand::Rng;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::cache::{
    CacheStats, Clock, Entry, EntryInfo, EvictionPolicy, Metadata, RecencyOrder, StatsRecorder,
    SystemClock, LAST_COMPUTE_MS,
};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::tasks::{Sweep, Sweeper};

/// Jittered TTLs never drop below one second.
const MIN_TTL_MS: i64 = 1000;
/// Upper bound on any TTL (about 100 years) so deadlines stay representable.
const MAX_TTL_SECS: u64 = 100 * 365 * 24 * 3600;
/// Keys are shortened to this many characters in log lines.
const LOG_KEY_CHARS: usize = 16;

// == Locked State ==
struct State<V> {
    entries: HashMap<String, Entry<V>>,
    /// Present only when recency is tracked
    order: Option<RecencyOrder>,
}

impl<V> State<V> {
    fn remove(&mut self, key: &str) -> Option<Entry<V>> {
        let entry = self.entries.remove(key)?;
        if let Some(order) = &mut self.order {
            order.remove(key);
        }
        Some(entry)
    }

    fn touch(&mut self, key: &str) {
        if let Some(order) = &mut self.order {
            order.touch(key);
        }
    }
}

type KeyLock = Arc<Mutex<()>>;

// == Core ==
/// State shared between a store and its cleanup thread.
struct Core<V> {
    state: Mutex<State<V>>,
    /// Per-key compute locks; guarded separately and never nested with `state`
    key_locks: Mutex<HashMap<String, KeyLock>>,
    stats: StatsRecorder,
    clock: Arc<dyn Clock>,
}

impl<V> Core<V> {
    fn cleanup_expired(&self) -> usize {
        let now = self.clock.now();
        let removed = {
            let mut state = self.state.lock();
            let expired: Vec<String> = state
                .entries
                .iter()
                .filter(|(_, entry)| entry.is_expired(now))
                .map(|(key, _)| key.clone())
                .collect();
            for key in &expired {
                state.remove(key);
            }
            self.stats.record_expirations(expired.len() as u64);
            expired.len()
        };
        self.reclaim_key_locks();
        removed
    }

    /// Returns the compute lock for `key`, creating it if needed.
    fn key_lock(&self, key: &str) -> KeyLock {
        let mut locks = self.key_locks.lock();
        Arc::clone(locks.entry(key.to_string()).or_default())
    }

    /// Drops compute locks that nobody holds and whose key is not cached.
    ///
    /// A lock with an outstanding handle is never removed, otherwise a new
    /// caller could create a second lock for a key that is still computing.
    fn reclaim_key_locks(&self) -> usize {
        let idle: Vec<String> = {
            let locks = self.key_locks.lock();
            locks
                .iter()
                .filter(|(_, lock)| Arc::strong_count(lock) == 1)
                .map(|(key, _)| key.clone())
                .collect()
        };
        if idle.is_empty() {
            return 0;
        }

        let stale: Vec<String> = {
            let state = self.state.lock();
            idle.into_iter()
                .filter(|key| !state.entries.contains_key(key))
                .collect()
        };

        let mut locks = self.key_locks.lock();
        let before = locks.len();
        for key in &stale {
            if locks
                .get(key)
                .is_some_and(|lock| Arc::strong_count(lock) == 1)
            {
                locks.remove(key);
            }
        }
        before - locks.len()
    }
}

impl<V: Send> Sweep for Core<V> {
    fn sweep(&self) -> usize {
        self.cleanup_expired()
    }
}

// == Cache Store ==
/// Thread-safe TTL cache for values of one type.
///
/// Share it between threads by reference or behind an `Arc`. Values are cloned
/// out on every hit, so wrap large payloads in an `Arc` before caching them.
pub struct Store<V> {
    core: Arc<Core<V>>,
    policy: Arc<dyn EvictionPolicy>,
    capacity: usize,
    default_ttl: u64,
    ttl_jitter_ratio: f64,
    max_value_bytes: Option<usize>,
    sweeper: Mutex<Option<Sweeper>>,
}

impl<V> Store<V>
where
    V: Clone + Serialize + Send + 'static,
{
    // == Constructors ==
    /// Creates a store using the configured policy and the system clock.
    ///
    /// Starts the cleanup thread when `cleanup_interval` is set.
    pub fn new(config: &CacheConfig) -> Result<Self> {
        Self::with_parts(config, config.eviction_policy.into_policy(), Arc::new(SystemClock))
    }

    /// Creates a store that reads time from `clock`.
    pub fn with_clock(config: &CacheConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        Self::with_parts(config, config.eviction_policy.into_policy(), clock)
    }

    /// Creates a store with a custom eviction policy and clock.
    ///
    /// `config.eviction_policy` is ignored in favour of `policy`.
    pub fn with_parts(
        config: &CacheConfig,
        policy: Arc<dyn EvictionPolicy>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let track_recency = config
            .track_recency
            .unwrap_or_else(|| policy.needs_recency());
        if policy.needs_recency() && !track_recency {
            return Err(CacheError::InvalidConfig(format!(
                "eviction policy '{}' requires recency tracking",
                policy.name()
            )));
        }

        let store = Self {
            core: Arc::new(Core {
                state: Mutex::new(State {
                    entries: HashMap::new(),
                    order: track_recency.then(RecencyOrder::new),
                }),
                key_locks: Mutex::new(HashMap::new()),
                stats: StatsRecorder::new(),
                clock,
            }),
            policy,
            capacity: config.capacity,
            default_ttl: config.default_ttl,
            ttl_jitter_ratio: config.ttl_jitter_ratio,
            max_value_bytes: config.max_value_bytes,
            sweeper: Mutex::new(None),
        };

        if let Some(secs) = config.cleanup_interval {
            store.start_sweeper(StdDuration::from_secs(secs))?;
        }

        debug!(
            "Cache store created: capacity={}, default_ttl={}s, policy={}, recency={}",
            store.capacity,
            store.default_ttl,
            store.policy.name(),
            track_recency
        );
        Ok(store)
    }

    // == Get ==
    /// Retrieves a value by key.
    ///
    /// A hit bumps the entry's access count and recency and credits any
    /// recorded compute cost to the time-saved counter. An expired entry is
    /// removed on the spot and reported as a miss.
    pub fn get(&self, key: &str) -> Option<V> {
        self.lookup(key, true)
    }

    fn lookup(&self, key: &str, count_miss: bool) -> Option<V> {
        let now = self.core.clock.now();
        let stats = &self.core.stats;
        let mut guard = self.core.state.lock();
        let state = &mut *guard;

        let expired = match state.entries.get(key) {
            None => {
                if count_miss {
                    stats.record_miss();
                }
                debug!("Cache miss: {}", short_key(key));
                return None;
            }
            Some(entry) => entry.is_expired(now),
        };

        if expired {
            if let Some(entry) = state.remove(key) {
                debug!(
                    "Cache expired: {} (age={}ms)",
                    short_key(key),
                    entry.age(now).num_milliseconds()
                );
            }
            stats.record_expirations(1);
            if count_miss {
                stats.record_miss();
            }
            return None;
        }

        let entry = state.entries.get_mut(key)?;
        entry.record_access(now);
        stats.record_hit();
        if let Some(saved) = entry.last_compute_cost() {
            stats.record_time_saved(saved);
        }
        debug!(
            "Cache hit: {} (age={}ms, ttl={}ms)",
            short_key(key),
            entry.age(now).num_milliseconds(),
            entry.ttl_remaining(now).num_milliseconds()
        );
        let value = entry.value.clone();
        state.touch(key);
        Some(value)
    }

    // == Peek ==
    /// Returns a live value without touching counters, recency or stats.
    pub fn peek(&self, key: &str) -> Option<V> {
        let now = self.core.clock.now();
        let state = self.core.state.lock();
        state
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone())
    }

    /// Describes an entry without returning its value or touching stats.
    ///
    /// Expired entries that have not been swept yet are still described.
    pub fn info(&self, key: &str) -> Option<EntryInfo> {
        let now = self.core.clock.now();
        let state = self.core.state.lock();
        state.entries.get(key).map(|entry| entry.info(key, now))
    }

    // == Set ==
    /// Stores a value, replacing any entry already under `key`.
    ///
    /// Uses the default TTL when `ttl` (seconds) is `None`; either way the TTL
    /// is jittered by the configured ratio. Values over `max_value_bytes` are
    /// silently not stored. Entries are evicted by policy until the store is
    /// back within capacity.
    pub fn set(
        &self,
        key: impl Into<String>,
        value: V,
        ttl: Option<u64>,
        metadata: Option<Metadata>,
    ) {
        let key = key.into();
        if !self.value_size_ok(&key, &value) {
            return;
        }

        let ttl = self.effective_ttl(ttl);
        let entry = Entry::new(value, self.core.clock.now(), ttl, metadata);

        let mut guard = self.core.state.lock();
        let state = &mut *guard;
        state.entries.insert(key.clone(), entry);
        state.touch(&key);
        self.core.stats.record_set();
        self.enforce_capacity(state);

        debug!(
            "Cache set: {} (ttl={}ms)",
            short_key(&key),
            ttl.num_milliseconds()
        );
    }

    fn effective_ttl(&self, ttl: Option<u64>) -> Duration {
        let secs = ttl.unwrap_or(self.default_ttl).min(MAX_TTL_SECS);
        let base_ms = secs as i64 * 1000;
        let delta = (base_ms as f64 * self.ttl_jitter_ratio) as i64;
        let jittered = if delta > 0 {
            base_ms + rand::thread_rng().gen_range(-delta..=delta)
        } else {
            base_ms
        };
        Duration::milliseconds(jittered.max(MIN_TTL_MS))
    }

    /// Size check against `max_value_bytes`, measured as JSON.
    ///
    /// Values that cannot be serialized are let through.
    fn value_size_ok(&self, key: &str, value: &V) -> bool {
        let Some(limit) = self.max_value_bytes else {
            return true;
        };

        let mut counter = ByteCounter::default();
        match serde_json::to_writer(&mut counter, value) {
            Ok(()) if counter.0 > limit => {
                debug!(
                    "Cache skip (value too large): {} ({} > {} bytes)",
                    short_key(key),
                    counter.0,
                    limit
                );
                false
            }
            Ok(()) => true,
            Err(err) => {
                warn!(
                    "Could not estimate value size for {}: {}",
                    short_key(key),
                    err
                );
                true
            }
        }
    }

    /// Evicts until within capacity. Each pass removes one entry or stops.
    fn enforce_capacity(&self, state: &mut State<V>) {
        while state.entries.len() > self.capacity {
            let victim = {
                let mut candidates = state
                    .entries
                    .iter()
                    .map(|(key, entry)| entry.candidate(key));
                self.policy
                    .select_victim(&mut candidates, state.order.as_ref())
            };

            match victim.filter(|key| state.remove(key).is_some()) {
                Some(key) => {
                    self.core.stats.record_eviction();
                    debug!(
                        "Evicted {} (policy={})",
                        short_key(&key),
                        self.policy.name()
                    );
                }
                None => {
                    self.core.stats.record_stuck_eviction();
                    warn!(
                        "Eviction policy '{}' offered no removable victim, cache holds {} entries (capacity {})",
                        self.policy.name(),
                        state.entries.len(),
                        self.capacity
                    );
                    break;
                }
            }
        }
    }

    // == Get Or Compute ==
    /// Returns the cached value, computing and caching it on a miss.
    ///
    /// Only one `compute` per key runs at a time across all callers. Callers
    /// that arrive while it runs wait for it and then read its result. An
    /// error from `compute` is returned unchanged and nothing is cached; the
    /// next waiter, if any, computes in turn.
    ///
    /// The computation's duration is stored under [`LAST_COMPUTE_MS`] in the
    /// entry metadata unless the caller already supplied that key.
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
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let key_lock = self.core.key_lock(key);
        let result = {
            let _guard = match key_lock.try_lock() {
                Some(guard) => guard,
                None => {
                    self.core.stats.record_contention();
                    debug!("Waiting on in-flight computation: {}", short_key(key));
                    key_lock.lock()
                }
            };
            self.compute_locked(key, compute, ttl, metadata)
        };
        drop(key_lock);

        self.core.reclaim_key_locks();
        result
    }

    /// Runs with the key's compute lock held.
    fn compute_locked<F, E>(
        &self,
        key: &str,
        compute: F,
        ttl: Option<u64>,
        metadata: Option<Metadata>,
    ) -> std::result::Result<V, E>
    where
        F: FnOnce() -> std::result::Result<V, E>,
    {
        // Another caller may have stored it since our first lookup; that
        // first lookup already counted the miss.
        if let Some(value) = self.lookup(key, false) {
            return Ok(value);
        }

        let started = Instant::now();
        let value = compute()?;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        let mut metadata = metadata.unwrap_or_default();
        metadata
            .entry(LAST_COMPUTE_MS.to_string())
            .or_insert_with(|| json!(elapsed_ms));
        self.set(key, value.clone(), ttl, Some(metadata));
        Ok(value)
    }

    // == Invalidation ==
    /// Removes an entry. Returns whether it existed.
    pub fn invalidate(&self, key: &str) -> bool {
        let existed = {
            let mut state = self.core.state.lock();
            let existed = state.remove(key).is_some();
            if existed {
                self.core.stats.record_invalidations(1);
            }
            existed
        };
        if existed {
            debug!("Cache invalidated: {}", short_key(key));
        }
        self.core.reclaim_key_locks();
        existed
    }

    /// Removes every entry whose key starts with `prefix`, in one critical
    /// section. Returns how many were removed.
    ///
    /// Meant for namespaced keys such as `ensemble:<digest>`.
    pub fn invalidate_pattern(&self, prefix: &str) -> usize {
        let removed = {
            let mut state = self.core.state.lock();
            let matching: Vec<String> = state
                .entries
                .keys()
                .filter(|key| key.starts_with(prefix))
                .cloned()
                .collect();
            for key in &matching {
                state.remove(key);
            }
            self.core.stats.record_invalidations(matching.len() as u64);
            matching.len()
        };
        if removed > 0 {
            info!("Cache invalidated {} entries with prefix '{}'", removed, prefix);
        }
        self.core.reclaim_key_locks();
        removed
    }

    /// Drops every entry. Counters are kept.
    pub fn clear(&self) {
        let dropped = {
            let mut state = self.core.state.lock();
            let dropped = state.entries.len();
            state.entries.clear();
            if let Some(order) = &mut state.order {
                order.clear();
            }
            dropped
        };
        self.core.reclaim_key_locks();
        info!("Cache cleared ({} entries)", dropped);
    }

    // == Cleanup Expired ==
    /// Removes all expired entries. Returns the number removed.
    pub fn cleanup_expired(&self) -> usize {
        self.core.cleanup_expired()
    }

    // == Stats ==
    /// Returns a snapshot of the cache statistics.
    pub fn stats(&self) -> CacheStats {
        let state = self.core.state.lock();
        self.core.stats.snapshot(state.entries.len())
    }

    // == Length ==
    /// Returns the current number of entries, expired ones included.
    pub fn len(&self) -> usize {
        self.core.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of per-key compute locks currently allocated.
    pub fn key_lock_count(&self) -> usize {
        self.core.key_locks.lock().len()
    }

    // == Background Cleanup ==
    fn start_sweeper(&self, interval: StdDuration) -> io::Result<()> {
        let mut slot = self.sweeper.lock();
        if slot.as_ref().is_some_and(Sweeper::is_running) {
            return Ok(());
        }
        *slot = Some(Sweeper::spawn(Arc::downgrade(&self.core), interval)?);
        Ok(())
    }

    /// Whether a cleanup thread is running for this store.
    pub fn is_sweeping(&self) -> bool {
        self.sweeper.lock().as_ref().is_some_and(Sweeper::is_running)
    }

    /// Stops the cleanup thread, if any.
    ///
    /// Safe to call more than once. A store that is dropped without `close`
    /// leaves its thread parked until the next interval, after which it exits
    /// on its own; cache contents are never affected either way.
    pub fn close(&self) {
        let sweeper = self.sweeper.lock().take();
        if let Some(sweeper) = sweeper {
            sweeper.stop();
        }
    }
}

/// Shortens a key for log output.
pub(crate) fn short_key(key: &str) -> &str {
    match key.char_indices().nth(LOG_KEY_CHARS) {
        Some((idx, _)) => &key[..idx],
        None => key,
    }
}

/// `io::Write` sink that only counts bytes.
#[derive(Default)]
struct ByteCounter(usize);

impl io::Write for ByteCounter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0 += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

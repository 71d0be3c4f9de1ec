//! Memo Cache - An in-process memoization cache
//!
//! Thread-safe TTL cache with pluggable eviction (LRU, LFU, soonest-expiry),
//! per-key dogpile prevention for expensive computations, statistics and an
//! optional background cleanup thread.
//!
//! # Example
//! ```ignore
//! use memo_cache::{create_cache, CacheConfig};
//!
//! let cache = create_cache::<String>(&CacheConfig::default())?;
//! let answer = cache.get_or_compute("model:42", || Ok::<_, std::io::Error>(expensive()), None, None)?;
//! cache.close();
//! ```

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod tasks;

pub use cache::{CacheStats, EntryInfo, EvictionPolicy, EvictionStrategy, Metadata, Store};
pub use client::{create_cache, CacheClient};
pub use config::CacheConfig;
pub use error::{CacheError, Result};

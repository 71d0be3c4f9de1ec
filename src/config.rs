//! Configuration Module
//!
//! Handles loading and validating cache configuration, either from environment
//! variables or embedded in a larger application config via serde.

use std::env;
use std::str::FromStr;

use serde::Deserialize;

use crate::cache::{
    EvictionStrategy, DEFAULT_CAPACITY, DEFAULT_TTL_SECS, DEFAULT_TTL_JITTER_RATIO,
};
use crate::error::{CacheError, Result};

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entries the cache can hold
    pub capacity: usize,
    /// Default TTL in seconds for entries without explicit TTL
    pub default_ttl: u64,
    /// +/- fraction applied to every TTL to spread out expiry
    pub ttl_jitter_ratio: f64,
    /// Values whose JSON encoding is larger than this are not cached
    pub max_value_bytes: Option<usize>,
    /// Victim selection strategy when over capacity
    pub eviction_policy: EvictionStrategy,
    /// Background sweep interval in seconds, None = no sweeper
    pub cleanup_interval: Option<u64>,
    /// Force recency bookkeeping on or off, None = only when the policy needs it
    pub track_recency: Option<bool>,
    /// Master switch for the client facade
    pub enabled: bool,
    /// Log every facade HIT/MISS at info level
    pub log_hits: bool,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_CAPACITY` - Maximum cache entries (default: 512)
    /// - `CACHE_DEFAULT_TTL` - Default TTL in seconds (default: 3600)
    /// - `CACHE_TTL_JITTER` - TTL jitter ratio (default: 0.1)
    /// - `CACHE_MAX_VALUE_BYTES` - Value size limit in bytes (default: unset)
    /// - `CACHE_EVICTION_POLICY` - `lru`, `lfu` or `ttl` (default: lru)
    /// - `CACHE_CLEANUP_INTERVAL` - Sweep frequency in seconds (default: unset)
    /// - `CACHE_ENABLED` - Master switch (default: true)
    /// - `CACHE_LOG_HITS` - Log hits and misses (default: false)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            capacity: parse_var("CACHE_CAPACITY").unwrap_or(defaults.capacity),
            default_ttl: parse_var("CACHE_DEFAULT_TTL").unwrap_or(defaults.default_ttl),
            ttl_jitter_ratio: parse_var("CACHE_TTL_JITTER").unwrap_or(defaults.ttl_jitter_ratio),
            max_value_bytes: parse_var("CACHE_MAX_VALUE_BYTES"),
            eviction_policy: parse_var("CACHE_EVICTION_POLICY")
                .unwrap_or(defaults.eviction_policy),
            cleanup_interval: parse_var("CACHE_CLEANUP_INTERVAL"),
            track_recency: None,
            enabled: parse_var("CACHE_ENABLED").unwrap_or(defaults.enabled),
            log_hits: parse_var("CACHE_LOG_HITS").unwrap_or(defaults.log_hits),
        }
    }

    /// Rejects values the store cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(CacheError::InvalidConfig(
                "capacity must be a positive integer".to_string(),
            ));
        }
        if self.default_ttl == 0 {
            return Err(CacheError::InvalidConfig(
                "default_ttl must be at least one second".to_string(),
            ));
        }
        if !self.ttl_jitter_ratio.is_finite() || !(0.0..1.0).contains(&self.ttl_jitter_ratio) {
            return Err(CacheError::InvalidConfig(format!(
                "ttl_jitter_ratio must be in [0, 1), got {}",
                self.ttl_jitter_ratio
            )));
        }
        if self.cleanup_interval == Some(0) {
            return Err(CacheError::InvalidConfig(
                "cleanup_interval must be at least one second".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            default_ttl: DEFAULT_TTL_SECS,
            ttl_jitter_ratio: DEFAULT_TTL_JITTER_RATIO,
            max_value_bytes: None,
            eviction_policy: EvictionStrategy::Lru,
            cleanup_interval: None,
            track_recency: None,
            enabled: true,
            log_hits: false,
        }
    }
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = CacheConfig::default();
        assert_eq!(config.capacity, 512);
        assert_eq!(config.default_ttl, 3600);
        assert_eq!(config.ttl_jitter_ratio, 0.1);
        assert_eq!(config.max_value_bytes, None);
        assert_eq!(config.eviction_policy, EvictionStrategy::Lru);
        assert_eq!(config.cleanup_interval, None);
        assert!(config.enabled);
        assert!(!config.log_hits);
        assert!(config.validate().is_ok());
    }

    // Env vars are process-global, so every from_env case lives in one test.
    #[test]
    fn test_config_from_env() {
        let vars = [
            "CACHE_CAPACITY",
            "CACHE_DEFAULT_TTL",
            "CACHE_TTL_JITTER",
            "CACHE_MAX_VALUE_BYTES",
            "CACHE_EVICTION_POLICY",
            "CACHE_CLEANUP_INTERVAL",
            "CACHE_ENABLED",
            "CACHE_LOG_HITS",
        ];
        for var in vars {
            env::remove_var(var);
        }
        assert_eq!(CacheConfig::from_env(), CacheConfig::default());

        env::set_var("CACHE_CAPACITY", "64");
        env::set_var("CACHE_DEFAULT_TTL", "120");
        env::set_var("CACHE_TTL_JITTER", "0");
        env::set_var("CACHE_MAX_VALUE_BYTES", "4096");
        env::set_var("CACHE_EVICTION_POLICY", "LFU");
        env::set_var("CACHE_CLEANUP_INTERVAL", "30");
        env::set_var("CACHE_ENABLED", "false");
        env::set_var("CACHE_LOG_HITS", "not-a-bool");

        let config = CacheConfig::from_env();
        assert_eq!(config.capacity, 64);
        assert_eq!(config.default_ttl, 120);
        assert_eq!(config.ttl_jitter_ratio, 0.0);
        assert_eq!(config.max_value_bytes, Some(4096));
        assert_eq!(config.eviction_policy, EvictionStrategy::Lfu);
        assert_eq!(config.cleanup_interval, Some(30));
        assert!(!config.enabled);
        // Unparseable values fall back to the default
        assert!(!config.log_hits);

        for var in vars {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_config_validation() {
        let bad = [
            CacheConfig { capacity: 0, ..Default::default() },
            CacheConfig { default_ttl: 0, ..Default::default() },
            CacheConfig { ttl_jitter_ratio: 1.0, ..Default::default() },
            CacheConfig { ttl_jitter_ratio: -0.1, ..Default::default() },
            CacheConfig { ttl_jitter_ratio: f64::NAN, ..Default::default() },
            CacheConfig { cleanup_interval: Some(0), ..Default::default() },
        ];
        for config in bad {
            assert!(
                matches!(config.validate(), Err(CacheError::InvalidConfig(_))),
                "{:?} should be rejected",
                config
            );
        }
    }

    #[test]
    fn test_config_deserialize_with_defaults() {
        let config: CacheConfig =
            serde_json::from_str(r#"{"capacity": 8, "eviction_policy": "ttl"}"#).unwrap();
        assert_eq!(config.capacity, 8);
        assert_eq!(config.eviction_policy, EvictionStrategy::SoonestExpiry);
        assert_eq!(config.default_ttl, 3600);
    }
}

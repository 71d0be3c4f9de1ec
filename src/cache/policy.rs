//! Eviction Policy Module
//!
//! Victim selection for a store that has grown past its capacity. Policies see
//! only entry bookkeeping, never values, and take no locks of their own.

use std::fmt::{self, Debug};
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::cache::RecencyOrder;
use crate::error::CacheError;

// == Candidate ==
/// Value-free view of one cached entry offered to a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate<'a> {
    pub key: &'a str,
    pub expires_at: DateTime<Utc>,
    pub access_count: u64,
    pub last_accessed_at: DateTime<Utc>,
}

// == Eviction Policy ==
/// Chooses which entry to drop when the store is over capacity.
///
/// Implementations must be deterministic for identical input and must return
/// `None` for an empty store.
pub trait EvictionPolicy: Send + Sync + Debug {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Whether the store has to maintain a [`RecencyOrder`] for this policy.
    fn needs_recency(&self) -> bool {
        false
    }

    /// Returns the key to evict, or `None` if nothing can be evicted.
    ///
    /// `order` is `None` when the store does not track recency.
    fn select_victim(
        &self,
        candidates: &mut dyn Iterator<Item = Candidate<'_>>,
        order: Option<&RecencyOrder>,
    ) -> Option<String>;
}

/// Evicts the least recently used key.
#[derive(Debug, Default, Clone, Copy)]
pub struct LeastRecentlyUsed;

impl EvictionPolicy for LeastRecentlyUsed {
    fn name(&self) -> &'static str {
        "lru"
    }

    fn needs_recency(&self) -> bool {
        true
    }

    fn select_victim(
        &self,
        _candidates: &mut dyn Iterator<Item = Candidate<'_>>,
        order: Option<&RecencyOrder>,
    ) -> Option<String> {
        order.and_then(RecencyOrder::oldest).map(str::to_string)
    }
}

/// Evicts the entry with the fewest hits; ties go to the smallest key.
#[derive(Debug, Default, Clone, Copy)]
pub struct LeastFrequentlyUsed;

impl EvictionPolicy for LeastFrequentlyUsed {
    fn name(&self) -> &'static str {
        "lfu"
    }

    fn select_victim(
        &self,
        candidates: &mut dyn Iterator<Item = Candidate<'_>>,
        _order: Option<&RecencyOrder>,
    ) -> Option<String> {
        candidates
            .min_by(|a, b| {
                a.access_count
                    .cmp(&b.access_count)
                    .then_with(|| a.key.cmp(b.key))
            })
            .map(|c| c.key.to_string())
    }
}

/// Evicts the entry closest to expiry; ties go to the smallest key.
#[derive(Debug, Default, Clone, Copy)]
pub struct SoonestExpiring;

impl EvictionPolicy for SoonestExpiring {
    fn name(&self) -> &'static str {
        "ttl"
    }

    fn select_victim(
        &self,
        candidates: &mut dyn Iterator<Item = Candidate<'_>>,
        _order: Option<&RecencyOrder>,
    ) -> Option<String> {
        candidates
            .min_by(|a, b| a.expires_at.cmp(&b.expires_at).then_with(|| a.key.cmp(b.key)))
            .map(|c| c.key.to_string())
    }
}

// == Eviction Strategy ==
/// Built-in policy selector used by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum EvictionStrategy {
    #[default]
    #[serde(rename = "lru")]
    Lru,
    #[serde(rename = "lfu")]
    Lfu,
    #[serde(rename = "ttl", alias = "soonest_expiry")]
    SoonestExpiry,
}

impl EvictionStrategy {
    /// Instantiates the policy.
    pub fn into_policy(self) -> Arc<dyn EvictionPolicy> {
        match self {
            EvictionStrategy::Lru => Arc::new(LeastRecentlyUsed),
            EvictionStrategy::Lfu => Arc::new(LeastFrequentlyUsed),
            EvictionStrategy::SoonestExpiry => Arc::new(SoonestExpiring),
        }
    }
}

impl fmt::Display for EvictionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EvictionStrategy::Lru => "lru",
            EvictionStrategy::Lfu => "lfu",
            EvictionStrategy::SoonestExpiry => "ttl",
        };
        f.write_str(name)
    }
}

impl FromStr for EvictionStrategy {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lru" => Ok(EvictionStrategy::Lru),
            "lfu" => Ok(EvictionStrategy::Lfu),
            "ttl" | "soonest_expiry" => Ok(EvictionStrategy::SoonestExpiry),
            other => Err(CacheError::InvalidConfig(format!(
                "unknown eviction policy '{}', expected lru, lfu or ttl",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn candidate(key: &str, expires_in: i64, access_count: u64) -> Candidate<'_> {
        let base = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        Candidate {
            key,
            expires_at: base + Duration::seconds(expires_in),
            access_count,
            last_accessed_at: base,
        }
    }

    fn no_candidates() -> std::iter::Empty<Candidate<'static>> {
        std::iter::empty()
    }

    fn select(policy: &dyn EvictionPolicy, pool: &[Candidate<'_>]) -> Option<String> {
        policy.select_victim(&mut pool.iter().copied(), None)
    }

    #[test]
    fn test_all_policies_tolerate_empty_store() {
        let empty = RecencyOrder::new();
        for strategy in [
            EvictionStrategy::Lru,
            EvictionStrategy::Lfu,
            EvictionStrategy::SoonestExpiry,
        ] {
            let policy = strategy.into_policy();
            assert_eq!(
                policy.select_victim(&mut no_candidates(), Some(&empty)),
                None
            );
            assert_eq!(policy.select_victim(&mut no_candidates(), None), None);
        }
    }

    #[test]
    fn test_lru_picks_front_of_order() {
        let mut order = RecencyOrder::new();
        order.touch("a");
        order.touch("b");
        order.touch("a");

        let victim = LeastRecentlyUsed.select_victim(&mut no_candidates(), Some(&order));
        assert_eq!(victim.as_deref(), Some("b"));
    }

    #[test]
    fn test_lru_without_order_has_no_victim() {
        let pool = [candidate("a", 10, 0)];
        assert_eq!(select(&LeastRecentlyUsed, &pool), None);
    }

    #[test]
    fn test_lfu_picks_fewest_hits() {
        let pool = [
            candidate("hot", 10, 9),
            candidate("cold", 10, 1),
            candidate("warm", 10, 4),
        ];
        assert_eq!(select(&LeastFrequentlyUsed, &pool).as_deref(), Some("cold"));
    }

    #[test]
    fn test_lfu_tie_breaks_on_smallest_key() {
        let pool = [
            candidate("m", 10, 2),
            candidate("b", 10, 2),
            candidate("z", 10, 2),
        ];
        assert_eq!(select(&LeastFrequentlyUsed, &pool).as_deref(), Some("b"));
    }

    #[test]
    fn test_soonest_expiring_picks_earliest_deadline() {
        let pool = [
            candidate("late", 300, 0),
            candidate("soon", 5, 50),
            candidate("mid", 60, 0),
        ];
        assert_eq!(select(&SoonestExpiring, &pool).as_deref(), Some("soon"));
    }

    #[test]
    fn test_soonest_expiring_tie_breaks_on_smallest_key() {
        let pool = [candidate("y", 5, 0), candidate("x", 5, 0)];
        assert_eq!(select(&SoonestExpiring, &pool).as_deref(), Some("x"));
    }

    #[test]
    fn test_only_lru_needs_recency() {
        assert!(LeastRecentlyUsed.needs_recency());
        assert!(!LeastFrequentlyUsed.needs_recency());
        assert!(!SoonestExpiring.needs_recency());
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("lru".parse::<EvictionStrategy>().unwrap(), EvictionStrategy::Lru);
        assert_eq!(" LFU ".parse::<EvictionStrategy>().unwrap(), EvictionStrategy::Lfu);
        assert_eq!(
            "ttl".parse::<EvictionStrategy>().unwrap(),
            EvictionStrategy::SoonestExpiry
        );
        assert!(matches!(
            "random".parse::<EvictionStrategy>(),
            Err(CacheError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_strategy_display_round_trips_names() {
        for strategy in [
            EvictionStrategy::Lru,
            EvictionStrategy::Lfu,
            EvictionStrategy::SoonestExpiry,
        ] {
            assert_eq!(strategy.to_string(), strategy.into_policy().name());
            assert_eq!(strategy.to_string().parse::<EvictionStrategy>().unwrap(), strategy);
        }
    }
}

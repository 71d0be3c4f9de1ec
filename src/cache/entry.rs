//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL and access
//! bookkeeping.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::cache::{Candidate, LAST_COMPUTE_MS};

/// Free-form scalar annotations carried alongside a value.
pub type Metadata = HashMap<String, serde_json::Value>;

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
///
/// The value is never mutated in place; a `set` on the same key replaces the
/// whole entry. Only the access counters change after insertion.
#[derive(Debug, Clone)]
pub struct Entry<V> {
    /// The stored value
    pub value: V,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Expiration timestamp
    pub expires_at: DateTime<Utc>,
    /// Number of hits served from this entry
    pub access_count: u64,
    /// Timestamp of the most recent hit (creation time until then)
    pub last_accessed_at: DateTime<Utc>,
    /// Optional caller annotations
    pub metadata: Option<Metadata>,
}

impl<V> Entry<V> {
    // == Constructor ==
    /// Creates a new entry that expires `ttl` after `now`.
    pub fn new(value: V, now: DateTime<Utc>, ttl: Duration, metadata: Option<Metadata>) -> Self {
        Self {
            value,
            created_at: now,
            expires_at: now + ttl,
            access_count: 0,
            last_accessed_at: now,
            metadata,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// Boundary condition: an entry is expired once `now` reaches `expires_at`,
    /// so a fully elapsed TTL never serves one more hit.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Time since the entry was created.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.created_at
    }

    // == Time To Live ==
    /// Remaining lifetime; negative once the entry has expired.
    pub fn ttl_remaining(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at - now
    }

    /// Records a hit.
    pub(crate) fn record_access(&mut self, now: DateTime<Utc>) {
        self.access_count += 1;
        self.last_accessed_at = now;
    }

    /// Duration of the computation that produced this value, if recorded.
    ///
    /// Negative or non-numeric annotations are ignored.
    pub fn last_compute_cost(&self) -> Option<std::time::Duration> {
        let ms = self.metadata.as_ref()?.get(LAST_COMPUTE_MS)?.as_f64()?;
        if !ms.is_finite() || ms < 0.0 {
            return None;
        }
        Some(std::time::Duration::from_nanos((ms * 1_000_000.0).round() as u64))
    }

    /// Bookkeeping view handed to eviction policies.
    pub fn candidate<'a>(&'a self, key: &'a str) -> Candidate<'a> {
        Candidate {
            key,
            expires_at: self.expires_at,
            access_count: self.access_count,
            last_accessed_at: self.last_accessed_at,
        }
    }

    /// Builds a value-free description of this entry.
    pub fn info(&self, key: &str, now: DateTime<Utc>) -> EntryInfo {
        EntryInfo {
            key: key.to_string(),
            created_at: self.created_at,
            expires_at: self.expires_at,
            last_accessed_at: self.last_accessed_at,
            age_ms: self.age(now).num_milliseconds(),
            ttl_remaining_ms: self.ttl_remaining(now).num_milliseconds(),
            access_count: self.access_count,
            metadata: self.metadata.clone(),
        }
    }
}

// == Entry Info ==
/// Metadata about a cached entry, without its value.
#[derive(Debug, Clone, Serialize)]
pub struct EntryInfo {
    pub key: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub age_ms: i64,
    /// Negative once the entry has expired
    pub ttl_remaining_ms: i64,
    pub access_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry_with_ttl(ttl_secs: i64) -> (Entry<String>, DateTime<Utc>) {
        let now = Utc::now();
        let entry = Entry::new("test_value".to_string(), now, Duration::seconds(ttl_secs), None);
        (entry, now)
    }

    #[test]
    fn test_entry_creation() {
        let (entry, now) = entry_with_ttl(60);
        assert_eq!(entry.value, "test_value");
        assert_eq!(entry.created_at, now);
        assert_eq!(entry.last_accessed_at, now);
        assert_eq!(entry.expires_at, now + Duration::seconds(60));
        assert_eq!(entry.access_count, 0);
        assert!(!entry.is_expired(now));
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let (entry, now) = entry_with_ttl(1);
        assert!(!entry.is_expired(now + Duration::milliseconds(999)));
        // Expired exactly at expires_at
        assert!(entry.is_expired(now + Duration::seconds(1)));
    }

    #[test]
    fn test_age_and_ttl_remaining() {
        let (entry, now) = entry_with_ttl(10);
        let later = now + Duration::seconds(4);
        assert_eq!(entry.age(later), Duration::seconds(4));
        assert_eq!(entry.ttl_remaining(later), Duration::seconds(6));
    }

    #[test]
    fn test_ttl_remaining_goes_negative() {
        let (entry, now) = entry_with_ttl(1);
        let later = now + Duration::seconds(3);
        assert_eq!(entry.ttl_remaining(later), Duration::seconds(-2));
    }

    #[test]
    fn test_record_access() {
        let (mut entry, now) = entry_with_ttl(10);
        let later = now + Duration::seconds(1);
        entry.record_access(later);
        entry.record_access(later);
        assert_eq!(entry.access_count, 2);
        assert_eq!(entry.last_accessed_at, later);
        assert_eq!(entry.created_at, now);
    }

    #[test]
    fn test_last_compute_cost() {
        let now = Utc::now();
        let mut metadata = Metadata::new();
        metadata.insert(LAST_COMPUTE_MS.to_string(), json!(250.0));
        let entry = Entry::new(1u32, now, Duration::seconds(5), Some(metadata));
        assert_eq!(
            entry.last_compute_cost(),
            Some(std::time::Duration::from_millis(250))
        );

        let plain = Entry::new(1u32, now, Duration::seconds(5), None);
        assert_eq!(plain.last_compute_cost(), None);

        let mut bogus = Metadata::new();
        bogus.insert(LAST_COMPUTE_MS.to_string(), json!("slow"));
        let entry = Entry::new(1u32, now, Duration::seconds(5), Some(bogus));
        assert_eq!(entry.last_compute_cost(), None);

        let mut negative = Metadata::new();
        negative.insert(LAST_COMPUTE_MS.to_string(), json!(-3));
        let entry = Entry::new(1u32, now, Duration::seconds(5), Some(negative));
        assert_eq!(entry.last_compute_cost(), None);
    }

    #[test]
    fn test_info_omits_value() {
        let (entry, now) = entry_with_ttl(10);
        let info = entry.info("model:abc", now + Duration::seconds(2));
        assert_eq!(info.key, "model:abc");
        assert_eq!(info.age_ms, 2000);
        assert_eq!(info.ttl_remaining_ms, 8000);

        let json = serde_json::to_value(&info).unwrap();
        assert!(json.get("value").is_none());
        assert!(json.get("metadata").is_none());
        assert_eq!(json["access_count"], 0);
    }
}

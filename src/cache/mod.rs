//! Cache Module
//!
//! Provides in-memory memoization with TTL expiration, pluggable eviction and
//! per-key dogpile prevention.

mod clock;
mod entry;
mod policy;
mod recency;
mod stats;
mod store;


// Re-export public types
pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::{Entry, EntryInfo, Metadata};
pub use policy::{
    Candidate, EvictionPolicy, EvictionStrategy, LeastFrequentlyUsed, LeastRecentlyUsed,
    SoonestExpiring,
};
pub use recency::RecencyOrder;
pub use stats::{CacheStats, StatsRecorder};
pub use store::Store;
pub(crate) use store::short_key;

// == Public Constants ==
/// Default maximum number of entries
pub const DEFAULT_CAPACITY: usize = 512;
/// Default TTL in seconds
pub const DEFAULT_TTL_SECS: u64 = 3600;
/// Default +/- TTL jitter ratio
pub const DEFAULT_TTL_JITTER_RATIO: f64 = 0.1;
/// Metadata key carrying the duration of the computation that produced a value
pub const LAST_COMPUTE_MS: &str = "last_compute_ms";

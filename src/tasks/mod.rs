//! Background Tasks Module
//!
//! Contains background work that runs alongside a cache.
//!
//! # Tasks
//! - TTL Cleanup: Removes expired cache entries at a configured interval

mod cleanup;

pub use cleanup::{Sweep, Sweeper, SHUTDOWN_TIMEOUT};

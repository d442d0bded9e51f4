//! # ttlset - A Bounded, Thread-Safe Expiring Set
//!
//! ttlset keeps track of keys that were seen recently. Every key expires a
//! fixed TTL after it was last added, the set can be capped at a maximum
//! size, and an optional background task sweeps out expired keys.
//!
//! Typical uses are idempotency keys and dedup markers: "have I processed
//! this request id in the last five minutes?"
//!
//! ## Features
//!
//! - **Generic Keys**: Any `Eq + Hash + Clone` type, looked up by borrowed form
//! - **TTL Refresh**: Adding a present key resets its expiry
//! - **Bounded**: Oldest-first eviction once `max_size` is exceeded
//! - **Lazy + Active Expiry**: Checked on read, swept on demand or on a timer
//! - **Thread Safe**: One internal lock; share freely behind an `Arc`
//!
//! ## Quick Start
//!
//! ```ignore
//! use ttlset::{ExpiringSet, SetConfig};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = SetConfig::new(Duration::from_secs(300))
//!         .with_max_size(100_000)
//!         .with_sweep_interval(Duration::from_secs(10));
//!
//!     // The reaper is spawned on the current runtime
//!     let seen: Arc<ExpiringSet<String>> = Arc::new(ExpiringSet::new(config).unwrap());
//!
//!     if seen.insert("request-1234".to_string()) {
//!         // first time we see this request, process it
//!     }
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`storage`]: The expiring set, its configuration and its reaper
//!
//! ## Design Highlights
//!
//! ### One Lock
//!
//! The key map and the insertion-order index are updated together under a
//! single mutex. Operations are short (O(1) amortized for add and lookup,
//! O(k log n) for a sweep removing k keys), so one lock does not starve
//! callers.
//!
//! ### Lazy + Active Expiry
//!
//! Keys are expired in two ways:
//! 1. **Lazy**: When a key is looked up, we check if it's expired
//! 2. **Active**: `sweep()` removes every expired key, called by you or by
//!    the background reaper
//!
//! `len()` counts what is stored, so it can include expired keys that no
//! sweep has removed yet.

pub mod storage;

// Re-export commonly used types for convenience
pub use storage::{ConfigError, Entry, ExpiringSet, SetConfig, SetStats};

/// Version of ttlset
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

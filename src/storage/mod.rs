//! Storage Module
//!
//! This module provides the expiring set and everything it needs: its
//! configuration layer and the background reaper that sweeps it.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     ExpiringSet<K>                          │
//! │  ┌───────────────────────────────────────────────────────┐  │
//! │  │ Mutex<State>                                          │  │
//! │  │   HashMap<K, Entry>   +   BTreeMap<sequence, K>       │  │
//! │  └───────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                            │ Weak
//!              ┌─────────────┴─────────────┐
//!              │         Reaper            │
//!              │  (Background Tokio Task)  │
//!              └───────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Lazy Expiry**: `contains` never reports an expired key
//! - **Active Expiry**: An optional reaper sweeps expired keys on a timer
//! - **Bounded**: Oldest-first eviction keeps the set under `max_size`
//! - **Refresh**: Re-adding a key resets its TTL and its eviction position
//!
//! ## Example
//!
//! ```
//! use ttlset::storage::ExpiringSet;
//! use std::time::Duration;
//!
//! let seen: ExpiringSet<u64> = ExpiringSet::with_ttl(Duration::from_secs(60));
//!
//! assert!(seen.insert(42));  // first sighting
//! assert!(!seen.insert(42)); // duplicate within the TTL
//! assert!(seen.contains(&42));
//! ```

pub mod config;
mod reaper;
pub mod set;

// Re-export commonly used types
pub use config::{parse_secs, ConfigError, SetConfig};
pub use set::{Entry, ExpiringSet, SetStats};

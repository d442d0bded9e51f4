//! Thread-Safe Expiring Set
//!
//! This module implements [`ExpiringSet`], a set of keys that each expire a
//! fixed TTL after they were last added, bounded by an optional maximum size.
//!
//! ## Design Decisions
//!
//! 1. **One Lock**: The key map, the insertion-order index and the sequence
//!    counter sit behind a single `Mutex`, so no caller ever sees them out of
//!    step with each other.
//! 2. **Lazy Expiry**: `contains` compares against the clock on every call, so
//!    an expired key is never reported live even if no sweep has run.
//! 3. **Oldest-First Eviction**: When the set grows past `max_size`, entries
//!    are evicted by insertion sequence. Expiry times are not consulted.
//!
//! ## Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  Mutex<State>                            │
//! │                                                          │
//! │   entries: HashMap<K, Entry>     order: BTreeMap<u64, K> │
//! │   ┌──────────────────────────┐   ┌─────────────────────┐ │
//! │   │ "a" -> (t+ttl, seq 7)    │   │ 3 -> "c"  (oldest)  │ │
//! │   │ "b" -> (t+ttl, seq 5)    │   │ 5 -> "b"            │ │
//! │   │ "c" -> (t+ttl, seq 3)    │   │ 7 -> "a"  (newest)  │ │
//! │   └──────────────────────────┘   └─────────────────────┘ │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Every entry shares the same TTL and `now` is read while the lock is held,
//! so expiry times never decrease along `order`. A sweep walks `order` from
//! the front and stops at the first live entry.

use crate::storage::config::{ConfigError, SetConfig};
use crate::storage::reaper::Reaper;
use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Bookkeeping stored for each key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    /// When this entry expires (None = the TTL overflowed the clock, never expires)
    pub expires_at: Option<Instant>,
    /// Insertion order, unique within a set
    pub sequence: u64,
}

impl Entry {
    fn new(now: Instant, ttl: Duration, sequence: u64) -> Self {
        Self {
            expires_at: now.checked_add(ttl),
            sequence,
        }
    }

    /// Checks if this entry has expired at `now`.
    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.map(|exp| now >= exp).unwrap_or(false)
    }

    /// Time left before this entry expires, zero if it already has.
    pub fn remaining_at(&self, now: Instant) -> Duration {
        self.expires_at
            .map(|exp| exp.saturating_duration_since(now))
            .unwrap_or(Duration::MAX)
    }
}

/// Counters describing what a set has done since it was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetStats {
    /// Entries currently stored, including expired ones not yet swept
    pub len: usize,
    /// Total `add`/`insert` calls
    pub adds: u64,
    /// Adds that hit a key which was still live
    pub refreshes: u64,
    /// Entries removed to respect `max_size`
    pub evicted: u64,
    /// Expired entries removed by sweeps or lazy expiry
    pub expired: u64,
    /// Number of sweeps run, explicit or background
    pub sweeps: u64,
}

pub(crate) struct State<K> {
    entries: HashMap<K, Entry>,
    order: BTreeMap<u64, K>,
    next_sequence: u64,
    reaper_stopped: bool,
}

impl<K> State<K> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: BTreeMap::new(),
            next_sequence: 0,
            reaper_stopped: false,
        }
    }
}

impl<K: Eq + Hash + Clone> State<K> {
    /// Stores `key` as the newest entry, returning the entry it replaced.
    fn upsert(&mut self, key: K, now: Instant, ttl: Duration) -> Option<Entry> {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let previous = self
            .entries
            .insert(key.clone(), Entry::new(now, ttl, sequence));
        if let Some(prev) = previous {
            self.order.remove(&prev.sequence);
        }
        self.order.insert(sequence, key);

        previous
    }

    fn remove<Q>(&mut self, key: &Q) -> Option<Entry>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.sequence);
        Some(entry)
    }

    /// Drops the oldest entries until at most `max_size` remain.
    fn evict_to(&mut self, max_size: usize) -> usize {
        let mut evicted = 0;
        while self.entries.len() > max_size {
            match self.order.pop_first() {
                Some((_, key)) => {
                    self.entries.remove(&key);
                    evicted += 1;
                }
                None => break,
            }
        }
        evicted
    }

    /// Removes every entry with `expires_at <= now`.
    fn sweep(&mut self, now: Instant) -> usize {
        let mut removed = 0;
        loop {
            let expired = match self.order.first_key_value() {
                Some((_, key)) => self
                    .entries
                    .get(key)
                    .map(|entry| entry.is_expired_at(now))
                    .unwrap_or(true),
                None => break,
            };
            if !expired {
                break;
            }
            if let Some((_, key)) = self.order.pop_first() {
                self.entries.remove(&key);
                removed += 1;
            }
        }
        debug_assert_eq!(self.entries.len(), self.order.len());
        removed
    }

    fn clear(&mut self) -> usize {
        let cleared = self.entries.len();
        self.entries.clear();
        self.order.clear();
        cleared
    }
}

/// State shared between an [`ExpiringSet`] and its background reaper.
///
/// The reaper only ever holds a `Weak` reference to this.
pub(crate) struct Shared<K> {
    state: Mutex<State<K>>,
    ttl: Duration,
    max_size: Option<usize>,

    adds: AtomicU64,
    refreshes: AtomicU64,
    evicted: AtomicU64,
    expired: AtomicU64,
    sweeps: AtomicU64,
}

impl<K> Shared<K> {
    /// Locks the state. A panic while holding the lock cannot leave the map
    /// and the order index disagreeing, so poisoning is ignored.
    pub(crate) fn lock(&self) -> MutexGuard<'_, State<K>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K: Eq + Hash + Clone> Shared<K> {
    fn new(ttl: Duration, max_size: Option<usize>) -> Self {
        Self {
            state: Mutex::new(State::new()),
            ttl,
            max_size,
            adds: AtomicU64::new(0),
            refreshes: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
            expired: AtomicU64::new(0),
            sweeps: AtomicU64::new(0),
        }
    }

    fn sweep_locked(&self, state: &mut State<K>) -> usize {
        let expired = state.sweep(Instant::now());

        self.sweeps.fetch_add(1, Ordering::Relaxed);
        self.expired.fetch_add(expired as u64, Ordering::Relaxed);

        if expired > 0 {
            debug!(
                expired = expired,
                keys_remaining = state.entries.len(),
                "Expired keys swept"
            );
        }
        expired
    }

    pub(crate) fn sweep(&self) -> usize {
        let mut state = self.lock();
        self.sweep_locked(&mut state)
    }

    /// Sweep on behalf of the reaper. Returns `None` once the reaper has been
    /// stopped, checked under the same lock the sweep runs under.
    pub(crate) fn reap(&self) -> Option<usize> {
        let mut state = self.lock();
        if state.reaper_stopped {
            return None;
        }
        Some(self.sweep_locked(&mut state))
    }
}

/// A bounded set of keys that expire a fixed TTL after their last add.
///
/// # Thread Safety
///
/// All methods take `&self`; share the set across threads or tasks with an
/// `Arc`. Every operation runs under one internal mutex and is linearizable
/// with respect to it.
///
/// # Example
///
/// ```
/// use ttlset::storage::{ExpiringSet, SetConfig};
/// use std::time::Duration;
///
/// let config = SetConfig::new(Duration::from_secs(60)).with_max_size(2);
/// let seen: ExpiringSet<String> = ExpiringSet::new(config).unwrap();
///
/// seen.add("req-1".to_string());
/// seen.add("req-2".to_string());
/// seen.add("req-3".to_string());
///
/// // The oldest key was evicted to respect max_size
/// assert!(!seen.contains("req-1"));
/// assert!(seen.contains("req-3"));
/// assert_eq!(seen.len(), 2);
/// ```
pub struct ExpiringSet<K> {
    shared: Arc<Shared<K>>,
    config: SetConfig,
    reaper: Option<Reaper>,
}

impl<K> std::fmt::Debug for ExpiringSet<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiringSet")
            .field("ttl", &self.config.ttl)
            .field("max_size", &self.config.max_size)
            .field("sweep_interval", &self.config.sweep_interval)
            .field("len", &self.shared.lock().entries.len())
            .finish()
    }
}

impl<K> ExpiringSet<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    /// Creates a set from `config`.
    ///
    /// If `config.sweep_interval` is set, a background reaper is spawned on
    /// the current Tokio runtime and runs until [`stop_reaper`](Self::stop_reaper)
    /// is called or the set is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroSweepInterval`] for a zero interval and
    /// [`ConfigError::NoRuntime`] if a reaper is requested outside a runtime.
    pub fn new(config: SetConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let shared = Arc::new(Shared::new(config.ttl, config.max_size));
        let reaper = match config.sweep_interval {
            Some(interval) => Some(Reaper::start(Arc::downgrade(&shared), interval)?),
            None => None,
        };

        debug!(
            ttl_ms = config.ttl.as_millis() as u64,
            max_size = ?config.max_size,
            reaper = reaper.is_some(),
            "Expiring set created"
        );

        Ok(Self {
            shared,
            config,
            reaper,
        })
    }
}

impl<K: Eq + Hash + Clone> ExpiringSet<K> {
    /// Creates an unbounded set with no background reaper.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            shared: Arc::new(Shared::new(ttl, None)),
            config: SetConfig::new(ttl),
            reaper: None,
        }
    }

    /// Adds `key`, or refreshes its expiry and moves it to the newest
    /// position if it is already stored.
    ///
    /// If the set then holds more than `max_size` entries, the oldest ones
    /// are evicted regardless of their remaining TTL.
    pub fn add(&self, key: K) {
        self.insert(key);
    }

    /// Same as [`add`](Self::add), and reports whether `key` was absent or
    /// expired before the call.
    ///
    /// The check and the add happen under one lock, which makes this the
    /// primitive for "have I seen this request recently?".
    pub fn insert(&self, key: K) -> bool {
        let mut state = self.shared.lock();
        let now = Instant::now();

        self.shared.adds.fetch_add(1, Ordering::Relaxed);

        let was_live = state
            .upsert(key, now, self.shared.ttl)
            .map(|prev| !prev.is_expired_at(now))
            .unwrap_or(false);
        if was_live {
            self.shared.refreshes.fetch_add(1, Ordering::Relaxed);
        }

        if let Some(max_size) = self.shared.max_size {
            let evicted = state.evict_to(max_size);
            if evicted > 0 {
                self.shared
                    .evicted
                    .fetch_add(evicted as u64, Ordering::Relaxed);
                debug!(
                    evicted = evicted,
                    max_size = max_size,
                    "Evicted oldest keys"
                );
            }
        }

        !was_live
    }

    /// Returns `true` if `key` is stored and has not expired.
    ///
    /// An expired entry found here is removed on the spot.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut state = self.shared.lock();
        let now = Instant::now();

        let expired = match state.entries.get(key) {
            Some(entry) => entry.is_expired_at(now),
            None => return false,
        };

        if expired {
            state.remove(key);
            self.shared.expired.fetch_add(1, Ordering::Relaxed);
            trace!("Lazily removed expired key");
            return false;
        }

        true
    }

    /// Removes `key`, returning `true` if it was live.
    pub fn remove<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut state = self.shared.lock();
        state
            .remove(key)
            .map(|entry| !entry.is_expired_at(Instant::now()))
            .unwrap_or(false)
    }

    /// Returns the time left before `key` expires, or `None` if it is absent
    /// or already expired.
    pub fn remaining_ttl<Q>(&self, key: &Q) -> Option<Duration>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let state = self.shared.lock();
        let now = Instant::now();

        state
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired_at(now))
            .map(|entry| entry.remaining_at(now))
    }

    /// Removes every expired entry and returns how many were removed.
    ///
    /// This is the same routine the background reaper runs.
    pub fn sweep(&self) -> usize {
        self.shared.sweep()
    }

    /// Removes every entry, live or not.
    pub fn clear(&self) {
        let cleared = self.shared.lock().clear();
        debug!(cleared = cleared, "Expiring set cleared");
    }
}

impl<K> ExpiringSet<K> {
    /// Number of stored entries.
    ///
    /// This is a structural count: it includes entries that have expired but
    /// not yet been swept. Use [`contains`](Self::contains) to ask whether a
    /// particular key is live.
    pub fn len(&self) -> usize {
        self.shared.lock().entries.len()
    }

    /// Returns true if no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the configuration this set was built with.
    pub fn config(&self) -> &SetConfig {
        &self.config
    }

    /// Returns a snapshot of the set's counters.
    pub fn stats(&self) -> SetStats {
        SetStats {
            len: self.len(),
            adds: self.shared.adds.load(Ordering::Relaxed),
            refreshes: self.shared.refreshes.load(Ordering::Relaxed),
            evicted: self.shared.evicted.load(Ordering::Relaxed),
            expired: self.shared.expired.load(Ordering::Relaxed),
            sweeps: self.shared.sweeps.load(Ordering::Relaxed),
        }
    }

    /// Returns true while a background reaper is attached and not stopped.
    pub fn is_reaping(&self) -> bool {
        self.reaper.is_some() && !self.shared.lock().reaper_stopped
    }

    /// Stops the background reaper, if there is one.
    ///
    /// Once this returns the reaper will not start another sweep. Calling it
    /// more than once is harmless, and dropping the set calls it too.
    pub fn stop_reaper(&self) {
        if let Some(reaper) = &self.reaper {
            self.shared.lock().reaper_stopped = true;
            reaper.stop();
        }
    }

    #[cfg(test)]
    pub(crate) fn shared(&self) -> &Arc<Shared<K>> {
        &self.shared
    }
}

impl<K> Drop for ExpiringSet<K> {
    fn drop(&mut self) {
        self.stop_reaper();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn set_with(ttl: Duration, max_size: Option<usize>) -> ExpiringSet<String> {
        let mut config = SetConfig::new(ttl);
        config.max_size = max_size;
        ExpiringSet::new(config).unwrap()
    }

    #[test]
    fn test_add_and_contains() {
        let set = set_with(Duration::from_secs(5), None);

        assert!(!set.contains("a"));
        set.add("a".to_string());
        assert!(set.contains("a"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_add_and_expire() {
        let set = set_with(Duration::from_millis(500), Some(4));

        set.add("a".to_string());
        assert!(set.contains("a"));

        thread::sleep(Duration::from_millis(600));

        // No sweep has run; lazy expiry alone must hide the key
        assert_eq!(set.stats().sweeps, 0);
        assert!(!set.contains("a"));
    }

    #[test]
    fn test_refresh_existing_key() {
        let set = set_with(Duration::from_millis(500), Some(4));

        set.add("x".to_string());
        thread::sleep(Duration::from_millis(300));
        set.add("x".to_string());
        assert_eq!(set.len(), 1);

        // 600ms after the first add, 300ms after the refresh
        thread::sleep(Duration::from_millis(300));
        assert!(set.contains("x"));

        // 900ms after the first add, 600ms after the refresh
        thread::sleep(Duration::from_millis(300));
        assert!(!set.contains("x"));
    }

    #[test]
    fn test_eviction_when_max_size_reached() {
        let set = set_with(Duration::from_secs(5), Some(3));

        for i in 0..5 {
            set.add(format!("k{}", i));
        }

        assert_eq!(set.len(), 3);
        assert!(!set.contains("k0"));
        assert!(!set.contains("k1"));
        assert!(set.contains("k2"));
        assert!(set.contains("k3"));
        assert!(set.contains("k4"));
        assert_eq!(set.stats().evicted, 2);
    }

    #[test]
    fn test_eviction_follows_insertion_order_not_expiry() {
        let set = set_with(Duration::from_secs(5), Some(2));

        set.add("a".to_string());
        set.add("b".to_string());
        // Refresh moves "a" behind "b"
        set.add("a".to_string());
        set.add("c".to_string());

        assert!(!set.contains("b"));
        assert!(set.contains("a"));
        assert!(set.contains("c"));
    }

    #[test]
    fn test_sweep_removes_expired_keys() {
        let set = set_with(Duration::ZERO, None);

        set.add("a".to_string());
        set.add("b".to_string());
        assert_eq!(set.len(), 2);

        assert_eq!(set.sweep(), 2);
        assert_eq!(set.len(), 0);
        assert!(!set.contains("a"));
        assert!(!set.contains("b"));
    }

    #[test]
    fn test_sweep_keeps_live_keys() {
        let set = set_with(Duration::from_millis(50), None);

        set.add("old1".to_string());
        set.add("old2".to_string());
        thread::sleep(Duration::from_millis(100));
        set.add("new".to_string());

        assert_eq!(set.sweep(), 2);
        assert_eq!(set.len(), 1);
        assert!(set.contains("new"));

        // Sweeping again is a no-op
        assert_eq!(set.sweep(), 0);
        assert_eq!(set.stats().sweeps, 2);
        assert_eq!(set.stats().expired, 2);
    }

    #[test]
    fn test_len_counts_unswept_expired_entries() {
        let set = set_with(Duration::from_millis(30), None);

        set.add("a".to_string());
        thread::sleep(Duration::from_millis(60));

        assert_eq!(set.len(), 1);
        assert!(!set.contains("a"));
        // The lookup removed it
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn test_clear_empties_set() {
        let set = set_with(Duration::from_secs(2), None);

        set.add("foo".to_string());
        set.add("bar".to_string());
        set.clear();

        assert!(!set.contains("foo"));
        assert!(!set.contains("bar"));
        assert_eq!(set.len(), 0);
        assert!(set.is_empty());
    }

    #[test]
    fn test_zero_max_size() {
        let set = set_with(Duration::from_secs(5), Some(0));

        assert!(set.insert("a".to_string()));
        assert!(set.insert("a".to_string()));
        assert!(!set.contains("a"));
        assert!(set.is_empty());
    }

    #[test]
    fn test_zero_ttl_never_live() {
        let set = set_with(Duration::ZERO, None);

        assert!(set.insert("a".to_string()));
        assert!(!set.contains("a"));
        assert!(set.insert("a".to_string()));
        assert_eq!(set.remaining_ttl("a"), None);
    }

    #[test]
    fn test_insert_reports_first_sighting() {
        let set = set_with(Duration::from_millis(100), None);

        assert!(set.insert("req".to_string()));
        assert!(!set.insert("req".to_string()));
        assert_eq!(set.stats().refreshes, 1);

        thread::sleep(Duration::from_millis(150));
        assert!(set.insert("req".to_string()));
        assert_eq!(set.stats().adds, 3);
    }

    #[test]
    fn test_remove() {
        let set = set_with(Duration::from_secs(5), None);

        set.add("a".to_string());
        assert!(set.remove("a"));
        assert!(!set.remove("a"));
        assert!(!set.contains("a"));
        assert!(set.is_empty());
    }

    #[test]
    fn test_remaining_ttl() {
        let set = set_with(Duration::from_secs(10), None);

        assert_eq!(set.remaining_ttl("missing"), None);

        set.add("a".to_string());
        let remaining = set.remaining_ttl("a").unwrap();
        assert!(remaining > Duration::from_secs(9) && remaining <= Duration::from_secs(10));
    }

    #[test]
    fn test_huge_ttl_never_expires() {
        let set: ExpiringSet<u64> = ExpiringSet::with_ttl(Duration::MAX);

        set.add(7);
        assert!(set.contains(&7u64));
        assert_eq!(set.remaining_ttl(&7u64), Some(Duration::MAX));
        assert_eq!(set.sweep(), 0);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_reaper_requires_runtime() {
        let config = SetConfig::new(Duration::from_secs(1))
            .with_sweep_interval(Duration::from_millis(10));
        let result = ExpiringSet::<String>::new(config);
        assert_eq!(result.unwrap_err(), ConfigError::NoRuntime);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config =
            SetConfig::new(Duration::from_secs(1)).with_sweep_interval(Duration::ZERO);
        let result = ExpiringSet::<String>::new(config);
        assert_eq!(result.unwrap_err(), ConfigError::ZeroSweepInterval);
    }

    #[test]
    fn test_order_index_stays_in_sync() {
        let set = set_with(Duration::from_secs(5), Some(10));

        for i in 0..100 {
            set.add(format!("k{}", i % 15));
        }

        let state = set.shared().lock();
        assert_eq!(state.entries.len(), state.order.len());
        assert_eq!(state.entries.len(), 10);
        for (sequence, key) in &state.order {
            assert_eq!(state.entries[key].sequence, *sequence);
        }
    }

    #[test]
    fn test_concurrent_adds() {
        let set = Arc::new(set_with(Duration::from_secs(2), Some(50)));
        let mut handles = vec![];

        for i in 0..8 {
            let set = Arc::clone(&set);
            handles.push(thread::spawn(move || {
                for j in 0..200 {
                    set.add(format!("k-{}-{}", i, j));
                    set.contains(&format!("k-{}-{}", i, j / 2));
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(set.len() <= 50);
        assert_eq!(set.stats().adds, 1600);

        let state = set.shared().lock();
        let now = Instant::now();
        assert!(state.entries.values().all(|entry| !entry.is_expired_at(now)));
    }

    #[test]
    fn test_concurrent_adds_same_keys() {
        let set = Arc::new(set_with(Duration::from_secs(2), Some(50)));
        let mut handles = vec![];

        for i in 0..5 {
            let set = Arc::clone(&set);
            handles.push(thread::spawn(move || {
                for _ in 0..20 {
                    set.add(format!("k{}", i));
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(set.len(), 5);
        assert!((0..5).all(|i| set.contains(&format!("k{}", i))));
    }
}

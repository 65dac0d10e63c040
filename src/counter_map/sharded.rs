//! Scalable strategy: one striped accumulator per key.
//!
//! ```text
//!   increment_and_get("item3")
//!            │
//!            ▼
//!   ┌──────────────────┐  hit   ┌────────────────────────┐
//!   │ shard read lock  │──────► │ ShardedAdder[item3]    │──► fetch_add on
//!   └──────────────────┘        └────────────────────────┘    own thread cell
//!            │ miss                        ▲
//!            ▼                             │
//!   ┌──────────────────┐  or_insert_with   │
//!   │ entry (upsert)   │───────────────────┘
//!   └──────────────────┘
//! ```

use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;

use super::CounterMap;
use crate::adder::ShardedAdder;

/// A counter map whose values are [`ShardedAdder`]s.
///
/// The accumulator for a key is created lazily by the map's upsert
/// primitive, which runs the factory only when the key is absent and at most
/// once per key even under a creation race. After that, increments only
/// need a shared read lock on the map shard plus a relaxed `fetch_add` on the
/// caller's own cell.
///
/// ```rust
/// use contese::counter_map::{CounterMap, ShardedCounterMap};
///
/// let map = ShardedCounterMap::new();
/// map.increment_and_get("item1".to_string());
/// map.increment_and_get("item1".to_string());
/// assert_eq!(map.snapshot().get("item1"), Some(&2));
/// ```
pub struct ShardedCounterMap<K>
where
    K: Eq + Hash,
{
    counters: DashMap<K, ShardedAdder>,
    created: AtomicUsize,
}

impl<K> ShardedCounterMap<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            counters: DashMap::new(),
            created: AtomicUsize::new(0),
        }
    }

    /// Creates a map sized for `key_space_size` keys.
    pub fn with_capacity(key_space_size: usize) -> Self {
        Self {
            counters: DashMap::with_capacity(key_space_size),
            created: AtomicUsize::new(0),
        }
    }

    /// Number of accumulators the upsert factory has built.
    ///
    /// Always equal to the number of keys: the factory never runs for a key
    /// that is already present.
    pub fn accumulators_created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    fn new_accumulator(&self) -> ShardedAdder {
        self.created.fetch_add(1, Ordering::Relaxed);
        ShardedAdder::new()
    }
}

impl<K> Default for ShardedCounterMap<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> CounterMap<K> for ShardedCounterMap<K>
where
    K: Eq + Hash + Clone + Send + Sync,
{
    fn name(&self) -> &'static str {
        "sharded"
    }

    fn increment_and_get(&self, key: K) -> u64 {
        if let Some(adder) = self.counters.get(&key) {
            adder.increment();
            return adder.sum();
        }

        let adder = self
            .counters
            .entry(key)
            .or_insert_with(|| self.new_accumulator())
            .downgrade();
        adder.increment();
        adder.sum()
    }

    fn snapshot(&self) -> HashMap<K, u64> {
        self.counters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().sum()))
            .collect()
    }

    fn len(&self) -> usize {
        self.counters.len()
    }
}

impl<K> Debug for ShardedCounterMap<K>
where
    K: Eq + Hash + Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardedCounterMap")
            .field("counters", &self.counters)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn test_increment_and_get_single_thread() {
        let map = ShardedCounterMap::new();
        assert_eq!(map.increment_and_get("a"), 1);
        assert_eq!(map.increment_and_get("a"), 2);
        assert_eq!(map.increment_and_get("b"), 1);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_factory_runs_once_per_key_under_race() {
        let map = Arc::new(ShardedCounterMap::new());
        let start = Arc::new(Barrier::new(16));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let map = Arc::clone(&map);
                let start = Arc::clone(&start);
                thread::spawn(move || {
                    start.wait();
                    map.increment_and_get("fresh".to_string());
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(map.accumulators_created(), 1);
        assert_eq!(map.snapshot().get("fresh"), Some(&16));
    }

    #[test]
    fn test_factory_not_invoked_for_existing_key() {
        let map = ShardedCounterMap::with_capacity(1);
        map.increment_and_get(7u32);
        map.increment_and_get(7u32);
        map.increment_and_get(7u32);
        assert_eq!(map.accumulators_created(), 1);
    }

    #[test]
    fn test_returned_value_never_below_own_increments() {
        let map = ShardedCounterMap::new();
        for expected in 1..=100 {
            assert!(map.increment_and_get("k") >= expected);
        }
    }

    #[test]
    fn test_debug() {
        let map = ShardedCounterMap::new();
        map.increment_and_get("dbg");
        let debug_str = format!("{:?}", map);
        assert!(debug_str.contains("ShardedCounterMap"));
        assert!(debug_str.contains("dbg"));
    }
}

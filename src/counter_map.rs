//! Thread-safe frequency counting behind a single contract.
//!
//! [`CounterMap`] is the increment-or-create contract; two strategies
//! implement it so tests and scenarios stay strategy-agnostic:
//!
//! | Type | Strategy | Writers |
//! |------|----------|---------|
//! | [`LockedCounterMap`] | one lock around read-compute-write | serialized |
//! | [`ShardedCounterMap`] | per-key [`ShardedAdder`](crate::adder::ShardedAdder), created by upsert | lock-free increments |
//!
//! Both must produce the same totals: after `L` increments over any key
//! space, the snapshot values sum to exactly `L`.
//!
//! ```rust
//! use contese::counter_map::{CounterMap, LockedCounterMap, ShardedCounterMap};
//!
//! fn tally<M: CounterMap<String>>(map: &M) -> u64 {
//!     for word in ["a", "b", "a", "c", "a"] {
//!         map.increment_and_get(word.to_string());
//!     }
//!     map.total()
//! }
//!
//! assert_eq!(tally(&LockedCounterMap::new()), 5);
//! assert_eq!(tally(&ShardedCounterMap::new()), 5);
//! ```

mod locked;
mod sharded;

pub use locked::LockedCounterMap;
pub use sharded::ShardedCounterMap;

use std::collections::HashMap;
use std::hash::Hash;

use crate::error::{Error, Result};

/// A concurrent map from key to a monotonically increasing count.
pub trait CounterMap<K>: Send + Sync
where
    K: Eq + Hash + Clone + Send + Sync,
{
    /// Short strategy name used in logs and reports.
    fn name(&self) -> &'static str;

    /// Creates a zero counter for `key` if absent, increments it, and returns
    /// the count after the increment.
    ///
    /// For the sharded strategy the returned value is read after the
    /// increment and may already include concurrent increments of the same
    /// key by other threads.
    fn increment_and_get(&self, key: K) -> u64;

    /// Materializes every counter. Only meaningful once writers have joined.
    fn snapshot(&self) -> HashMap<K, u64>;

    /// Number of distinct keys seen so far.
    fn len(&self) -> usize;

    /// Returns `true` if no key has been counted.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of all counters.
    fn total(&self) -> u64 {
        self.snapshot().values().sum()
    }
}

/// Checks the post-run invariants of a counting run.
///
/// The values must sum to `expected_total`, and no more than
/// `key_space_size` distinct keys may appear.
pub fn verify_counts<K>(
    snapshot: &HashMap<K, u64>,
    expected_total: u64,
    key_space_size: usize,
) -> Result<()> {
    let total: u64 = snapshot.values().sum();
    if total != expected_total {
        return Err(Error::invariant("counter sum", expected_total, total));
    }
    if snapshot.len() > key_space_size {
        return Err(Error::invariant(
            "distinct keys within key space",
            key_space_size as u64,
            snapshot.len() as u64,
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn hammer<M: CounterMap<String> + 'static>(map: Arc<M>, threads: usize, per_thread: u64) {
        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let map = Arc::clone(&map);
                thread::spawn(move || {
                    for i in 0..per_thread {
                        map.increment_and_get(format!("item{}", (i + t as u64) % 3));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_strategies_agree() {
        let locked = Arc::new(LockedCounterMap::new());
        let sharded = Arc::new(ShardedCounterMap::new());
        hammer(Arc::clone(&locked), 6, 3000);
        hammer(Arc::clone(&sharded), 6, 3000);

        assert_eq!(locked.total(), 18_000);
        assert_eq!(sharded.total(), 18_000);
        assert_eq!(locked.snapshot(), sharded.snapshot());
    }

    #[test]
    fn test_verify_counts_ok() {
        let snapshot = HashMap::from([("a", 2u64), ("b", 3)]);
        assert!(verify_counts(&snapshot, 5, 2).is_ok());
    }

    #[test]
    fn test_verify_counts_lost_update() {
        let snapshot = HashMap::from([("a", 2u64), ("b", 2)]);
        let err = verify_counts(&snapshot, 5, 2).unwrap_err();
        assert!(matches!(
            err,
            Error::InvariantViolation {
                expected: 5,
                actual: 4,
                ..
            }
        ));
    }

    #[test]
    fn test_verify_counts_key_space_exceeded() {
        let snapshot = HashMap::from([("a", 1u64), ("b", 1), ("c", 1)]);
        assert!(verify_counts(&snapshot, 3, 2).is_err());
    }

    #[test]
    fn test_empty() {
        let map = ShardedCounterMap::<String>::new();
        assert!(map.is_empty());
        assert_eq!(map.total(), 0);
    }
}

//! Coarse-grained reference strategy: one lock for the whole map.

use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::hash::Hash;

use parking_lot::Mutex;

use super::CounterMap;

/// A counter map guarded by a single mutex.
///
/// Every increment takes the lock, reads the current value, and writes back
/// `value + 1`. The read-compute-write sequence is atomic because nothing
/// else can touch the map while the lock is held, so no update is ever lost,
/// but all writers queue on the same lock.
///
/// ```rust
/// use contese::counter_map::{CounterMap, LockedCounterMap};
///
/// let map = LockedCounterMap::new();
/// assert_eq!(map.increment_and_get("item1"), 1);
/// assert_eq!(map.increment_and_get("item1"), 2);
/// assert_eq!(map.increment_and_get("item2"), 1);
/// assert_eq!(map.total(), 3);
/// ```
pub struct LockedCounterMap<K> {
    counts: Mutex<HashMap<K, u64>>,
}

impl<K> LockedCounterMap<K> {
    pub fn new() -> Self {
        Self {
            counts: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a map sized for `key_space_size` keys.
    pub fn with_capacity(key_space_size: usize) -> Self {
        Self {
            counts: Mutex::new(HashMap::with_capacity(key_space_size)),
        }
    }
}

impl<K> Default for LockedCounterMap<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> CounterMap<K> for LockedCounterMap<K>
where
    K: Eq + Hash + Clone + Send + Sync,
{
    fn name(&self) -> &'static str {
        "locked"
    }

    fn increment_and_get(&self, key: K) -> u64 {
        let mut counts = self.counts.lock();
        let next = counts.get(&key).map_or(1, |current| current + 1);
        counts.insert(key, next);
        next
    }

    fn snapshot(&self) -> HashMap<K, u64> {
        self.counts.lock().clone()
    }

    fn len(&self) -> usize {
        self.counts.lock().len()
    }
}

impl<K: Debug> Debug for LockedCounterMap<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockedCounterMap")
            .field("counts", &*self.counts.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_increment_and_get_creates_then_increments() {
        let map = LockedCounterMap::new();
        assert_eq!(map.increment_and_get("k"), 1);
        assert_eq!(map.increment_and_get("k"), 2);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let map = LockedCounterMap::with_capacity(4);
        map.increment_and_get("a");
        let snapshot = map.snapshot();
        map.increment_and_get("a");
        assert_eq!(snapshot.get("a"), Some(&1));
        assert_eq!(map.snapshot().get("a"), Some(&2));
    }

    #[test]
    fn test_returned_counts_are_unique_per_key() {
        let map = Arc::new(LockedCounterMap::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let map = Arc::clone(&map);
                thread::spawn(move || {
                    (0..500)
                        .map(|_| map.increment_and_get("same"))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (1..=2000).collect::<Vec<_>>());
    }

    #[test]
    fn test_debug() {
        let map = LockedCounterMap::new();
        map.increment_and_get("x");
        let debug_str = format!("{:?}", map);
        assert!(debug_str.starts_with("LockedCounterMap"));
        assert!(debug_str.contains("\"x\": 1"));
    }
}

//! Striped accumulator used as the per-key cell of the sharded counter map.
//!
//! # Architecture
//!
//! ```text
//!                          ┌─────────────────────────────────────┐
//!                          │            ShardedAdder             │
//!                          ├─────────────────────────────────────┤
//!   Thread 0 ──writes──►   │ [Slot 0] ████████ (CachePadded)     │
//!   Thread 1 ──writes──►   │ [Slot 1] ████████ (CachePadded)     │
//!        ...               │    ...                              │
//!   Thread 63 ─writes──►   │ [Slot 63] ███████ (CachePadded)     │
//!                          └─────────────────────────────────────┘
//!                                          │
//!                                          ▼
//!                                    sum() aggregates
//!                                    all slots on read
//! ```
//!
//! A global atomic hands out slot ids to threads on first use; the id is
//! cached in thread-local storage and reduced modulo [`NUM_COMPONENTS`].
//! Past 64 threads slots are shared, which only costs contention, never
//! correctness: every slot is updated with `fetch_add`.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use atomic_traits::Atomic;
use crossbeam_utils::CachePadded;

/// Number of cells in each adder.
///
/// Each cell is cache-line padded, so an adder costs roughly 4KB. The
/// sharded map allocates one per key, which is fine for the small key
/// spaces it targets.
pub const NUM_COMPONENTS: usize = 64;

static NEXT_SLOT_ID: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    /// Slot index of the current thread, assigned lazily and stable for the
    /// lifetime of the thread.
    static THREAD_SLOT_INDEX: usize = next_slot_id();
}

/// Assigns the next slot id, in `[0, NUM_COMPONENTS)`.
fn next_slot_id() -> usize {
    NEXT_SLOT_ID.fetch_add(1, Ordering::Relaxed) % NUM_COMPONENTS
}

/// Access to the calling thread's cell of a sharded accumulator.
pub trait GetComponentCounter {
    /// The atomic type used for individual cells.
    type CounterType: Atomic;

    /// Returns a reference to the current thread's cell.
    fn get_component_counter(&self) -> &Self::CounterType;
}

/// A monotonically increasing, contention-free `u64` accumulator.
///
/// Writers never share a lock: each increments the cell picked by its thread
/// slot. Readers sum every cell, so [`sum`](ShardedAdder::sum) is exact once
/// writers have quiesced and a lower bound on the total while they run.
///
/// ```rust
/// use contese::adder::ShardedAdder;
/// use std::sync::Arc;
/// use std::thread;
///
/// let adder = Arc::new(ShardedAdder::new());
/// let handles: Vec<_> = (0..4)
///     .map(|_| {
///         let adder = Arc::clone(&adder);
///         thread::spawn(move || {
///             for _ in 0..1000 {
///                 adder.increment();
///             }
///         })
///     })
///     .collect();
///
/// for h in handles {
///     h.join().unwrap();
/// }
/// assert_eq!(adder.sum(), 4000);
/// ```
pub struct ShardedAdder {
    components: [CachePadded<AtomicU64>; NUM_COMPONENTS],
}

impl GetComponentCounter for ShardedAdder {
    type CounterType = AtomicU64;

    #[inline]
    fn get_component_counter(&self) -> &AtomicU64 {
        THREAD_SLOT_INDEX.with(|idx| &self.components[*idx])
    }
}

impl ShardedAdder {
    /// Creates an adder with every cell at zero.
    pub const fn new() -> Self {
        const ZERO: CachePadded<AtomicU64> = CachePadded::new(AtomicU64::new(0));
        ShardedAdder {
            components: [ZERO; NUM_COMPONENTS],
        }
    }

    /// Adds one to the calling thread's cell.
    #[inline]
    pub fn increment(&self) {
        self.add(1);
    }

    /// Adds `value` to the calling thread's cell.
    #[inline]
    pub fn add(&self, value: u64) {
        self.get_component_counter()
            .fetch_add(value, Ordering::Relaxed);
    }

    /// Returns the calling thread's contribution.
    #[inline]
    pub fn local_value(&self) -> u64 {
        self.get_component_counter().load(Ordering::Relaxed)
    }

    /// Sums every cell.
    #[inline]
    pub fn sum(&self) -> u64 {
        self.components
            .iter()
            .map(|cell| cell.load(Ordering::Relaxed))
            .sum()
    }
}

impl Default for ShardedAdder {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for ShardedAdder {
    /// Formats only the non-zero cells: `{ [slot]:value ... }`.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, cell) in self.components.iter().enumerate() {
            let val = cell.load(Ordering::Relaxed);
            if val != 0 {
                write!(f, " [{i}]:{val}")?;
            }
        }
        write!(f, " }}")
    }
}

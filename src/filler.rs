//! Topping a shared collection up to an exact size under concurrent writers.
//!
//! A fill step is a compound operation: read the size, compute the gap to
//! the target, insert that many entries. The collection is a concurrent map,
//! so each read and each insert is individually thread-safe, but nothing
//! makes the sequence atomic:
//!
//! ```text
//!   worker A: len()=900 ─ gap=100 ─────────────── insert 100 ─► 1000
//!   worker B:      len()=900 ─ gap=100 ──────────────── insert 100 ─► 1100
//! ```
//!
//! [`FillMode::Locked`] runs the whole step under one collection-wide lock
//! and always lands on the target. [`FillMode::CheckThenAct`] runs it bare
//! and may overshoot. Both modes are kept so the difference can be observed.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Error, Result};

/// How a fill step is synchronized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FillMode {
    /// Gap computation and insertion happen under one collection-wide lock.
    Locked,
    /// Gap computation and insertion are separate, unsynchronized steps.
    CheckThenAct,
}

impl FillMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FillMode::Locked => "locked",
            FillMode::CheckThenAct => "check-then-act",
        }
    }
}

impl fmt::Display for FillMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a filler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillState {
    /// No fill step has started.
    Idle,
    /// At least one fill step is running.
    Filling,
    /// Fill steps have run and none is active.
    Settled,
}

/// Builds `count` entries with random UUID keys and values `1..=count`.
pub fn random_entries(count: usize) -> HashMap<String, u64> {
    (1..=count as u64)
        .map(|value| (Uuid::new_v4().to_string(), value))
        .collect()
}

/// A shared keyed collection with a target cardinality.
///
/// ```rust
/// use contese::filler::{BoundedFiller, FillMode, FillState};
///
/// let filler = BoundedFiller::seeded(900, 1000);
/// assert_eq!(filler.state(), FillState::Idle);
///
/// assert_eq!(filler.fill_to_target(FillMode::Locked), 100);
/// assert_eq!(filler.fill_to_target(FillMode::Locked), 0);
///
/// assert_eq!(filler.state(), FillState::Settled);
/// assert_eq!(filler.len(), 1000);
/// filler.verify(FillMode::Locked).unwrap();
/// ```
pub struct BoundedFiller {
    entries: DashMap<String, u64>,
    target: usize,
    fill_lock: Mutex<()>,
    active: AtomicUsize,
    started: AtomicBool,
}

impl BoundedFiller {
    /// Creates an empty collection aiming for `target` entries.
    pub fn new(target: usize) -> Self {
        Self {
            entries: DashMap::with_capacity(target),
            target,
            fill_lock: Mutex::new(()),
            active: AtomicUsize::new(0),
            started: AtomicBool::new(false),
        }
    }

    /// Creates a collection pre-populated with `initial` random entries.
    pub fn seeded(initial: usize, target: usize) -> Self {
        let filler = Self::new(target);
        for (key, value) in random_entries(initial) {
            filler.entries.insert(key, value);
        }
        filler
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries beyond the target.
    pub fn overshoot(&self) -> usize {
        self.len().saturating_sub(self.target)
    }

    pub fn state(&self) -> FillState {
        if !self.started.load(Ordering::SeqCst) {
            FillState::Idle
        } else if self.active.load(Ordering::SeqCst) > 0 {
            FillState::Filling
        } else {
            FillState::Settled
        }
    }

    /// Runs one fill step and returns how many entries it inserted.
    pub fn fill_to_target(&self, mode: FillMode) -> usize {
        self.fill_to_target_observed(mode, |_| {})
    }

    /// Like [`fill_to_target`](Self::fill_to_target), calling `on_gap` with
    /// the computed gap between the size check and the insert.
    ///
    /// In [`FillMode::Locked`] the callback runs inside the critical
    /// section, so it must not wait on other fill workers.
    pub fn fill_to_target_observed(&self, mode: FillMode, on_gap: impl FnOnce(usize)) -> usize {
        let _active = ActiveFill::enter(self);
        match mode {
            FillMode::Locked => {
                let _lock = self.fill_lock.lock();
                self.check_then_insert(on_gap)
            }
            FillMode::CheckThenAct => self.check_then_insert(on_gap),
        }
    }

    fn check_then_insert(&self, on_gap: impl FnOnce(usize)) -> usize {
        let gap = self.target.saturating_sub(self.entries.len());
        debug!(gap, "observed gap");
        on_gap(gap);

        let batch = random_entries(gap);
        let added = batch.len();
        for (key, value) in batch {
            self.entries.insert(key, value);
        }
        added
    }

    /// Checks the size invariant of a settled collection.
    ///
    /// Locked fills must land exactly on the target; check-then-act fills
    /// only guarantee they reached it.
    pub fn verify(&self, mode: FillMode) -> Result<()> {
        let active = self.active.load(Ordering::SeqCst);
        if active > 0 {
            return Err(Error::invariant("no fill worker active", 0, active as u64));
        }

        let size = self.len();
        info!(%mode, size, target = self.target, "fill settled");
        match mode {
            FillMode::Locked if size != self.target => Err(Error::invariant(
                "collection size",
                self.target as u64,
                size as u64,
            )),
            FillMode::CheckThenAct if size < self.target => Err(Error::invariant(
                "collection size at least target",
                self.target as u64,
                size as u64,
            )),
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for BoundedFiller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedFiller")
            .field("len", &self.len())
            .field("target", &self.target)
            .field("state", &self.state())
            .finish()
    }
}

/// Tracks a running fill step; decrements on drop so a panicking callback
/// cannot leave the filler stuck in [`FillState::Filling`].
struct ActiveFill<'a> {
    filler: &'a BoundedFiller,
}

impl<'a> ActiveFill<'a> {
    fn enter(filler: &'a BoundedFiller) -> Self {
        filler.active.fetch_add(1, Ordering::SeqCst);
        filler.started.store(true, Ordering::SeqCst);
        Self { filler }
    }
}

impl Drop for ActiveFill<'_> {
    fn drop(&mut self) {
        self.filler.active.fetch_sub(1, Ordering::SeqCst);
    }
}

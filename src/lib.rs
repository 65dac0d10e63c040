//! # Contese - Reproducible Concurrency Pitfalls
//!
//! A small library that makes three classic mistakes with concurrent shared
//! state reproducible and testable, next to the fix for each one.
//!
//! ## The Problems
//!
//! 1. **Check-then-act on a thread-safe map.** Reading the size of a
//!    concurrent map and then inserting "the missing entries" is two atomic
//!    operations, not one. Workers that read the same stale size all insert
//!    a full gap, and the collection overshoots its target.
//!
//! 2. **Lock granularity when counting.** Guarding a frequency map with one
//!    lock is correct but queues every writer on the same cache line. A
//!    per-key striped accumulator keeps the same totals while letting
//!    writers proceed without a shared lock.
//!
//! 3. **Thread-local state on pooled threads.** A worker thread outlives the
//!    task it runs. A value a task leaves in thread-local storage is what
//!    the next task on that thread reads first.
//!
//! ## Components
//!
//! | Module | Type | Role |
//! |--------|------|------|
//! | [`counter_map`] | [`LockedCounterMap`](counter_map::LockedCounterMap), [`ShardedCounterMap`](counter_map::ShardedCounterMap) | increment-or-create counting, two strategies |
//! | [`adder`] | [`ShardedAdder`](adder::ShardedAdder) | 64-cell cache-padded accumulator |
//! | [`filler`] | [`BoundedFiller`](filler::BoundedFiller) | exact-size fill, locked or check-then-act |
//! | [`context`] | [`ScopedTaskContext`](context::ScopedTaskContext) | per-thread task value with RAII release |
//! | [`dispatcher`] | [`WorkerPool`](dispatcher::WorkerPool) | fixed pool, join-all barrier, aggregated failures |
//! | [`scenarios`] | runners | fan out, join, verify |
//!
//! ```text
//!   caller ──► WorkerPool::run_all(tasks) ──► worker 0..N (reused threads)
//!                     │                              │
//!                     │ blocks on barrier            ├─► CounterMap::increment_and_get
//!                     │                              ├─► BoundedFiller::fill_to_target
//!                     ▼                              └─► ScopedTaskContext::enter
//!              verify final state
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use contese::config::RunConfig;
//! use contese::dispatcher::WorkerPool;
//! use contese::filler::FillMode;
//! use contese::scenarios::{count_frequencies, fill_collection, CountingStrategy};
//!
//! let config = RunConfig::new()
//!     .with_worker_count(4)
//!     .with_loop_count(100_000);
//! let pool = WorkerPool::from_config(&config).unwrap();
//!
//! // Both strategies count every increment.
//! for strategy in CountingStrategy::ALL {
//!     let outcome = count_frequencies(strategy, &config, &pool).unwrap();
//!     assert_eq!(outcome.counts.values().sum::<u64>(), 100_000);
//! }
//!
//! // The locked fill lands exactly on the target.
//! let outcome = fill_collection(FillMode::Locked, &config, &pool).unwrap();
//! assert_eq!(outcome.final_size, 1000);
//! ```
//!
//! ## Errors
//!
//! Every runner returns [`error::Result`]. Post-run checks fail with
//! [`Error::InvariantViolation`](error::Error::InvariantViolation), a missed
//! barrier deadline with
//! [`Error::DispatchTimeout`](error::Error::DispatchTimeout), and failing
//! tasks are reported together, after all their siblings finished, as
//! [`Error::TaskFailures`](error::Error::TaskFailures).
//!
//! ## Logging
//!
//! Components emit `tracing` events (pool lifecycle, task failures, observed
//! gaps, verified results). Nothing depends on a subscriber being installed.
//!
//! ## Feature Flags
//!
//! | Feature | Module | Description |
//! |---------|--------|-------------|
//! | `table` | [`observers::table`] | Render run reports as tables |
//! | `json` | [`observers::json`] | Serialize run reports to JSON |
//! | `serde` | - | `Serialize`/`Deserialize` on config and reports |
//! | `full` | All observers | Enables all observer modules |
//! | `demo` | - | Builds the `demo` CLI example |

pub mod adder;
pub mod config;
pub mod context;
pub mod counter_map;
pub mod dispatcher;
pub mod error;
pub mod filler;
pub mod observers;
pub mod report;
pub mod scenarios;

pub use error::{Error, Result};

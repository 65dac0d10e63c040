//! Run configuration consumed by the scenario runners.
//!
//! [`RunConfig`] follows the builder style of the rest of the crate: every
//! setter is a `const fn` taking `self` by value, so a configuration can be
//! declared as a `const` or `static`.
//!
//! ```rust
//! use contese::config::RunConfig;
//! use std::time::Duration;
//!
//! const SMALL: RunConfig = RunConfig::new()
//!     .with_worker_count(4)
//!     .with_loop_count(10_000)
//!     .with_timeout(Duration::from_secs(30));
//!
//! assert!(SMALL.validate().is_ok());
//! assert_eq!(SMALL.key_space_size, 10);
//! ```

use std::time::Duration;

use crate::error::{Error, Result};

/// Default number of pool threads.
pub const DEFAULT_WORKER_COUNT: usize = 10;

/// Default target cardinality for the bounded fill.
pub const DEFAULT_TARGET_SIZE: usize = 1000;

/// Default number of entries seeded before a fill starts.
pub const DEFAULT_INITIAL_SIZE: usize = DEFAULT_TARGET_SIZE - 100;

/// Default number of increments spread across the key space.
pub const DEFAULT_LOOP_COUNT: u64 = 10_000_000;

/// Default number of distinct keys counted.
pub const DEFAULT_KEY_SPACE_SIZE: usize = 10;

/// Default bound on the join barrier.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Parameters of a scenario run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RunConfig {
    /// Number of reusable worker threads.
    pub worker_count: usize,
    /// Exact size the bounded fill must reach.
    pub target_size: usize,
    /// Number of entries present before the fill workers start.
    pub initial_size: usize,
    /// Total number of increments in a counting run.
    pub loop_count: u64,
    /// Number of distinct keys in a counting run.
    pub key_space_size: usize,
    /// How long the caller waits on the join barrier.
    pub timeout: Duration,
}

impl RunConfig {
    pub const fn new() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            target_size: DEFAULT_TARGET_SIZE,
            initial_size: DEFAULT_INITIAL_SIZE,
            loop_count: DEFAULT_LOOP_COUNT,
            key_space_size: DEFAULT_KEY_SPACE_SIZE,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub const fn with_worker_count(self, worker_count: usize) -> Self {
        Self {
            worker_count,
            ..self
        }
    }

    pub const fn with_target_size(self, target_size: usize) -> Self {
        Self {
            target_size,
            ..self
        }
    }

    pub const fn with_initial_size(self, initial_size: usize) -> Self {
        Self {
            initial_size,
            ..self
        }
    }

    pub const fn with_loop_count(self, loop_count: u64) -> Self {
        Self { loop_count, ..self }
    }

    pub const fn with_key_space_size(self, key_space_size: usize) -> Self {
        Self {
            key_space_size,
            ..self
        }
    }

    pub const fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }

    /// Rejects values no scenario can run with.
    ///
    /// `initial_size > target_size` is accepted: the fill then has nothing
    /// to add and the correct mode reports the surplus as a violation.
    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(Error::InvalidConfig("worker_count must be at least 1".into()));
        }
        if self.key_space_size == 0 {
            return Err(Error::InvalidConfig(
                "key_space_size must be at least 1".into(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(Error::InvalidConfig("timeout must be non-zero".into()));
        }
        Ok(())
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::new()
    }
}

//! Error taxonomy shared by every component.
//!
//! All post-run checks, dispatch failures and configuration problems are
//! reported through the single [`Error`] type, so a caller that drives a
//! scenario only has one error to match on.
//!
//! # Example
//!
//! ```rust
//! use contese::error::{Error, Result};
//!
//! fn check(sum: u64, expected: u64) -> Result<()> {
//!     if sum != expected {
//!         return Err(Error::invariant("counter sum", expected, sum));
//!     }
//!     Ok(())
//! }
//!
//! assert!(check(10, 10).is_ok());
//! assert!(matches!(check(9, 10), Err(Error::InvariantViolation { .. })));
//! ```

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Boxed error type returned by task bodies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A single task that returned an error or panicked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    /// Position of the task in the submitted batch.
    pub index: usize,
    /// Rendered error value or panic payload.
    pub message: String,
}

impl TaskFailure {
    pub fn new(index: usize, message: impl Into<String>) -> Self {
        Self {
            index,
            message: message.into(),
        }
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task #{}: {}", self.index, self.message)
    }
}

/// Errors raised while running or verifying a concurrent scenario.
#[derive(Debug, Error)]
pub enum Error {
    /// A post-run assertion did not hold.
    #[error("invariant violated: {what} (expected {expected}, got {actual})")]
    InvariantViolation {
        what: String,
        expected: u64,
        actual: u64,
    },

    /// The join barrier did not observe every task before the wait bound.
    #[error("dispatch timed out after {timeout:?}: {completed}/{total} tasks completed")]
    DispatchTimeout {
        timeout: Duration,
        completed: usize,
        total: usize,
    },

    /// One or more tasks failed; siblings still ran to completion.
    #[error("{} of {total} tasks failed: {}", .failures.len(), render_failures(.failures))]
    TaskFailures {
        failures: Vec<TaskFailure>,
        total: usize,
    },

    /// A configuration value was rejected before any work was dispatched.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The worker pool could not spawn a thread.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl Error {
    /// Builds an [`Error::InvariantViolation`].
    pub fn invariant(what: impl Into<String>, expected: u64, actual: u64) -> Self {
        Error::InvariantViolation {
            what: what.into(),
            expected,
            actual,
        }
    }

    /// Returns the collected task failures, if this is [`Error::TaskFailures`].
    pub fn task_failures(&self) -> Option<&[TaskFailure]> {
        match self {
            Error::TaskFailures { failures, .. } => Some(failures),
            _ => None,
        }
    }
}

fn render_failures(failures: &[TaskFailure]) -> String {
    failures
        .iter()
        .map(TaskFailure::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for all fallible operations in this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invariant_display() {
        let err = Error::invariant("collection size", 1000, 1090);
        assert_eq!(
            err.to_string(),
            "invariant violated: collection size (expected 1000, got 1090)"
        );
    }

    #[test]
    fn test_task_failures_display() {
        let err = Error::TaskFailures {
            failures: vec![TaskFailure::new(2, "boom"), TaskFailure::new(5, "bang")],
            total: 8,
        };
        assert_eq!(
            err.to_string(),
            "2 of 8 tasks failed: task #2: boom; task #5: bang"
        );
        assert_eq!(err.task_failures().map(<[_]>::len), Some(2));
    }

    #[test]
    fn test_timeout_is_distinct_from_task_failures() {
        let err = Error::DispatchTimeout {
            timeout: Duration::from_millis(10),
            completed: 3,
            total: 4,
        };
        assert!(err.task_failures().is_none());
        assert!(err.to_string().contains("3/4"));
    }
}

//! Timing and result records for scenario runs.
//!
//! [`Stopwatch`] times a sequence of named phases; [`RunReport`] is the row a
//! scenario hands back to its caller. Rendering lives in
//! [`crate::observers`].

use std::fmt::{self, Write as _};
use std::time::{Duration, Instant};

/// Outcome of one timed run.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RunReport {
    /// Run name, e.g. the counting strategy or fill mode.
    pub name: String,
    /// Wall-clock time spent in the run.
    pub elapsed: Duration,
    /// Final number of entries (keys or collection size).
    pub entries: usize,
    /// Final aggregate value (counter sum, or entries for a fill).
    pub total: u64,
}

impl RunReport {
    pub fn new(name: impl Into<String>, elapsed: Duration, entries: usize, total: u64) -> Self {
        Self {
            name: name.into(),
            elapsed,
            entries,
            total,
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} entries, total {} in {:?}",
            self.name, self.entries, self.total, self.elapsed
        )
    }
}

/// A finished phase of a [`Stopwatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseTiming {
    pub name: String,
    pub elapsed: Duration,
}

/// Times a sequence of named, non-overlapping phases.
///
/// ```rust
/// use contese::report::Stopwatch;
///
/// let mut watch = Stopwatch::new("counting");
/// let sum = watch.time("locked", || (1..=10u64).sum::<u64>());
/// watch.time("sharded", || ());
///
/// assert_eq!(sum, 55);
/// assert_eq!(watch.phases().len(), 2);
/// assert!(watch.pretty_print().contains("sharded"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Stopwatch {
    id: String,
    phases: Vec<PhaseTiming>,
    running: Option<(String, Instant)>,
}

impl Stopwatch {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Starts a phase, finishing the running one first.
    pub fn start(&mut self, name: impl Into<String>) {
        self.stop();
        self.running = Some((name.into(), Instant::now()));
    }

    /// Finishes the running phase and returns its duration.
    pub fn stop(&mut self) -> Option<Duration> {
        let (name, started) = self.running.take()?;
        let elapsed = started.elapsed();
        self.phases.push(PhaseTiming { name, elapsed });
        Some(elapsed)
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Runs `f` as a phase named `name`.
    pub fn time<R>(&mut self, name: impl Into<String>, f: impl FnOnce() -> R) -> R {
        self.start(name);
        let result = f();
        self.stop();
        result
    }

    pub fn phases(&self) -> &[PhaseTiming] {
        &self.phases
    }

    pub fn last(&self) -> Option<&PhaseTiming> {
        self.phases.last()
    }

    pub fn total(&self) -> Duration {
        self.phases.iter().map(|phase| phase.elapsed).sum()
    }

    /// One line per phase with its share of the total.
    pub fn pretty_print(&self) -> String {
        let total = self.total();
        let mut out = String::new();
        let _ = writeln!(out, "Stopwatch '{}': running time = {:?}", self.id, total);
        let _ = writeln!(out, "{}", "-".repeat(48));
        let _ = writeln!(out, "{:<16} {:>6}  Phase", "elapsed", "%");
        let _ = writeln!(out, "{}", "-".repeat(48));
        for phase in &self.phases {
            let share = if total.is_zero() {
                0.0
            } else {
                phase.elapsed.as_secs_f64() / total.as_secs_f64() * 100.0
            };
            let _ = writeln!(
                out,
                "{:<16} {:>5.1}%  {}",
                format!("{:?}", phase.elapsed),
                share,
                phase.name
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_phases_recorded_in_order() {
        let mut watch = Stopwatch::new("t");
        watch.start("a");
        thread::sleep(Duration::from_millis(2));
        watch.start("b");
        watch.stop();

        let names: Vec<_> = watch.phases().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(watch.phases()[0].elapsed >= Duration::from_millis(2));
        assert!(!watch.is_running());
    }

    #[test]
    fn test_stop_without_start() {
        let mut watch = Stopwatch::new("idle");
        assert_eq!(watch.stop(), None);
        assert_eq!(watch.total(), Duration::ZERO);
    }

    #[test]
    fn test_pretty_print_empty() {
        let watch = Stopwatch::new("empty");
        let out = watch.pretty_print();
        assert!(out.starts_with("Stopwatch 'empty'"));
    }

    #[test]
    fn test_report_display() {
        let report = RunReport::new("sharded", Duration::from_millis(3), 10, 1000);
        assert_eq!(report.to_string(), "sharded: 10 entries, total 1000 in 3ms");
    }
}

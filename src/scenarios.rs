//! End-to-end runs of each pitfall on a [`WorkerPool`].
//!
//! Every runner fans work out on the pool, waits on the join barrier, then
//! checks the post-run invariant and returns what it observed. A failed
//! check comes back as [`Error::InvariantViolation`](crate::error::Error).

use std::sync::Arc;
use std::time::Instant;
use std::{collections::HashMap, fmt};

use parking_lot::Mutex;
use rand::Rng;
use tracing::info;

use crate::config::RunConfig;
use crate::context::ScopedTaskContext;
use crate::counter_map::{verify_counts, CounterMap, LockedCounterMap, ShardedCounterMap};
use crate::dispatcher::{infallible, Task, WorkerPool};
use crate::error::Result;
use crate::filler::{BoundedFiller, FillMode};
use crate::report::{RunReport, Stopwatch};

/// Chunks handed to each worker in a counting run.
const CHUNKS_PER_WORKER: usize = 4;

/// Which [`CounterMap`] implementation a counting run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CountingStrategy {
    /// [`LockedCounterMap`].
    Locked,
    /// [`ShardedCounterMap`].
    Sharded,
}

impl CountingStrategy {
    pub const ALL: [CountingStrategy; 2] = [CountingStrategy::Locked, CountingStrategy::Sharded];

    fn build(&self, key_space_size: usize) -> Arc<dyn CounterMap<String>> {
        match self {
            CountingStrategy::Locked => Arc::new(LockedCounterMap::with_capacity(key_space_size)),
            CountingStrategy::Sharded => Arc::new(ShardedCounterMap::with_capacity(key_space_size)),
        }
    }
}

impl fmt::Display for CountingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CountingStrategy::Locked => f.write_str("locked"),
            CountingStrategy::Sharded => f.write_str("sharded"),
        }
    }
}

/// Result of a verified counting run.
#[derive(Debug, Clone)]
pub struct CountOutcome {
    pub strategy: CountingStrategy,
    pub counts: HashMap<String, u64>,
    pub report: RunReport,
}

/// Key used for index `n` of the key space.
pub fn item_key(n: usize) -> String {
    format!("item{n}")
}

/// Spreads `config.loop_count` increments uniformly at random over
/// `config.key_space_size` keys and verifies no increment was lost.
///
/// ```rust
/// use contese::config::RunConfig;
/// use contese::dispatcher::WorkerPool;
/// use contese::scenarios::{count_frequencies, CountingStrategy};
///
/// let config = RunConfig::new().with_worker_count(4).with_loop_count(20_000);
/// let pool = WorkerPool::from_config(&config).unwrap();
///
/// let outcome = count_frequencies(CountingStrategy::Sharded, &config, &pool).unwrap();
/// assert_eq!(outcome.counts.values().sum::<u64>(), 20_000);
/// ```
pub fn count_frequencies(
    strategy: CountingStrategy,
    config: &RunConfig,
    pool: &WorkerPool,
) -> Result<CountOutcome> {
    config.validate()?;
    let map = strategy.build(config.key_space_size);
    let started = Instant::now();

    pool.run_all(counting_tasks(&map, config, pool.worker_count()))?;

    let elapsed = started.elapsed();
    let counts = map.snapshot();
    verify_counts(&counts, config.loop_count, config.key_space_size)?;

    let report = RunReport::new(strategy.to_string(), elapsed, counts.len(), config.loop_count);
    info!(%strategy, keys = counts.len(), total = config.loop_count, ?elapsed, "counting verified");
    Ok(CountOutcome {
        strategy,
        counts,
        report,
    })
}

fn counting_tasks(
    map: &Arc<dyn CounterMap<String>>,
    config: &RunConfig,
    worker_count: usize,
) -> Vec<Task> {
    let loops = config.loop_count;
    let chunks = (worker_count * CHUNKS_PER_WORKER).max(1) as u64;
    let chunks = chunks.min(loops.max(1));
    let (base, extra) = (loops / chunks, loops % chunks);
    let key_space = config.key_space_size;

    (0..chunks)
        .map(|chunk| {
            let map = Arc::clone(map);
            let share = base + u64::from(chunk < extra);
            infallible(move || {
                let mut rng = rand::thread_rng();
                for _ in 0..share {
                    map.increment_and_get(item_key(rng.gen_range(0..key_space)));
                }
            })
        })
        .collect()
}

/// Runs both counting strategies with the same configuration, verifying
/// each, and logs a timing summary.
pub fn compare_counting(config: &RunConfig) -> Result<Vec<RunReport>> {
    let pool = WorkerPool::from_config(config)?;
    let mut watch = Stopwatch::new("counting");
    let mut reports = Vec::with_capacity(CountingStrategy::ALL.len());

    for strategy in CountingStrategy::ALL {
        let outcome = watch.time(strategy.to_string(), || {
            count_frequencies(strategy, config, &pool)
        })?;
        reports.push(outcome.report);
    }

    info!("\n{}", watch.pretty_print());
    Ok(reports)
}

/// Result of a verified fill run.
#[derive(Debug, Clone)]
pub struct FillOutcome {
    pub mode: FillMode,
    pub initial_size: usize,
    pub final_size: usize,
    pub target_size: usize,
    /// Gap each fill worker computed, in completion order.
    pub observed_gaps: Vec<usize>,
    pub report: RunReport,
}

impl FillOutcome {
    pub fn overshoot(&self) -> usize {
        self.final_size.saturating_sub(self.target_size)
    }
}

/// Seeds `config.initial_size` entries and runs `config.worker_count` fill
/// workers in `mode`, then verifies the size invariant for that mode.
pub fn fill_collection(mode: FillMode, config: &RunConfig, pool: &WorkerPool) -> Result<FillOutcome> {
    config.validate()?;
    let filler = Arc::new(BoundedFiller::seeded(config.initial_size, config.target_size));
    let gaps = Arc::new(Mutex::new(Vec::with_capacity(config.worker_count)));
    info!(%mode, initial = filler.len(), target = config.target_size, "fill starting");

    let started = Instant::now();
    let tasks = (0..config.worker_count).map(|_| {
        let filler = Arc::clone(&filler);
        let gaps = Arc::clone(&gaps);
        infallible(move || {
            filler.fill_to_target_observed(mode, |gap| gaps.lock().push(gap));
        })
    });
    pool.run_all(tasks)?;
    let elapsed = started.elapsed();

    filler.verify(mode)?;
    let final_size = filler.len();
    let observed_gaps = std::mem::take(&mut *gaps.lock());
    Ok(FillOutcome {
        mode,
        initial_size: config.initial_size,
        final_size,
        target_size: config.target_size,
        observed_gaps,
        report: RunReport::new(mode.to_string(), elapsed, final_size, final_size as u64),
    })
}

/// Whether request handlers clear the context before returning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseDiscipline {
    /// Bind through a guard that releases on every exit path.
    Scoped,
    /// Bind and return without releasing.
    Leaky,
}

/// What one simulated request saw in the shared context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextObservation<T> {
    /// Position of the request in the batch.
    pub request: usize,
    /// Name of the pool thread that served it.
    pub worker: String,
    /// Value present before the handler bound its own.
    pub before: Option<T>,
    /// Value read back after binding.
    pub after: Option<T>,
}

impl<T> ContextObservation<T> {
    /// `true` if the request found a value left behind by an earlier one.
    pub fn leaked(&self) -> bool {
        self.before.is_some()
    }
}

/// Serves one request per value on the pool, each reading the context,
/// binding its value and reading it back. Observations come back in request
/// order.
///
/// ```rust
/// use contese::context::ScopedTaskContext;
/// use contese::dispatcher::WorkerPool;
/// use contese::scenarios::{handle_requests, ReleaseDiscipline};
/// use std::sync::Arc;
///
/// let pool = WorkerPool::new(1).unwrap();
/// let user = Arc::new(ScopedTaskContext::new());
///
/// let seen = handle_requests(&user, vec![1, 2], ReleaseDiscipline::Leaky, &pool).unwrap();
/// assert_eq!(seen[1].before, Some(1));
/// ```
pub fn handle_requests<T>(
    context: &Arc<ScopedTaskContext<T>>,
    values: Vec<T>,
    discipline: ReleaseDiscipline,
    pool: &WorkerPool,
) -> Result<Vec<ContextObservation<T>>>
where
    T: Clone + Send + Sync + 'static,
{
    let observations = Arc::new(Mutex::new(Vec::with_capacity(values.len())));

    let tasks = values.into_iter().enumerate().map(|(request, value)| {
        let context = Arc::clone(context);
        let observations = Arc::clone(&observations);
        infallible(move || {
            let worker = std::thread::current()
                .name()
                .unwrap_or("unnamed")
                .to_string();
            let before = context.current();
            let after = match discipline {
                ReleaseDiscipline::Scoped => {
                    let _guard = context.enter(value);
                    context.current()
                }
                ReleaseDiscipline::Leaky => {
                    context.bind(value);
                    context.current()
                }
            };
            observations.lock().push(ContextObservation {
                request,
                worker,
                before,
                after,
            });
        })
    });
    pool.run_all(tasks)?;

    let mut observations = std::mem::take(&mut *observations.lock());
    observations.sort_by_key(|observation| observation.request);
    Ok(observations)
}

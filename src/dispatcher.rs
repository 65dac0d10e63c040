//! Fixed-size worker pool with a join-all barrier.
//!
//! # Architecture
//!
//! ```text
//!   run_all(tasks)
//!        │ send Job{index, task}
//!        ▼
//!   ┌──────────────┐   recv   ┌──────────┐
//!   │  job queue   │────────► │ worker 0 │──┐
//!   │ (MPMC chan)  │────────► │ worker 1 │──┤ Completion{index, outcome}
//!   │              │────────► │ worker N │──┤
//!   └──────────────┘          └──────────┘  ▼
//!                                     ┌──────────────┐
//!   caller blocks until all ◄──────── │ done channel │
//!   completions arrived or deadline   └──────────────┘
//! ```
//!
//! Workers are long-lived threads that pick jobs from a shared queue, so the
//! same thread runs many tasks over its lifetime. That reuse is exactly what
//! makes leftover thread-local state visible to the next task (see
//! [`crate::context`]).
//!
//! A task that returns an error or panics is recorded as a
//! [`TaskFailure`]; its siblings keep running and the caller gets every
//! failure at once after the barrier.

use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, Receiver, Sender};
use tracing::{debug, info, warn};

use crate::config::{RunConfig, DEFAULT_TIMEOUT};
use crate::error::{BoxError, Error, Result, TaskFailure};

/// A zero-argument unit of work.
pub type Task = Box<dyn FnOnce() -> std::result::Result<(), BoxError> + Send + 'static>;

/// Boxes a fallible closure into a [`Task`].
pub fn task<F, E>(f: F) -> Task
where
    F: FnOnce() -> std::result::Result<(), E> + Send + 'static,
    E: Into<BoxError>,
{
    Box::new(move || f().map_err(Into::into))
}

/// Boxes a closure that cannot fail into a [`Task`].
pub fn infallible<F>(f: F) -> Task
where
    F: FnOnce() + Send + 'static,
{
    Box::new(move || {
        f();
        Ok(())
    })
}

thread_local! {
    static WORKER_SLOT: Cell<Option<usize>> = const { Cell::new(None) };
}

/// Returns the slot index of the pool worker running the caller, or `None`
/// outside a pool.
pub fn current_worker_slot() -> Option<usize> {
    WORKER_SLOT.with(Cell::get)
}

struct Job {
    index: usize,
    task: Task,
    done: Sender<Completion>,
}

enum Message {
    Run(Job),
    Shutdown,
}

struct Completion {
    index: usize,
    outcome: std::result::Result<(), String>,
}

/// A pool of `worker_count` reusable threads.
///
/// ```rust
/// use contese::dispatcher::{infallible, WorkerPool};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let pool = WorkerPool::new(4).unwrap();
/// let done = Arc::new(AtomicUsize::new(0));
///
/// let tasks = (0..100).map(|_| {
///     let done = Arc::clone(&done);
///     infallible(move || {
///         done.fetch_add(1, Ordering::Relaxed);
///     })
/// });
///
/// pool.run_all(tasks).unwrap();
/// assert_eq!(done.load(Ordering::Relaxed), 100);
/// ```
pub struct WorkerPool {
    name: String,
    jobs: Sender<Message>,
    workers: Vec<JoinHandle<()>>,
    timeout: Duration,
    timed_out: AtomicBool,
}

impl WorkerPool {
    /// Spawns `worker_count` workers with the default one-hour barrier bound.
    pub fn new(worker_count: usize) -> Result<Self> {
        Self::spawn("pool", worker_count, DEFAULT_TIMEOUT)
    }

    /// Spawns a pool sized and bounded by `config`.
    pub fn from_config(config: &RunConfig) -> Result<Self> {
        config.validate()?;
        Self::spawn("pool", config.worker_count, config.timeout)
    }

    /// Spawns a pool whose threads are named `{name}-worker-{slot}`.
    pub fn spawn(name: &str, worker_count: usize, timeout: Duration) -> Result<Self> {
        if worker_count == 0 {
            return Err(Error::InvalidConfig("worker_count must be at least 1".into()));
        }

        let (jobs, queue) = crossbeam_channel::unbounded::<Message>();
        let mut workers = Vec::with_capacity(worker_count);
        for slot in 0..worker_count {
            let queue = queue.clone();
            let handle = thread::Builder::new()
                .name(format!("{name}-worker-{slot}"))
                .spawn(move || worker_loop(slot, queue))?;
            workers.push(handle);
        }
        debug!(pool = name, worker_count, "worker pool started");

        Ok(Self {
            name: name.to_string(),
            jobs,
            workers,
            timeout,
            timed_out: AtomicBool::new(false),
        })
    }

    /// Sets the bound on the join barrier.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs every task and returns once all of them have completed.
    ///
    /// # Errors
    ///
    /// - [`Error::DispatchTimeout`] if the barrier bound elapses first. The
    ///   pool stops waiting; tasks still running are left to finish on their
    ///   own.
    /// - [`Error::TaskFailures`] with every failed task, sorted by index, if
    ///   any task returned an error or panicked.
    pub fn run_all<I>(&self, tasks: I) -> Result<()>
    where
        I: IntoIterator<Item = Task>,
    {
        let started = Instant::now();
        let deadline = started + self.timeout;
        let (done_tx, done_rx) = crossbeam_channel::unbounded();

        let mut total = 0;
        let mut failures = Vec::new();
        for (index, task) in tasks.into_iter().enumerate() {
            total += 1;
            let job = Job {
                index,
                task,
                done: done_tx.clone(),
            };
            if self.jobs.send(Message::Run(job)).is_err() {
                failures.push(TaskFailure::new(index, "worker pool is shut down"));
            }
        }
        drop(done_tx);

        let mut completed = failures.len();
        while completed < total {
            match done_rx.recv_deadline(deadline) {
                Ok(completion) => {
                    completed += 1;
                    if let Err(message) = completion.outcome {
                        warn!(pool = %self.name, index = completion.index, %message, "task failed");
                        failures.push(TaskFailure::new(completion.index, message));
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    self.timed_out.store(true, Ordering::Relaxed);
                    warn!(pool = %self.name, completed, total, "join barrier timed out");
                    return Err(Error::DispatchTimeout {
                        timeout: self.timeout,
                        completed,
                        total,
                    });
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(Error::invariant(
                        "tasks reporting completion",
                        total as u64,
                        completed as u64,
                    ));
                }
            }
        }

        info!(
            pool = %self.name,
            total,
            failed = failures.len(),
            elapsed = ?started.elapsed(),
            "batch completed"
        );

        if failures.is_empty() {
            Ok(())
        } else {
            failures.sort_by_key(|failure| failure.index);
            Err(Error::TaskFailures { failures, total })
        }
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.name)
            .field("worker_count", &self.workers.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Drop for WorkerPool {
    /// Stops the workers. After a timed-out batch the threads are detached
    /// instead of joined, so a stuck task cannot hang the owner.
    fn drop(&mut self) {
        for _ in 0..self.workers.len() {
            let _ = self.jobs.send(Message::Shutdown);
        }
        if self.timed_out.load(Ordering::Relaxed) {
            warn!(pool = %self.name, "detaching workers after timeout");
            return;
        }
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        debug!(pool = %self.name, "worker pool stopped");
    }
}

/// Runs `tasks` on a transient pool of `worker_count` threads.
///
/// ```rust
/// use contese::dispatcher::{run_all, task};
/// use contese::error::Error;
/// use std::time::Duration;
///
/// let tasks = vec![
///     task(|| Ok::<_, std::io::Error>(())),
///     task(|| Err(std::io::Error::other("disk on fire"))),
/// ];
///
/// let err = run_all(tasks, 2, Duration::from_secs(5)).unwrap_err();
/// assert_eq!(err.task_failures().unwrap()[0].index, 1);
/// ```
pub fn run_all<I>(tasks: I, worker_count: usize, timeout: Duration) -> Result<()>
where
    I: IntoIterator<Item = Task>,
{
    WorkerPool::spawn("batch", worker_count, timeout)?.run_all(tasks)
}

fn worker_loop(slot: usize, queue: Receiver<Message>) {
    WORKER_SLOT.with(|cell| cell.set(Some(slot)));
    while let Ok(Message::Run(job)) = queue.recv() {
        let outcome = match panic::catch_unwind(AssertUnwindSafe(job.task)) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(err.to_string()),
            Err(payload) => Err(panic_message(payload.as_ref())),
        };
        // The caller may have given up on a timed-out batch.
        let _ = job.done.send(Completion {
            index: job.index,
            outcome,
        });
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn counting_tasks(n: usize, hits: &Arc<Vec<AtomicUsize>>) -> Vec<Task> {
        (0..n)
            .map(|i| {
                let hits = Arc::clone(hits);
                infallible(move || {
                    hits[i].fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect()
    }

    #[test]
    fn test_barrier_waits_for_every_task_exactly_once() {
        const N: usize = 64;
        for worker_count in [1, 2, 7, N] {
            let hits = Arc::new((0..N).map(|_| AtomicUsize::new(0)).collect::<Vec<_>>());
            let pool = WorkerPool::new(worker_count).unwrap();
            pool.run_all(counting_tasks(N, &hits)).unwrap();

            let total: usize = hits.iter().map(|h| h.load(Ordering::SeqCst)).sum();
            assert_eq!(total, N, "worker_count = {worker_count}");
            assert!(hits.iter().all(|h| h.load(Ordering::SeqCst) == 1));
        }
    }

    #[test]
    fn test_barrier_with_slow_tasks() {
        let pool = WorkerPool::new(3).unwrap();
        let done = Arc::new(AtomicUsize::new(0));
        let tasks = (0..9).map(|_| {
            let done = Arc::clone(&done);
            infallible(move || {
                thread::sleep(Duration::from_millis(10));
                done.fetch_add(1, Ordering::SeqCst);
            })
        });
        pool.run_all(tasks).unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 9);
    }

    #[test]
    fn test_empty_batch() {
        let pool = WorkerPool::new(2).unwrap();
        assert!(pool.run_all(Vec::new()).is_ok());
    }

    #[test]
    fn test_failures_do_not_abort_siblings() {
        let pool = WorkerPool::new(2).unwrap();
        let done = Arc::new(AtomicUsize::new(0));
        let tasks: Vec<Task> = (0..10)
            .map(|i| {
                let done = Arc::clone(&done);
                task(move || {
                    done.fetch_add(1, Ordering::SeqCst);
                    if i % 3 == 0 {
                        Err(format!("task {i} rejected"))
                    } else {
                        Ok(())
                    }
                })
            })
            .collect();

        let err = pool.run_all(tasks).unwrap_err();
        assert_eq!(done.load(Ordering::SeqCst), 10);

        let failures = err.task_failures().unwrap();
        let indexes: Vec<_> = failures.iter().map(|f| f.index).collect();
        assert_eq!(indexes, vec![0, 3, 6, 9]);
        assert_eq!(failures[1].message, "task 3 rejected");
    }

    #[test]
    fn test_panic_is_collected_and_worker_survives() {
        let pool = WorkerPool::new(1).unwrap();
        let err = pool
            .run_all(vec![infallible(|| panic!("kaboom"))])
            .unwrap_err();
        assert_eq!(err.task_failures().unwrap()[0].message, "panicked: kaboom");

        // The single worker is still alive for the next batch.
        let done = Arc::new(AtomicUsize::new(0));
        let d = Arc::clone(&done);
        pool.run_all(vec![infallible(move || {
            d.fetch_add(1, Ordering::SeqCst);
        })])
        .unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_timeout_is_reported() {
        let pool = WorkerPool::new(1)
            .unwrap()
            .with_timeout(Duration::from_millis(50));
        let tasks = vec![
            infallible(|| thread::sleep(Duration::from_millis(500))),
            infallible(|| {}),
        ];
        let err = pool.run_all(tasks).unwrap_err();
        assert!(matches!(
            err,
            Error::DispatchTimeout {
                completed: 0,
                total: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_workers_are_reused() {
        let pool = WorkerPool::new(2).unwrap();
        let threads = Arc::new(Mutex::new(HashSet::new()));
        let tasks = (0..20).map(|_| {
            let threads = Arc::clone(&threads);
            infallible(move || {
                threads.lock().insert(thread::current().id());
            })
        });
        pool.run_all(tasks).unwrap();
        assert!(threads.lock().len() <= 2);
    }

    #[test]
    fn test_worker_slot_visible_inside_tasks() {
        assert_eq!(current_worker_slot(), None);
        let pool = WorkerPool::new(3).unwrap();
        let slots = Arc::new(Mutex::new(Vec::new()));
        let tasks = (0..12).map(|_| {
            let slots = Arc::clone(&slots);
            infallible(move || slots.lock().push(current_worker_slot()))
        });
        pool.run_all(tasks).unwrap();
        assert!(slots
            .lock()
            .iter()
            .all(|slot| matches!(slot, Some(s) if *s < 3)));
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(matches!(
            WorkerPool::new(0).unwrap_err(),
            Error::InvalidConfig(_)
        ));
    }

    #[test]
    fn test_from_config() {
        let config = RunConfig::new()
            .with_worker_count(3)
            .with_timeout(Duration::from_secs(5));
        let pool = WorkerPool::from_config(&config).unwrap();
        assert_eq!(pool.worker_count(), 3);
        assert_eq!(pool.timeout(), Duration::from_secs(5));
    }
}

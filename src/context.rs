//! Per-task values bound to the executing worker thread.
//!
//! A pooled thread outlives the tasks it runs. Anything a task stores in
//! thread-local storage is still there when the next task lands on the same
//! thread, so a "current user" bound by one request shows up in the next one
//! unless it is cleared on the way out:
//!
//! ```text
//!   worker-0:  ┌ task A ───────────────┐┌ task B ───────────────┐
//!              │ bind(A) ... return    ││ current() == Some(A)  │  leak
//!              └───────────────────────┘└───────────────────────┘
//!
//!   worker-0:  ┌ task A ───────────────┐┌ task B ───────────────┐
//!              │ enter(A) ... drop(g)  ││ current() == None     │  scoped
//!              └───────────────────────┘└───────────────────────┘
//! ```
//!
//! [`ScopedTaskContext`] keeps one cell per thread and never exposes another
//! thread's cell. Release is the caller's job; [`ScopedTaskContext::enter`]
//! returns a [`ContextGuard`] that releases on drop, which covers early
//! returns, `?` and panics alike.

use std::cell::RefCell;
use std::fmt::{self, Debug};

use thread_local::ThreadLocal;
use tracing::debug;

/// Thread-scoped storage for the value of the task currently running.
///
/// # Panics
///
/// Each cell is a `RefCell`: calling [`bind`](Self::bind) or
/// [`release`](Self::release) from inside a [`with_current`](Self::with_current)
/// closure on the same thread panics.
///
/// # Examples
///
/// ```rust
/// use contese::context::ScopedTaskContext;
///
/// let user = ScopedTaskContext::new().with_name("current_user");
/// assert_eq!(user.current(), None);
///
/// user.scope(42, || {
///     assert_eq!(user.current(), Some(42));
/// });
///
/// // Released on scope exit.
/// assert_eq!(user.current(), None);
/// ```
pub struct ScopedTaskContext<T: Send> {
    name: &'static str,
    slots: ThreadLocal<RefCell<Option<T>>>,
}

impl<T: Send> ScopedTaskContext<T> {
    pub fn new() -> Self {
        Self {
            name: "",
            slots: ThreadLocal::new(),
        }
    }

    /// Sets the name used in logs and `Debug` output.
    pub fn with_name(self, name: &'static str) -> Self {
        Self { name, ..self }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn slot(&self) -> &RefCell<Option<T>> {
        self.slots.get_or_default()
    }

    /// Binds `value` to the calling thread, replacing whatever was there.
    ///
    /// Returns the replaced value. A `Some` here on a fresh task means an
    /// earlier task on this thread never released.
    pub fn bind(&self, value: T) -> Option<T> {
        self.slot().replace(Some(value))
    }

    /// Returns a copy of the calling thread's value, or `None` if never bound
    /// or already released.
    pub fn current(&self) -> Option<T>
    where
        T: Clone,
    {
        self.slots.get().and_then(|cell| cell.borrow().clone())
    }

    /// Runs `f` with a reference to the calling thread's value.
    pub fn with_current<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        match self.slots.get() {
            Some(cell) => f(cell.borrow().as_ref()),
            None => f(None),
        }
    }

    /// Returns `true` if the calling thread has a bound value.
    pub fn is_bound(&self) -> bool {
        self.with_current(|value| value.is_some())
    }

    /// Clears the calling thread's binding and returns the value it held.
    pub fn release(&self) -> Option<T> {
        self.slots.get().and_then(|cell| cell.take())
    }

    /// Binds `value` and returns a guard that releases it when dropped.
    ///
    /// ```rust
    /// use contese::context::ScopedTaskContext;
    ///
    /// fn handle(ctx: &ScopedTaskContext<u32>, user: u32) -> Result<u32, String> {
    ///     let _guard = ctx.enter(user);
    ///     if user == 0 {
    ///         return Err("anonymous".into());
    ///     }
    ///     Ok(ctx.current().unwrap())
    /// }
    ///
    /// let ctx = ScopedTaskContext::new();
    /// assert!(handle(&ctx, 0).is_err());
    /// assert_eq!(ctx.current(), None);
    /// assert_eq!(handle(&ctx, 7), Ok(7));
    /// assert_eq!(ctx.current(), None);
    /// ```
    pub fn enter(&self, value: T) -> ContextGuard<'_, T> {
        if self.bind(value).is_some() {
            debug!(context = self.name, "overwrote a value left by an earlier task");
        }
        ContextGuard { context: self }
    }

    /// Runs `f` with `value` bound, releasing on every exit path.
    pub fn scope<R>(&self, value: T, f: impl FnOnce() -> R) -> R {
        let _guard = self.enter(value);
        f()
    }
}

impl<T: Send> Default for ScopedTaskContext<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + Debug> Debug for ScopedTaskContext<T> {
    /// Shows only the calling thread's value.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.with_current(|value| {
            f.debug_struct("ScopedTaskContext")
                .field("name", &self.name)
                .field("current", &value)
                .finish()
        })
    }
}

/// Releases the binding of a [`ScopedTaskContext`] when dropped.
#[must_use = "the context is released as soon as the guard is dropped"]
pub struct ContextGuard<'a, T: Send> {
    context: &'a ScopedTaskContext<T>,
}

impl<T: Send> ContextGuard<'_, T> {
    pub fn context(&self) -> &ScopedTaskContext<T> {
        self.context
    }
}

impl<T: Send> Drop for ContextGuard<'_, T> {
    fn drop(&mut self) {
        self.context.release();
    }
}

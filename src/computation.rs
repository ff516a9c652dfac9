//! Computation lifecycle and `autorun`.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::context::{self, BodyGuard};
use crate::scheduler;

/// Identifier assigned to each computation in creation order.
pub type ComputationId = u64;

thread_local! {
    static NEXT_ID: Cell<ComputationId> = const { Cell::new(1) };
}

/// A computation body. It receives its own computation handle, so it can
/// inspect [`first_run`](Computation::first_run) or wire up lifecycle
/// callbacks, and returns `Err` to signal a failure to the error-containment
/// machinery.
pub type Body = Box<dyn FnMut(&Computation) -> Result<(), anyhow::Error>>;

type LifecycleCallback = Box<dyn FnOnce(&Computation)>;
type ErrorHandler = Box<dyn FnMut(&anyhow::Error)>;

/// Options accepted by [`autorun_with_options`].
///
/// # Example
///
/// ```ignore
/// use reflow::{autorun_with_options, AutorunOptions};
///
/// let computation = autorun_with_options(
///     |_| fallible_work(),
///     AutorunOptions::new().on_error(|error| eprintln!("rerun failed: {error}")),
/// )?;
/// ```
#[derive(Default)]
pub struct AutorunOptions {
    on_error: Option<ErrorHandler>,
}

impl AutorunOptions {
    /// Create empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle body errors on reruns instead of reporting them to the error
    /// sink. Errors handled here never escalate, even under
    /// [`propagate_first_error`](crate::FlushOptions::propagate_first_error).
    pub fn on_error(mut self, handler: impl FnMut(&anyhow::Error) + 'static) -> Self {
        self.on_error = Some(Box::new(handler));
        self
    }
}

struct ComputationInner {
    id: ComputationId,
    stopped: Cell<bool>,
    invalidated: Cell<bool>,
    first_run: Cell<bool>,
    /// Set while the flush machinery is rerunning this computation, to keep
    /// a self-invalidating body from re-enqueueing itself: the flush loop
    /// re-queues it instead.
    recomputing: Cell<bool>,
    body: RefCell<Body>,
    on_invalidate: RefCell<Vec<LifecycleCallback>>,
    on_stop: RefCell<Vec<LifecycleCallback>>,
    on_error: Option<RefCell<ErrorHandler>>,
}

/// One reactive unit: a body plus lifecycle state and ordered callback
/// lists.
///
/// Handles are cheap to clone and compare by identity. A computation stays
/// alive while anything references it — a [`Dependency`](crate::Dependency)
/// it registered with, the pending-recompute queue, or a handle — and
/// [`stop`](Computation::stop) makes it permanently inert.
#[derive(Clone)]
pub struct Computation {
    inner: Rc<ComputationInner>,
}

impl PartialEq for Computation {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Computation {}

impl fmt::Debug for Computation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computation")
            .field("id", &self.inner.id)
            .field("stopped", &self.inner.stopped.get())
            .field("invalidated", &self.inner.invalidated.get())
            .field("first_run", &self.inner.first_run.get())
            .finish()
    }
}

impl Computation {
    fn new(body: Body, on_error: Option<ErrorHandler>) -> Self {
        let id = NEXT_ID.with(|next| {
            let id = next.get();
            next.set(id + 1);
            id
        });
        Self {
            inner: Rc::new(ComputationInner {
                id,
                stopped: Cell::new(false),
                invalidated: Cell::new(false),
                first_run: Cell::new(true),
                recomputing: Cell::new(false),
                body: RefCell::new(body),
                on_invalidate: RefCell::new(Vec::new()),
                on_stop: RefCell::new(Vec::new()),
                on_error: on_error.map(RefCell::new),
            }),
        }
    }

    /// Creation-order identifier, stable for the lifetime of the handle.
    pub fn id(&self) -> ComputationId {
        self.inner.id
    }

    /// True once [`stop`](Computation::stop) has been called; a stopped
    /// computation never executes its body again.
    pub fn stopped(&self) -> bool {
        self.inner.stopped.get()
    }

    /// True between an invalidation and the next rerun.
    pub fn invalidated(&self) -> bool {
        self.inner.invalidated.get()
    }

    /// True only during the initial synchronous execution inside
    /// [`autorun`].
    pub fn first_run(&self) -> bool {
        self.inner.first_run.get()
    }

    /// Mark this computation as needing a rerun at the next flush.
    ///
    /// Fires the pending invalidation callbacks immediately, in registration
    /// order, with no computation active. No-op if already invalidated;
    /// a stopped computation's callbacks still fire but it is never
    /// enqueued.
    pub fn invalidate(&self) {
        let inner = &self.inner;
        if inner.invalidated.get() {
            return;
        }
        // A computation that invalidates itself mid-rerun is re-queued by
        // the flush loop, not here.
        if !inner.recomputing.get() && !inner.stopped.get() {
            scheduler::enqueue(self.clone());
        }
        // The flag goes up before the callbacks fire, so an `on_invalidate`
        // registered by one of them runs immediately rather than joining
        // the list already being drained.
        inner.invalidated.set(true);
        self.fire_callbacks(&inner.on_invalidate);
    }

    /// Stop this computation permanently.
    ///
    /// Invalidation callbacks fire first (via the implied invalidation),
    /// then stop callbacks, each in registration order. Idempotent.
    pub fn stop(&self) {
        let inner = &self.inner;
        if inner.stopped.get() {
            return;
        }
        // Stopped goes up first so the invalidation below does not enqueue.
        inner.stopped.set(true);
        self.invalidate();
        self.fire_callbacks(&inner.on_stop);
    }

    /// Invalidate and immediately rerun this computation.
    ///
    /// No-op on a stopped computation. The body cannot re-enter itself: a
    /// `run` from inside the body only marks the computation invalidated,
    /// and the enclosing rerun loop picks it up.
    pub fn run(&self) {
        if self.inner.stopped.get() {
            return;
        }
        self.invalidate();
        self.flush();
    }

    /// Rerun this computation now if it is invalidated, without a global
    /// flush.
    ///
    /// No-op while the computation is already rerunning.
    pub fn flush(&self) {
        if self.inner.recomputing.get() {
            return;
        }
        self.recompute();
    }

    /// Register `f` to run at the next invalidation (or immediately, with no
    /// computation active, if this computation is already invalidated).
    ///
    /// Callbacks fire exactly once and are cleared afterwards; re-register
    /// from inside the body to observe every invalidation.
    pub fn on_invalidate<F>(&self, f: F)
    where
        F: FnOnce(&Computation) + 'static,
    {
        if self.inner.invalidated.get() {
            context::nonreactive(|| f(self));
        } else {
            self.inner.on_invalidate.borrow_mut().push(Box::new(f));
        }
    }

    /// Register `f` to run when this computation is stopped (or immediately,
    /// with no computation active, if it already is).
    pub fn on_stop<F>(&self, f: F)
    where
        F: FnOnce(&Computation) + 'static,
    {
        if self.inner.stopped.get() {
            context::nonreactive(|| f(self));
        } else {
            self.inner.on_stop.borrow_mut().push(Box::new(f));
        }
    }

    /// True if the next flush should rerun this computation.
    pub(crate) fn needs_recompute(&self) -> bool {
        self.inner.invalidated.get() && !self.inner.stopped.get()
    }

    /// Rerun the body once if needed, containing any error.
    ///
    /// Errors go to the computation's `on_error` handler when one was
    /// supplied, otherwise to the scheduler for sink reporting or
    /// first-error escalation.
    pub(crate) fn recompute(&self) {
        if !self.needs_recompute() {
            return;
        }
        let _recomputing = FlagGuard::raise(&self.inner.recomputing);
        if let Err(error) = self.compute() {
            match &self.inner.on_error {
                Some(handler) => (*handler.borrow_mut())(&error),
                None => scheduler::report_uncaught(error, self),
            }
        }
    }

    /// Execute the body with this computation current.
    fn compute(&self) -> Result<(), anyhow::Error> {
        // The body is not reentrant; a reentrant run settles for the
        // invalidation mark it already left.
        let Ok(mut body) = self.inner.body.try_borrow_mut() else {
            return Ok(());
        };
        self.inner.invalidated.set(false);
        let _body_context = BodyGuard::enter(self.clone());
        (*body)(self)
    }

    fn fire_callbacks(&self, callbacks: &RefCell<Vec<LifecycleCallback>>) {
        let callbacks = callbacks.take();
        for callback in callbacks {
            context::nonreactive(|| callback(self));
        }
    }
}

/// Raises a `Cell<bool>` flag, lowering it again on drop.
struct FlagGuard<'a> {
    flag: &'a Cell<bool>,
}

impl<'a> FlagGuard<'a> {
    fn raise(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self { flag }
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

/// Create a computation and run `body` immediately.
///
/// While the body executes, every [`Dependency::depend`](crate::Dependency::depend)
/// it reaches registers the computation for change notification; each rerun
/// re-registers from scratch, so the dependency set always reflects the most
/// recent run.
///
/// A body error during this first run stops the computation and propagates
/// to the caller. Errors on later reruns are contained per the flush rules.
///
/// Nested `autorun` calls create fully independent computations; stop an
/// inner one from the outer body's `on_invalidate` if their lifetimes should
/// be linked.
///
/// # Example
///
/// ```ignore
/// use reflow::{autorun, flush, Dependency};
///
/// let temperature = Dependency::new();
///
/// let computation = autorun(move |_| {
///     temperature.depend();
///     println!("temperature changed");
///     Ok(())
/// })?;
///
/// temperature.changed();
/// flush()?; // prints again
/// ```
pub fn autorun<F>(body: F) -> Result<Computation, anyhow::Error>
where
    F: FnMut(&Computation) -> Result<(), anyhow::Error> + 'static,
{
    autorun_with_options(body, AutorunOptions::default())
}

/// [`autorun`] with an [`AutorunOptions`] config, currently carrying the
/// per-computation `on_error` handler.
pub fn autorun_with_options<F>(
    body: F,
    options: AutorunOptions,
) -> Result<Computation, anyhow::Error>
where
    F: FnMut(&Computation) -> Result<(), anyhow::Error> + 'static,
{
    let computation = Computation::new(Box::new(body), options.on_error);
    let result = computation.compute();
    computation.inner.first_run.set(false);
    if let Err(error) = result {
        computation.stop();
        return Err(error);
    }
    Ok(computation)
}

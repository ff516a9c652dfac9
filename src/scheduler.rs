//! Flush scheduler: the pending-recompute queue, the after-flush queue, and
//! the drain rules that tie them together.
//!
//! All scheduler state lives in one thread-local value, initialized on
//! first use and never torn down. A drain is either explicit
//! ([`flush`], runs everything to completion) or background (entered through
//! the installed [`DeferredScheduler`], yields between bounded batches).

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::computation::Computation;
use crate::context;
use crate::defer::DeferredScheduler;
use crate::error::FlushError;
use crate::sink::{ErrorSink, TracingSink};

/// Number of recomputations a background drain processes before yielding
/// control back to the host and re-requesting continuation.
///
/// A policy constant, not a contract: explicit [`flush`] calls ignore it and
/// always run every currently and newly pending computation to completion.
pub const BACKGROUND_BATCH_SIZE: usize = 1000;

/// Options accepted by [`flush_with_options`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FlushOptions {
    /// Return the first uncaught computation body error to the caller as
    /// [`FlushError::Computation`], aborting the remainder of the pass,
    /// instead of reporting it to the error sink and continuing.
    pub propagate_first_error: bool,
}

struct Scheduler {
    /// FIFO of invalidated computations awaiting a rerun. Deduplicated by
    /// the `invalidated` flag discipline: `invalidate` is a no-op on an
    /// already-invalidated computation, so each entry appears once per
    /// invalidation. Stopped or settled entries are discarded at pop time.
    pending: VecDeque<Computation>,
    after_flush: VecDeque<Box<dyn FnOnce()>>,
    flushing: bool,
    scheduled: bool,
    propagate_first_error: bool,
    first_error: Option<anyhow::Error>,
    deferred: Option<Rc<dyn DeferredScheduler>>,
    sink: Option<Rc<dyn ErrorSink>>,
}

impl Scheduler {
    fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            after_flush: VecDeque::new(),
            flushing: false,
            scheduled: false,
            propagate_first_error: false,
            first_error: None,
            deferred: None,
            sink: None,
        }
    }

    fn has_work(&self) -> bool {
        !self.pending.is_empty() || !self.after_flush.is_empty()
    }
}

thread_local! {
    static SCHEDULER: RefCell<Scheduler> = RefCell::new(Scheduler::new());
}

/// Access the scheduler state. The borrow must never be held across foreign
/// code (computation bodies, callbacks, collaborators), all of which may
/// call back into the scheduler.
fn with<R>(f: impl FnOnce(&mut Scheduler) -> R) -> R {
    SCHEDULER.with(|scheduler| f(&mut scheduler.borrow_mut()))
}

/// Rerun all invalidated computations now, then run the after-flush queue.
///
/// Runs to completion: computations invalidated during the drain (including
/// by after-flush callbacks) rerun within this same call, so the caller
/// returns to a fully settled state. Body errors are reported per
/// computation and do not interrupt the drain.
///
/// Fails with [`FlushError::Reentrant`] during another flush and
/// [`FlushError::InComputation`] inside a computation body; both leave the
/// queues untouched.
pub fn flush() -> Result<(), FlushError> {
    flush_with_options(FlushOptions::default())
}

/// [`flush`] with a [`FlushOptions`] config.
///
/// # Example
///
/// ```ignore
/// use reflow::{flush_with_options, FlushOptions};
///
/// let options = FlushOptions {
///     propagate_first_error: true,
/// };
/// flush_with_options(options)?; // surfaces the first body error
/// ```
pub fn flush_with_options(options: FlushOptions) -> Result<(), FlushError> {
    run_flush(true, options.propagate_first_error)
}

/// Register a one-shot callback to run after the next flush settles.
///
/// After-flush callbacks run strictly FIFO, each guaranteed to observe zero
/// pending invalidated computations: recompute work created by one callback
/// drains completely before the next callback runs. Callbacks observe no
/// active computation. Registering requests a flush, so the callback runs
/// even if nothing is invalidated.
pub fn after_flush<F>(f: F)
where
    F: FnOnce() + 'static,
{
    with(|scheduler| scheduler.after_flush.push_back(Box::new(f)));
    require_flush();
}

/// True while a drain pass (including its after-flush phase) is running.
pub fn is_flushing() -> bool {
    with(|scheduler| scheduler.flushing)
}

/// True while a background drain has been requested from the deferred
/// scheduler but has not started yet.
pub fn is_flush_scheduled() -> bool {
    with(|scheduler| scheduler.scheduled)
}

/// Install (or clear) the deferred-callback collaborator used by the
/// background flush path.
///
/// Without one installed, invalidations accumulate until an explicit
/// [`flush`]. Installing one while work is pending requests a drain
/// immediately.
pub fn set_deferred_scheduler(scheduler: Option<Rc<dyn DeferredScheduler>>) {
    let has_work = with(|state| {
        state.deferred = scheduler;
        state.has_work()
    });
    if has_work {
        require_flush();
    }
}

/// Install (or clear) the sink for uncaught computation body errors.
///
/// `None` restores the default [`TracingSink`] behavior.
pub fn set_error_sink(sink: Option<Rc<dyn ErrorSink>>) {
    with(|scheduler| scheduler.sink = sink);
}

/// Queue an invalidated computation for the next drain and request one.
pub(crate) fn enqueue(computation: Computation) {
    with(|scheduler| scheduler.pending.push_back(computation));
    require_flush();
}

/// Route an uncaught body error: captured once for escalation when the
/// running flush asked for it, otherwise handed to the sink.
pub(crate) fn report_uncaught(error: anyhow::Error, computation: &Computation) {
    let report = with(|scheduler| {
        if scheduler.flushing
            && scheduler.propagate_first_error
            && scheduler.first_error.is_none()
        {
            scheduler.first_error = Some(error);
            None
        } else {
            Some((error, scheduler.sink.clone()))
        }
    });
    if let Some((error, sink)) = report {
        match sink {
            Some(sink) => sink.report(&error, computation),
            None => TracingSink.report(&error, computation),
        }
    }
}

/// Ask the deferred collaborator for a background drain, at most once until
/// it starts. No-op during a flush (the running drain picks the work up) or
/// when no collaborator is installed.
fn require_flush() {
    let deferred = with(|scheduler| {
        if scheduler.flushing || scheduler.scheduled {
            return None;
        }
        let deferred = scheduler.deferred.clone()?;
        scheduler.scheduled = true;
        Some(deferred)
    });
    if let Some(deferred) = deferred {
        deferred.defer(Box::new(run_deferred_pass));
    }
}

/// Entry point of the deferred drain task handed to the collaborator.
fn run_deferred_pass() {
    with(|scheduler| scheduler.scheduled = false);
    if let Err(error) = run_flush(false, false) {
        // The host invoked the drain task from inside a flush or a body;
        // the work is picked up by the pass already running.
        tracing::debug!(error = %error, "deferred flush pass skipped");
    }
}

fn run_flush(finish_synchronously: bool, propagate_first_error: bool) -> Result<(), FlushError> {
    with(|scheduler| {
        if scheduler.flushing {
            Err(FlushError::Reentrant)
        } else {
            Ok(())
        }
    })?;
    if context::in_computation_body() {
        return Err(FlushError::InComputation);
    }
    with(|scheduler| {
        scheduler.flushing = true;
        scheduler.propagate_first_error = propagate_first_error;
        scheduler.first_error = None;
    });

    let mut recomputed = 0usize;

    'drain: loop {
        // Rerun pending computations until none remain.
        loop {
            let computation = with(|scheduler| scheduler.pending.pop_front());
            let Some(computation) = computation else { break };
            if !computation.needs_recompute() {
                // Stopped, or settled by a per-computation flush.
                continue;
            }
            computation.recompute();
            // A body that re-invalidated itself goes back to the front of
            // the queue so it settles before anything later runs.
            if computation.needs_recompute() {
                with(|scheduler| scheduler.pending.push_front(computation));
            }
            if with(|scheduler| scheduler.first_error.is_some()) {
                break 'drain;
            }
            recomputed += 1;
            if !finish_synchronously && recomputed >= BACKGROUND_BATCH_SIZE {
                break 'drain;
            }
        }
        // One after-flush callback per turn, looping back into the
        // recompute drain before the next one.
        let callback = with(|scheduler| scheduler.after_flush.pop_front());
        match callback {
            Some(callback) => callback(),
            None => break 'drain,
        }
    }

    let (first_error, leftover) = with(|scheduler| {
        scheduler.flushing = false;
        scheduler.propagate_first_error = false;
        (scheduler.first_error.take(), scheduler.has_work())
    });

    // A yielded background slice or an aborted escalation leaves work
    // behind; hand the remainder to the deferred collaborator.
    if leftover {
        require_flush();
    }

    match first_error {
        Some(error) => Err(FlushError::Computation(error)),
        None => Ok(()),
    }
}

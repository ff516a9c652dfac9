//! Active-computation context.
//!
//! At most one computation is "current" at any instant. Body execution swaps
//! the slot through scoped guards so it is restored on every exit path, and
//! a separate depth counter records whether any body is on the call stack —
//! [`nonreactive`] clears the slot without leaving the body, and the flush
//! guards need to see through that.

use std::cell::{Cell, RefCell};

use crate::computation::Computation;
use crate::error::NotInComputation;

thread_local! {
    static CURRENT: RefCell<Option<Computation>> = const { RefCell::new(None) };
    static BODY_DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// True if there is a current computation, meaning a computation body is
/// executing reactively right now.
pub fn active() -> bool {
    CURRENT.with(|current| current.borrow().is_some())
}

/// The computation whose body is currently executing, if any.
pub fn current_computation() -> Option<Computation> {
    CURRENT.with(|current| current.borrow().clone())
}

/// True if any computation body is on the call stack, even inside a
/// [`nonreactive`] scope.
pub(crate) fn in_computation_body() -> bool {
    BODY_DEPTH.with(|depth| depth.get() > 0)
}

/// Run `f` with no current computation, so reads inside it do not register
/// dependencies.
///
/// Lifecycle callbacks (invalidation, stop, after-flush) are always invoked
/// through this, which is why they observe [`active`]`() == false` no matter
/// where the triggering call came from.
pub fn nonreactive<R>(f: impl FnOnce() -> R) -> R {
    let _guard = ContextGuard::swap(None);
    f()
}

/// Register `f` to run when the current computation is invalidated.
///
/// Fails with [`NotInComputation`] when called outside a computation body.
pub fn on_invalidate<F>(f: F) -> Result<(), NotInComputation>
where
    F: FnOnce(&Computation) + 'static,
{
    match current_computation() {
        Some(computation) => {
            computation.on_invalidate(f);
            Ok(())
        }
        None => Err(NotInComputation),
    }
}

/// Swaps the current-computation slot, restoring the previous value on drop.
pub(crate) struct ContextGuard {
    previous: Option<Computation>,
}

impl ContextGuard {
    pub(crate) fn swap(current: Option<Computation>) -> Self {
        let previous = CURRENT.with(|slot| slot.replace(current));
        Self { previous }
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|slot| *slot.borrow_mut() = previous);
    }
}

/// Context for one body execution: sets the computation current and tracks
/// body depth for the flush-from-computation guard.
pub(crate) struct BodyGuard {
    _context: ContextGuard,
}

impl BodyGuard {
    pub(crate) fn enter(computation: Computation) -> Self {
        BODY_DEPTH.with(|depth| depth.set(depth.get() + 1));
        Self {
            _context: ContextGuard::swap(Some(computation)),
        }
    }
}

impl Drop for BodyGuard {
    fn drop(&mut self) {
        BODY_DEPTH.with(|depth| depth.set(depth.get() - 1));
    }
}

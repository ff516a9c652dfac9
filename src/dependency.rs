//! Dependency: a registry of computations listening for a change signal.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::computation::{Computation, ComputationId};
use crate::context;

/// A registry of computations to notify on change.
///
/// Reading code calls [`depend`](Dependency::depend) so the active
/// computation reruns when [`changed`](Dependency::changed) is called.
/// The registry only ever contains live dependents: at the moment a
/// computation is captured, a removal callback is installed on it, so its
/// own invalidation (or stop) path drops it from the registry without the
/// dependency having to poll.
///
/// Clones share the same registry. Create one per independently changing
/// piece of state.
///
/// # Example
///
/// ```ignore
/// use reflow::{autorun, flush, Dependency};
///
/// let favorites = Dependency::new();
///
/// autorun(move |_| {
///     favorites.depend();
///     render_favorites();
///     Ok(())
/// })?;
///
/// favorites.changed(); // marks the computation for rerun
/// flush()?;
/// ```
#[derive(Clone, Default)]
pub struct Dependency {
    dependents: Rc<RefCell<IndexMap<ComputationId, Computation>>>,
}

impl Dependency {
    /// Create a dependency with no dependents.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the active computation as a dependent.
    ///
    /// Returns true if the computation is a new dependent rather than an
    /// existing one; false (and no-op) when no computation is active.
    pub fn depend(&self) -> bool {
        match context::current_computation() {
            Some(computation) => self.depend_on(&computation),
            None => false,
        }
    }

    /// Register a specific computation as a dependent, regardless of which
    /// computation is active.
    ///
    /// Returns true if the computation is a new dependent.
    pub fn depend_on(&self, computation: &Computation) -> bool {
        let id = computation.id();
        {
            let mut dependents = self.dependents.borrow_mut();
            if dependents.contains_key(&id) {
                return false;
            }
            dependents.insert(id, computation.clone());
        }
        // Reverse registration: the computation's invalidation path removes
        // it from this registry. Weak, so an abandoned dependency does not
        // outlive its last strong handle. An already-invalidated computation
        // fires this immediately and the net effect is removal on the spot.
        let dependents = Rc::downgrade(&self.dependents);
        computation.on_invalidate(move |computation| {
            if let Some(dependents) = dependents.upgrade() {
                dependents.borrow_mut().shift_remove(&computation.id());
            }
        });
        true
    }

    /// Invalidate every dependent computation, in the order they registered.
    pub fn changed(&self) {
        // Snapshot and clear first: each invalidation fires the removal
        // callback installed by `depend`, which must not mutate a registry
        // mid-iteration.
        let dependents: Vec<Computation> = self
            .dependents
            .borrow_mut()
            .drain(..)
            .map(|(_, computation)| computation)
            .collect();
        for computation in dependents {
            computation.invalidate();
        }
    }

    /// True if any computation is currently registered.
    pub fn has_dependents(&self) -> bool {
        !self.dependents.borrow().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::computation::autorun;

    #[test]
    fn test_depend_outside_computation_is_noop() {
        let dependency = Dependency::new();
        assert!(!dependency.depend());
        assert!(!dependency.has_dependents());
    }

    #[test]
    fn test_depend_is_idempotent_per_run() {
        let dependency = Dependency::new();
        let inner = dependency.clone();
        autorun(move |_| {
            assert!(inner.depend());
            assert!(!inner.depend());
            Ok(())
        })
        .unwrap();
        assert!(dependency.has_dependents());
    }

    #[test]
    fn test_invalidation_removes_dependent() {
        let dependency = Dependency::new();
        let inner = dependency.clone();
        let computation = autorun(move |_| {
            inner.depend();
            Ok(())
        })
        .unwrap();

        assert!(dependency.has_dependents());
        computation.invalidate();
        assert!(!dependency.has_dependents());
    }

    #[test]
    fn test_stop_removes_dependent() {
        let dependency = Dependency::new();
        let inner = dependency.clone();
        let computation = autorun(move |_| {
            inner.depend();
            Ok(())
        })
        .unwrap();

        computation.stop();
        assert!(!dependency.has_dependents());
    }

    #[test]
    fn test_depend_on_invalidated_computation_self_cleans() {
        let dependency = Dependency::new();
        let computation = autorun(|_| Ok(())).unwrap();
        computation.invalidate();

        // The removal callback fires immediately, so the insert is undone.
        assert!(dependency.depend_on(&computation));
        assert!(!dependency.has_dependents());
    }
}

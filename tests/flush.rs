//! Flush ordering: rerun batching, per-computation flush, and after-flush
//! interleaving.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use reflow::{active, after_flush, autorun, flush, nonreactive, Dependency};

// ============================================================================
// Rerun batching
// ============================================================================

#[test]
fn test_each_dependent_reruns_once_per_change() {
    let dependency = Dependency::new();
    let runs = Rc::new(Cell::new(0));

    let inner_dependency = dependency.clone();
    let inner_runs = runs.clone();
    let _computation = autorun(move |_| {
        inner_dependency.depend();
        inner_runs.set(inner_runs.get() + 1);
        Ok(())
    })
    .unwrap();

    assert_eq!(runs.get(), 1);
    flush().unwrap();
    assert_eq!(runs.get(), 1);

    dependency.changed();
    assert_eq!(runs.get(), 1); // nothing runs until the flush
    flush().unwrap();
    assert_eq!(runs.get(), 2);

    dependency.changed();
    flush().unwrap();
    assert_eq!(runs.get(), 3);
}

#[test]
fn test_dependents_rerun_in_creation_order() {
    let dependency = Dependency::new();
    let order = Rc::new(RefCell::new(Vec::new()));

    for label in ["first", "second", "third"] {
        let inner_dependency = dependency.clone();
        let inner_order = order.clone();
        autorun(move |computation| {
            inner_dependency.depend();
            if !computation.first_run() {
                inner_order.borrow_mut().push(label);
            }
            Ok(())
        })
        .unwrap();
    }

    dependency.changed();
    flush().unwrap();
    assert_eq!(*order.borrow(), vec!["first", "second", "third"]);
}

#[test]
fn test_computation_flush_reruns_only_its_target() {
    let dependency = Dependency::new();
    let first_runs = Rc::new(Cell::new(0));
    let second_runs = Rc::new(Cell::new(0));

    let inner_dependency = dependency.clone();
    let inner_runs = first_runs.clone();
    let first = autorun(move |_| {
        inner_dependency.depend();
        inner_runs.set(inner_runs.get() + 1);
        Ok(())
    })
    .unwrap();

    let inner_dependency = dependency.clone();
    let inner_runs = second_runs.clone();
    let _second = autorun(move |_| {
        inner_dependency.depend();
        inner_runs.set(inner_runs.get() + 1);
        Ok(())
    })
    .unwrap();

    assert_eq!(first_runs.get(), 1);
    assert_eq!(second_runs.get(), 1);

    dependency.changed();
    first.flush();
    assert_eq!(first_runs.get(), 2);
    assert_eq!(second_runs.get(), 1);

    flush().unwrap();
    assert_eq!(first_runs.get(), 2);
    assert_eq!(second_runs.get(), 2);
}

#[test]
fn test_run_picks_up_dependencies_of_latest_run() {
    let dependency = Dependency::new();
    let conditional = Dependency::new();
    let runs = Rc::new(Cell::new(0));

    let inner_dependency = dependency.clone();
    let inner_conditional = conditional.clone();
    let inner_runs = runs.clone();
    let computation = autorun(move |_| {
        inner_dependency.depend();
        inner_runs.set(inner_runs.get() + 1);
        // picked up only on the second and third runs
        let count = inner_runs.get();
        if (2..4).contains(&count) {
            inner_conditional.depend();
        }
        Ok(())
    })
    .unwrap();

    assert_eq!(runs.get(), 1);
    computation.run();
    assert_eq!(runs.get(), 2);

    dependency.changed();
    flush().unwrap();
    assert_eq!(runs.get(), 3);

    // the conditional dependency is live at this point
    conditional.changed();
    flush().unwrap();
    assert_eq!(runs.get(), 4);

    // the fourth run dropped it again
    conditional.changed();
    flush().unwrap();
    assert_eq!(runs.get(), 4);
    dependency.changed();
    flush().unwrap();
    assert_eq!(runs.get(), 5);
}

#[test]
fn test_stop_prevents_reruns() {
    let dependency = Dependency::new();
    let runs = Rc::new(Cell::new(0));

    let inner_dependency = dependency.clone();
    let inner_runs = runs.clone();
    let handle = autorun(move |_| {
        inner_dependency.depend();
        inner_runs.set(inner_runs.get() + 1);
        Ok(())
    })
    .unwrap();

    dependency.changed();
    handle.stop();
    flush().unwrap();
    assert_eq!(runs.get(), 1);

    dependency.changed();
    flush().unwrap();
    assert_eq!(runs.get(), 1);
    assert!(!dependency.has_dependents());
}

#[test]
fn test_self_stop_from_body() {
    let dependency = Dependency::new();
    let runs = Rc::new(Cell::new(0));

    let inner_dependency = dependency.clone();
    let inner_runs = runs.clone();
    autorun(move |computation| {
        inner_dependency.depend();
        inner_runs.set(inner_runs.get() + 1);
        if inner_runs.get() == 3 {
            computation.stop();
        }
        Ok(())
    })
    .unwrap();

    assert_eq!(runs.get(), 1);
    dependency.changed();
    flush().unwrap();
    assert_eq!(runs.get(), 2);
    dependency.changed();
    // reaches 3 and stops itself
    flush().unwrap();
    assert_eq!(runs.get(), 3);
    dependency.changed();
    flush().unwrap();
    // still 3
    assert_eq!(runs.get(), 3);
}

#[test]
fn test_nonreactive_read_registers_no_dependency() {
    let tracked = Dependency::new();
    let untracked = Dependency::new();
    let runs = Rc::new(Cell::new(0));

    let inner_tracked = tracked.clone();
    let inner_untracked = untracked.clone();
    let inner_runs = runs.clone();
    let _computation = autorun(move |_| {
        inner_tracked.depend();
        let registered = nonreactive(|| inner_untracked.depend());
        assert!(!registered);
        inner_runs.set(inner_runs.get() + 1);
        Ok(())
    })
    .unwrap();

    assert!(tracked.has_dependents());
    assert!(!untracked.has_dependents());

    untracked.changed();
    flush().unwrap();
    assert_eq!(runs.get(), 1);

    tracked.changed();
    flush().unwrap();
    assert_eq!(runs.get(), 2);
}

// ============================================================================
// Self-invalidation
// ============================================================================

#[test]
fn test_self_invalidate_on_first_run_reruns_once() {
    let buf = Rc::new(RefCell::new(String::new()));

    let inner_buf = buf.clone();
    let computation = autorun(move |computation| {
        inner_buf.borrow_mut().push('a');
        if computation.first_run() {
            computation.invalidate();
        }
        Ok(())
    })
    .unwrap();

    assert_eq!(*buf.borrow(), "a");
    flush().unwrap();
    assert_eq!(*buf.borrow(), "aa");
    flush().unwrap();
    assert_eq!(*buf.borrow(), "aa");
    computation.stop();
    flush().unwrap();
    assert_eq!(*buf.borrow(), "aa");
}

#[test]
fn test_invalidation_callback_after_self_invalidate_fires_immediately() {
    let buf = Rc::new(RefCell::new(String::new()));

    let inner_buf = buf.clone();
    let computation = autorun(move |computation| {
        inner_buf.borrow_mut().push('a');
        if computation.first_run() {
            computation.invalidate();
        }
        // already invalidated on the first run, so this fires on the spot
        let callback_buf = inner_buf.clone();
        computation.on_invalidate(move |_| callback_buf.borrow_mut().push('*'));
        Ok(())
    })
    .unwrap();

    assert_eq!(*buf.borrow(), "a*");
    flush().unwrap();
    assert_eq!(*buf.borrow(), "a*a");
    computation.stop();
    assert_eq!(*buf.borrow(), "a*a*");
    flush().unwrap();
    assert_eq!(*buf.borrow(), "a*a*");
}

#[test]
fn test_flush_completes_2000_self_invalidations() {
    // An explicit flush never yields: every currently and newly pending
    // rerun completes within the one call.
    let count = Rc::new(Cell::new(0));

    let inner_count = count.clone();
    let _computation = autorun(move |computation| {
        inner_count.set(inner_count.get() + 1);
        if inner_count.get() < 2000 {
            computation.invalidate();
        }
        Ok(())
    })
    .unwrap();

    assert_eq!(count.get(), 1);
    flush().unwrap();
    assert_eq!(count.get(), 2000);
}

// ============================================================================
// After-flush
// ============================================================================

#[test]
fn test_after_flush_runs_outside_any_computation() {
    let buf = Rc::new(RefCell::new(String::new()));

    let inner_buf = buf.clone();
    let first = autorun(move |computation| {
        inner_buf.borrow_mut().push('a');
        if computation.first_run() {
            computation.invalidate();
        }
        let callback_buf = inner_buf.clone();
        after_flush(move || {
            callback_buf
                .borrow_mut()
                .push(if active() { '1' } else { '0' });
        });
        Ok(())
    })
    .unwrap();

    let callback_buf = buf.clone();
    after_flush(move || callback_buf.borrow_mut().push('c'));

    let inner_buf = buf.clone();
    let second = autorun(move |_| {
        inner_buf.borrow_mut().push('b');
        Ok(())
    })
    .unwrap();

    flush().unwrap();
    assert_eq!(*buf.borrow(), "aba0c0");
    first.stop();
    second.stop();
    flush().unwrap();
}

#[test]
fn test_after_flush_observes_settled_state() {
    // A computation invalidated by one after-flush callback fully reruns
    // before the next after-flush callback executes.
    let buf = Rc::new(RefCell::new(String::new()));

    let inner_buf = buf.clone();
    let computation = autorun(move |computation| {
        inner_buf.borrow_mut().push('a');
        if computation.first_run() {
            computation.invalidate();
        }
        Ok(())
    })
    .unwrap();

    let first_buf = buf.clone();
    let first_target = computation.clone();
    after_flush(move || {
        first_buf.borrow_mut().push('x');
        first_target.invalidate();
    });
    let second_buf = buf.clone();
    after_flush(move || second_buf.borrow_mut().push('z'));

    flush().unwrap();
    // initial rerun settles first, then x's re-invalidation settles before z
    assert_eq!(*buf.borrow(), "aaxaz");
}

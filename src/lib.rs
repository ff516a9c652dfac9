#![deny(missing_docs)]

//! Reflow: a single-threaded reactive dependency-tracking runtime.
//!
//! A piece of logic wrapped in [`autorun`] automatically re-executes when
//! data it read during its last run changes. Changes are batched into
//! discrete, deterministically ordered flush passes rather than applied
//! immediately: invalidating a computation only marks it and queues it; a
//! [`flush`] (explicit, or deferred through the host) reruns everything
//! pending, then runs [`after_flush`] callbacks against a settled state.
//!
//! # Quick Start
//!
//! ```ignore
//! use reflow::{autorun, flush, Dependency};
//!
//! let weather = Dependency::new();
//!
//! let computation = autorun(move |_| {
//!     weather.depend();          // rerun when `weather` changes
//!     println!("forecast updated");
//!     Ok(())
//! })?;
//!
//! weather.changed();             // marks the computation, nothing runs yet
//! flush()?;                      // prints "forecast updated"
//!
//! computation.stop();            // permanently inert
//! ```
//!
//! # Core Types
//!
//! - [`Dependency`] — registry of computations to notify on change. Call
//!   [`depend`](Dependency::depend) while reading, [`changed`](Dependency::changed)
//!   after writing.
//! - [`Computation`] — one reactive unit with lifecycle state
//!   (`stopped`/`invalidated`/`first_run`) and ordered callback lists.
//! - [`flush`] / [`after_flush`] — drain all pending reruns now; register
//!   callbacks guaranteed to observe zero pending invalidated computations.
//!
//! # Scheduling
//!
//! Everything runs on one logical thread. Correctness rests on strict
//! reentrancy rules instead of locks: nested flushes and flushes from
//! inside a computation body are rejected with [`FlushError`]. The only
//! asynchronous boundary is the background drain, which the engine requests
//! through an installed [`DeferredScheduler`] and which yields between
//! batches of [`BACKGROUND_BATCH_SIZE`] recomputations. Hosts without an
//! event loop install a [`ManualScheduler`] or simply call [`flush`].
//!
//! # Error Handling
//!
//! Computation bodies return `Result<(), anyhow::Error>`. A rerun error is
//! contained per computation: it goes to the computation's
//! [`on_error`](AutorunOptions::on_error) handler when one was supplied,
//! otherwise to the installed [`ErrorSink`] (default: [`TracingSink`]), and
//! the drain continues. Pass
//! [`propagate_first_error`](FlushOptions::propagate_first_error) to
//! [`flush_with_options`] to surface the first uncaught error to the caller
//! instead.

mod computation;
mod context;
mod defer;
mod dependency;
mod error;
mod scheduler;
mod sink;

pub use computation::{
    autorun, autorun_with_options, AutorunOptions, Body, Computation, ComputationId,
};
pub use context::{active, current_computation, nonreactive, on_invalidate};
pub use defer::{DeferredScheduler, DeferredTask, ManualScheduler};
pub use dependency::Dependency;
pub use error::{FlushError, NotInComputation};
pub use scheduler::{
    after_flush, flush, flush_with_options, is_flush_scheduled, is_flushing,
    set_deferred_scheduler, set_error_sink, FlushOptions, BACKGROUND_BATCH_SIZE,
};
pub use sink::{ErrorSink, TracingSink};

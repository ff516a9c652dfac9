//! Error sink for uncaught computation body errors.
//!
//! When a computation body fails and neither an `on_error` handler nor
//! first-error escalation applies, the error is handed to the installed
//! [`ErrorSink`]. The default [`TracingSink`] logs through [`tracing`].

use crate::computation::Computation;

/// Sink invoked with uncaught, non-escalated computation body errors.
///
/// Install one with [`set_error_sink`](crate::set_error_sink) to route
/// errors to a host-specific reporter. Implementations must not assume a
/// settled scheduler: the sink is called mid-drain, between computations.
///
/// # Example
///
/// ```ignore
/// use reflow::{Computation, ErrorSink};
///
/// struct CollectingSink(std::cell::RefCell<Vec<String>>);
///
/// impl ErrorSink for CollectingSink {
///     fn report(&self, error: &anyhow::Error, _computation: &Computation) {
///         self.0.borrow_mut().push(error.to_string());
///     }
/// }
/// ```
pub trait ErrorSink {
    /// Report an error raised by `computation`'s body.
    fn report(&self, error: &anyhow::Error, computation: &Computation);
}

/// Default sink that logs errors through `tracing::error!`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ErrorSink for TracingSink {
    fn report(&self, error: &anyhow::Error, computation: &Computation) {
        tracing::error!(
            computation = computation.id(),
            error = %error,
            "uncaught error in computation"
        );
    }
}

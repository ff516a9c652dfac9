//! Error types for the flush scheduler and context operations.

/// Errors returned by [`flush`](crate::flush) and
/// [`flush_with_options`](crate::flush_with_options).
///
/// The reentrancy variants are rejected before any queue state is touched, so
/// a failed flush leaves the scheduler able to flush again later.
#[derive(Debug, thiserror::Error)]
pub enum FlushError {
    /// A flush pass is already draining; nested flushes are rejected.
    #[error("can't flush while already flushing")]
    Reentrant,

    /// `flush` was called from inside a running computation body.
    #[error("can't flush from inside a computation")]
    InComputation,

    /// A computation body failed while
    /// [`propagate_first_error`](crate::FlushOptions::propagate_first_error)
    /// was set.
    ///
    /// Only the first such error is captured; it is returned after the queue
    /// has been put back in a consistent state. Errors handled by a
    /// computation's own `on_error` handler never surface here.
    #[error("computation failed during flush: {0}")]
    Computation(anyhow::Error),
}

/// Error returned by operations that require an active computation, such as
/// the free-standing [`on_invalidate`](crate::on_invalidate).
#[derive(Debug, thiserror::Error)]
#[error("not inside an active computation")]
pub struct NotInComputation;

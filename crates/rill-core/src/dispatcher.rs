//! Execution-context abstraction for thread-affine work.
//!
//! The engine itself is free-threaded; the one hard affinity constraint is
//! that collection-diff batches are applied on the thread owning the bound
//! collection. Hosts supply a [`Dispatcher`] for that marshalling. There is
//! no global dispatcher: it is threaded explicitly through
//! [`SourceContext`](crate::context::SourceContext) construction.

/// Marshals work onto the execution context that owns a bound collection.
pub trait Dispatcher: Send + Sync {
    /// Whether the calling thread already is the owner context.
    fn has_thread_access(&self) -> bool;

    /// Queue work to run on the owner context.
    fn enqueue(&self, work: Box<dyn FnOnce() + Send>);
}

/// Dispatcher that runs everything inline on the calling thread.
///
/// Suitable for bootstrap and for hosts without thread affinity.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineDispatcher;

impl Dispatcher for InlineDispatcher {
    fn has_thread_access(&self) -> bool {
        true
    }

    fn enqueue(&self, work: Box<dyn FnOnce() + Send>) {
        work();
    }
}

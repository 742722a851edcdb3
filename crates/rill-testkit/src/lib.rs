//! Rill Testkit - Shared Test Utilities
//!
//! A queueing [`TestDispatcher`] for exercising thread-marshalling paths,
//! timeout-guarded stream helpers, and tracing bootstrap for test output.
//! Dev-dependency only; panics are the failure mode throughout.

#![forbid(unsafe_code)]
#![allow(clippy::expect_used)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;
use std::time::Duration;

use futures::{Stream, StreamExt};
use parking_lot::Mutex;

use rill_core::dispatcher::Dispatcher;

const STREAM_TIMEOUT: Duration = Duration::from_secs(1);

/// Install a tracing subscriber honoring `RUST_LOG`. Idempotent.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A dispatcher that queues work until the test drains it.
///
/// The thread-access flag is test-controlled, so both the fast path
/// (direct application) and the marshalling path (enqueue, then
/// [`run_pending`]) can be exercised deterministically.
///
/// [`run_pending`]: TestDispatcher::run_pending
#[derive(Default)]
pub struct TestDispatcher {
    queue: Mutex<VecDeque<Box<dyn FnOnce() + Send>>>,
    thread_access: AtomicBool,
}

impl TestDispatcher {
    /// A dispatcher reporting the given thread access.
    pub fn new(has_thread_access: bool) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            thread_access: AtomicBool::new(has_thread_access),
        }
    }

    /// Flip the thread-access flag.
    pub fn set_thread_access(&self, has_access: bool) {
        self.thread_access.store(has_access, Ordering::SeqCst);
    }

    /// Queued work items not yet run.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Run everything queued so far, in order; returns how many ran.
    ///
    /// Work enqueued by the running items is picked up too.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            let Some(work) = self.queue.lock().pop_front() else {
                break;
            };
            work();
            ran += 1;
        }
        ran
    }
}

impl Dispatcher for TestDispatcher {
    fn has_thread_access(&self) -> bool {
        self.thread_access.load(Ordering::SeqCst)
    }

    fn enqueue(&self, work: Box<dyn FnOnce() + Send>) {
        self.queue.lock().push_back(work);
    }
}

impl std::fmt::Debug for TestDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestDispatcher")
            .field("pending", &self.pending())
            .field("thread_access", &self.has_thread_access())
            .finish()
    }
}

/// Next stream item, or panic after a deadline.
pub async fn next_item<S: Stream + Unpin>(stream: &mut S) -> S::Item {
    tokio::time::timeout(STREAM_TIMEOUT, stream.next())
        .await
        .expect("stream produced nothing before the deadline")
        .expect("stream ended unexpectedly")
}

/// Collect exactly `count` items, or panic after a deadline.
pub async fn collect_items<S: Stream + Unpin>(stream: &mut S, count: usize) -> Vec<S::Item> {
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(next_item(stream).await);
    }
    items
}

/// Assert the stream yields nothing within the window.
pub async fn assert_idle<S: Stream + Unpin>(stream: &mut S, window: Duration) {
    let outcome = tokio::time::timeout(window, stream.next()).await;
    assert!(outcome.is_err(), "stream yielded during an idle window");
}

/// Assert the stream has ended.
pub async fn assert_ended<S: Stream + Unpin>(stream: &mut S) {
    let outcome = tokio::time::timeout(STREAM_TIMEOUT, stream.next()).await;
    assert!(
        matches!(outcome, Ok(None)),
        "stream did not end before the deadline"
    );
}

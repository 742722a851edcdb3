//! # State
//!
//! A [`State`] owns the latest [`Message`] and publishes every update to
//! its subscribers. Subscriptions replay the current message first and then
//! forward live updates in production order, with no duplicates and no
//! reordering. Updates serialize through an async FIFO guard, so concurrent
//! writers queue instead of racing and a logical flow that re-enters never
//! deadlocks a thread.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Mutex;

use rill_core::context::{CancellationToken, SourceContext};
use rill_core::errors::FeedError;
use rill_core::message::{Data, Message, MessageBuilder};

use crate::feed::{Feed, MessageStream};

const STATE_CHANNEL_CAPACITY: usize = 64;

struct StateInner<T> {
    /// Version-stamped current message; versions only grow.
    current: RwLock<(u64, Message<T>)>,
    /// FIFO-fair update guard. Async so queued writers suspend instead of
    /// blocking a thread.
    guard: Mutex<()>,
    publisher: broadcast::Sender<(u64, Message<T>)>,
}

/// Shared mutable message holder with replay-then-live subscriptions.
pub struct State<T> {
    inner: Arc<StateInner<T>>,
}

impl<T> Clone for State<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for State<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("version", &self.inner.current.read().0)
            .finish()
    }
}

impl<T> State<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// A state holding a value.
    pub fn new(initial: T) -> Self {
        Self::from_data(Data::Some(initial))
    }

    /// A state holding an explicit data-axis payload.
    pub fn from_data(data: Data<T>) -> Self {
        let message = Message::initial().with().data(data).build();
        let (publisher, _) = broadcast::channel(STATE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(StateInner {
                current: RwLock::new((0, message)),
                guard: Mutex::new(()),
                publisher,
            }),
        }
    }

    /// The current message.
    pub fn current(&self) -> Message<T> {
        self.inner.current.read().1.clone()
    }

    /// Apply one update and publish exactly one message.
    ///
    /// Updates acquire the guard in FIFO order, so an update that begins
    /// after another completed observes its result. Cancellation while
    /// queued returns [`FeedError::Cancelled`] and leaves the state
    /// untouched.
    pub async fn update_message(
        &self,
        update: impl FnOnce(MessageBuilder<T>) -> MessageBuilder<T>,
        ct: &CancellationToken,
    ) -> Result<(), FeedError> {
        let _permit = tokio::select! {
            permit = self.inner.guard.lock() => permit,
            _ = ct.cancelled() => return Err(FeedError::Cancelled),
        };
        if ct.is_cancelled() {
            return Err(FeedError::Cancelled);
        }

        let current = self.inner.current.read().1.clone();
        let next = update(current.with()).build();
        {
            let mut slot = self.inner.current.write();
            slot.0 += 1;
            slot.1 = next.clone();
            // No receivers is fine; replay covers late subscribers.
            let _ = self.inner.publisher.send((slot.0, next));
        }
        Ok(())
    }

    /// Replay-then-live subscription.
    ///
    /// Emits the current message first, then every later update in
    /// production order. A lagged subscriber skips what it missed; the
    /// version filter guarantees the replayed message is never delivered
    /// twice.
    pub fn subscribe(&self) -> MessageStream<T> {
        let receiver = self.inner.publisher.subscribe();
        let (version, snapshot) = self.inner.current.read().clone();

        stream::unfold(
            (receiver, version, Some(snapshot)),
            |(mut receiver, seen, mut replay)| async move {
                if let Some(message) = replay.take() {
                    return Some((message, (receiver, seen, None)));
                }
                loop {
                    match receiver.recv().await {
                        Ok((version, message)) if version > seen => {
                            return Some((message, (receiver, version, None)));
                        }
                        Ok(_) => continue,
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::debug!(skipped, "state subscriber lagged");
                            continue;
                        }
                        Err(RecvError::Closed) => return None,
                    }
                }
            },
        )
        .boxed()
    }
}

impl<T> Feed<T> for State<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn source(&self, _context: Arc<SourceContext>, ct: CancellationToken) -> MessageStream<T> {
        let cancelled = Box::pin(async move { ct.cancelled().await });
        self.subscribe().take_until(cancelled).boxed()
    }
}

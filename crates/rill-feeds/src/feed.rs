//! # Feeds
//!
//! A [`Feed`] is a lazy, restartable producer of [`Message`]s: nothing runs
//! until `source` is called, and every call opens an independent
//! subscription. [`AsyncFeed`] wraps an async loader; each subscription
//! performs an initial load and then reloads once per refresh token from a
//! [`CoercingRequestManager`], so a burst of refresh requests costs one
//! reload.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};
use futures::FutureExt;

use rill_core::context::{CancellationToken, SourceContext};
use rill_core::errors::FeedError;
use rill_core::message::{Data, Message};
use rill_core::request::{CoercingRequestManager, RequestKind};
use rill_core::token::Token;

/// The message stream one subscription observes.
pub type MessageStream<T> = BoxStream<'static, Message<T>>;

/// A lazy, restartable message producer.
///
/// `source` must not share mutable state across calls except through the
/// context's request plumbing; two subscriptions to the same feed are
/// independent.
pub trait Feed<T>: Send + Sync {
    /// Open a subscription scoped to `context`, ending when `ct` cancels.
    fn source(&self, context: Arc<SourceContext>, ct: CancellationToken) -> MessageStream<T>;
}

type Loader<T> =
    Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, Result<Data<T>, FeedError>> + Send + Sync>;

/// A feed backed by an async loader.
///
/// Per load: a message with the progress axis raised, then a message with
/// the loaded data (or the load error on the error axis; errors never end
/// the stream). Cancellation ends the stream without an error message.
pub struct AsyncFeed<T> {
    loader: Loader<T>,
}

impl<T> Clone for AsyncFeed<T> {
    fn clone(&self) -> Self {
        Self {
            loader: Arc::clone(&self.loader),
        }
    }
}

impl<T> std::fmt::Debug for AsyncFeed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncFeed").finish()
    }
}

impl<T> AsyncFeed<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Wrap a loader producing a value.
    pub fn new<F, Fut>(loader: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, FeedError>> + Send + 'static,
    {
        Self::from_data_loader(move |ct| {
            let load = loader(ct);
            async move { load.await.map(Data::Some) }
        })
    }

    /// Wrap a loader that distinguishes absent results itself.
    pub fn from_data_loader<F, Fut>(loader: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Data<T>, FeedError>> + Send + 'static,
    {
        Self {
            loader: Arc::new(move |ct| loader(ct).boxed()),
        }
    }
}

enum Mode {
    /// Emit the progress message for the next load.
    Start,
    /// Run the loader and emit its outcome.
    Load,
    /// Wait for the next refresh token.
    AwaitToken,
}

struct Subscription<T> {
    last: Message<T>,
    mode: Mode,
    tokens: BoxStream<'static, Token>,
    loader: Loader<T>,
    ct: CancellationToken,
}

impl<T> Feed<T> for AsyncFeed<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn source(&self, context: Arc<SourceContext>, ct: CancellationToken) -> MessageStream<T> {
        let manager = CoercingRequestManager::register(&context, RequestKind::Refresh);
        let subscription = Subscription {
            last: Message::initial(),
            mode: Mode::Start,
            tokens: manager.tokens(),
            loader: Arc::clone(&self.loader),
            ct,
        };

        stream::unfold(subscription, |mut sub| async move {
            loop {
                match sub.mode {
                    Mode::Start => {
                        if sub.ct.is_cancelled() {
                            return None;
                        }
                        sub.mode = Mode::Load;
                        let message = sub.last.with().progress(true).build();
                        sub.last = message.clone();
                        return Some((message, sub));
                    }
                    Mode::Load => {
                        sub.mode = Mode::AwaitToken;
                        let load = (sub.loader)(sub.ct.clone());
                        let outcome = tokio::select! {
                            _ = sub.ct.cancelled() => return None,
                            outcome = load => outcome,
                        };
                        let message = match outcome {
                            Ok(data) => sub
                                .last
                                .with()
                                .data(data)
                                .clear_error()
                                .progress(false)
                                .build(),
                            Err(error) if error.is_cancellation() => return None,
                            Err(error) => {
                                tracing::debug!(%error, "feed load failed");
                                sub.last
                                    .with()
                                    .error(Some(Arc::new(error)))
                                    .progress(false)
                                    .build()
                            }
                        };
                        sub.last = message.clone();
                        return Some((message, sub));
                    }
                    Mode::AwaitToken => match sub.tokens.next().await {
                        Some(_) => sub.mode = Mode::Start,
                        None => return None,
                    },
                }
            }
        })
        .boxed()
    }
}

//! Request-to-token managers.
//!
//! A manager listens for one [`RequestKind`] on a context node and turns the
//! incoming requests into the token stream a producer consumes. Two
//! policies exist:
//!
//! - [`CoercingRequestManager`] coalesces bursts: at most one unit of
//!   outstanding work per producer.
//! - [`SequentialRequestManager`] mints a token per request: every request
//!   is distinctly observable.
//!
//! Both complete their token stream when the owning context cancels, and
//! both expose the most recently observed request for diagnostics
//! (`last_request` is not authoritative for ordering — only token sequence
//! ids are).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, Notify};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::context::{CancellationToken, SourceContext};
use crate::request::{FeedRequest, RequestKind};
use crate::token::{SourceId, Token};

/// Forwards matching requests from a context's broadcast channel into a
/// handler until the context cancels. Lagged receivers skip and continue;
/// a closed channel ends the loop.
fn spawn_request_listener(
    mut rx: broadcast::Receiver<FeedRequest>,
    ct: CancellationToken,
    kind: RequestKind,
    mut handle: impl FnMut(FeedRequest) + Send + 'static,
    on_exit: impl FnOnce() + Send + 'static,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = ct.cancelled() => break,
                received = rx.recv() => match received {
                    Ok(request) if request.kind() == kind => handle(request),
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, ?kind, "request channel lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        on_exit();
    });
}

// ─── Coercing manager ────────────────────────────────────────

struct CoerceState {
    /// Last token yielded to the producer.
    current: Option<Token>,
    /// Minted but not yet yielded; bursts coalesce onto this one.
    pending: Option<Token>,
    last_request: Option<FeedRequest>,
}

struct CoercingInner {
    source: SourceId,
    root_context_id: u32,
    state: Mutex<CoerceState>,
    notify: Notify,
}

impl CoercingInner {
    fn handle_request(&self, request: FeedRequest) {
        let token = {
            let mut state = self.state.lock();
            state.last_request = Some(request.clone());
            match state.pending {
                // Unconsumed token in flight: coalesce onto it.
                Some(token) => token,
                None => {
                    let token = state
                        .current
                        .map(|current| current.next())
                        .unwrap_or_else(|| Token::initial(self.source, self.root_context_id));
                    state.pending = Some(token);
                    token
                }
            }
        };
        request.tokens().push(token);
        self.notify.notify_waiters();
    }

    fn take_pending(&self) -> Option<Token> {
        let mut state = self.state.lock();
        let token = state.pending.take()?;
        state.current = Some(token);
        Some(token)
    }
}

/// Coalescing request manager: while the minted token is unconsumed, further
/// requests observe the same token and no new one is minted. Yielding the
/// token to the producer marks it consumed; the next request then mints the
/// successor lazily. A burst of k requests before the producer's next
/// enumeration step yields exactly one token.
pub struct CoercingRequestManager {
    inner: Arc<CoercingInner>,
    ct: CancellationToken,
}

impl CoercingRequestManager {
    /// Register on `context` for requests of `kind`.
    pub fn register(context: &Arc<SourceContext>, kind: RequestKind) -> Self {
        let inner = Arc::new(CoercingInner {
            source: SourceId::next(),
            root_context_id: context.root_context_id(),
            state: Mutex::new(CoerceState {
                current: None,
                pending: None,
                last_request: None,
            }),
            notify: Notify::new(),
        });
        let ct = context.cancellation_token();

        let handler = Arc::clone(&inner);
        let waker = Arc::clone(&inner);
        spawn_request_listener(
            context.requests(),
            ct.clone(),
            kind,
            move |request| handler.handle_request(request),
            move || waker.notify.notify_waiters(),
        );

        Self { inner, ct }
    }

    /// The producer identity tokens are minted under.
    pub fn source(&self) -> SourceId {
        self.inner.source
    }

    /// Most recently observed request, for diagnostics only.
    pub fn last_request(&self) -> Option<FeedRequest> {
        self.inner.state.lock().last_request.clone()
    }

    /// The token stream a producer consumes.
    ///
    /// Completes when the owning context cancels. Each yielded token is
    /// consumed by the act of yielding; pending work already minted is
    /// still delivered before the stream observes cancellation.
    pub fn tokens(&self) -> BoxStream<'static, Token> {
        let inner = Arc::clone(&self.inner);
        let ct = self.ct.clone();
        stream::unfold((inner, ct), |(inner, ct)| async move {
            loop {
                // `notify_waiters` only wakes registered waiters, so the
                // waiter must be enabled before the pending check: a request
                // landing in between then leaves its wakeup behind instead
                // of being lost until the next request.
                let waiter = Arc::clone(&inner);
                let notified = waiter.notify.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                if let Some(token) = inner.take_pending() {
                    return Some((token, (inner, ct)));
                }
                if ct.is_cancelled() {
                    return None;
                }
                tokio::select! {
                    _ = notified => {}
                    _ = ct.cancelled() => return None,
                }
            }
        })
        .boxed()
    }
}

// ─── Sequential manager ──────────────────────────────────────

/// Sequential request manager: every request immediately mints the next
/// token through a compare-and-swap loop, so each request is distinctly
/// observable (deduplication traded for completeness).
pub struct SequentialRequestManager {
    source: SourceId,
    last_request: Arc<Mutex<Option<FeedRequest>>>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Token>>>,
}

impl SequentialRequestManager {
    /// Register on `context` for requests of `kind`.
    pub fn register(context: &Arc<SourceContext>, kind: RequestKind) -> Self {
        let source = SourceId::next();
        let root_context_id = context.root_context_id();
        let sequence = Arc::new(AtomicU32::new(0));
        let last_request = Arc::new(Mutex::new(None));
        let (tx, rx) = mpsc::unbounded_channel();

        let recorded = Arc::clone(&last_request);
        spawn_request_listener(
            context.requests(),
            context.cancellation_token(),
            kind,
            move |request| {
                *recorded.lock() = Some(request.clone());
                let mut observed = sequence.load(Ordering::Acquire);
                let minted = loop {
                    match sequence.compare_exchange_weak(
                        observed,
                        observed.wrapping_add(1),
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(seq) => break Token::with_sequence(source, root_context_id, seq),
                        Err(actual) => observed = actual,
                    }
                };
                request.tokens().push(minted);
                // Receiver dropped means the producer is gone; nothing to do.
                let _ = tx.send(minted);
            },
            || {},
        );

        Self {
            source,
            last_request,
            receiver: Mutex::new(Some(rx)),
        }
    }

    /// The producer identity tokens are minted under.
    pub fn source(&self) -> SourceId {
        self.source
    }

    /// Most recently observed request, for diagnostics only.
    pub fn last_request(&self) -> Option<FeedRequest> {
        self.last_request.lock().clone()
    }

    /// The token stream a producer consumes. Single-consumer: the first
    /// call takes the stream; later calls return an empty one. Completes
    /// when the owning context cancels.
    pub fn tokens(&self) -> BoxStream<'static, Token> {
        match self.receiver.lock().take() {
            Some(rx) => UnboundedReceiverStream::new(rx).boxed(),
            None => stream::empty().boxed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn context() -> Arc<SourceContext> {
        SourceContext::root(None)
    }

    async fn settle() {
        // Let the listener task drain the broadcast channel.
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn test_coercing_burst_yields_one_token() {
        let ctx = context();
        let manager = CoercingRequestManager::register(&ctx, RequestKind::Refresh);
        let mut tokens = manager.tokens();

        let requests: Vec<_> = (0..5).map(|_| FeedRequest::refresh()).collect();
        for request in &requests {
            ctx.send_request(request.clone());
        }
        settle().await;

        let first = tokens.next().await.expect("one token for the burst");
        // Every request in the burst observed the same token.
        for request in &requests {
            let set = request.tokens().token_set();
            assert_eq!(set.len(), 1);
            assert_eq!(set.tokens()[0], first);
        }

        // Nothing further until a new request arrives.
        let idle = tokio::time::timeout(Duration::from_millis(30), tokens.next()).await;
        assert!(idle.is_err());

        // After the enumeration step, the next request mints a successor.
        let follow_up = FeedRequest::refresh();
        ctx.send_request(follow_up.clone());
        let second = tokens.next().await.expect("a fresh token");
        assert_eq!(second, first.next());
        assert_eq!(follow_up.tokens().token_set().tokens()[0], second);
    }

    #[tokio::test]
    async fn test_coercing_lone_refresh_is_delivered() {
        let ctx = context();
        let manager = CoercingRequestManager::register(&ctx, RequestKind::Refresh);
        let mut tokens = manager.tokens();

        // Park the consumer on the stream before any request exists.
        let consumer = tokio::spawn(async move { tokens.next().await });
        settle().await;

        // A single refresh with no follow-up traffic must still wake it.
        ctx.send_request(FeedRequest::refresh());
        let token = tokio::time::timeout(Duration::from_millis(500), consumer)
            .await
            .expect("lone refresh must wake the consumer")
            .expect("consumer task")
            .expect("token");
        assert_eq!(token.source(), manager.source());
    }

    #[tokio::test]
    async fn test_coercing_requests_during_flight_coalesce_onto_successor() {
        let ctx = context();
        let manager = CoercingRequestManager::register(&ctx, RequestKind::Refresh);
        let mut tokens = manager.tokens();

        ctx.send_request(FeedRequest::refresh());
        let first = tokens.next().await.expect("first token");

        // Producer is "working on" `first`; these coalesce onto one successor.
        ctx.send_request(FeedRequest::refresh());
        ctx.send_request(FeedRequest::refresh());
        ctx.send_request(FeedRequest::refresh());

        let second = tokens.next().await.expect("one coalesced successor");
        assert_eq!(second, first.next());

        let idle = tokio::time::timeout(Duration::from_millis(30), tokens.next()).await;
        assert!(idle.is_err(), "burst must not mint more than one token");
    }

    #[tokio::test]
    async fn test_coercing_ignores_other_request_kinds() {
        let ctx = context();
        let manager = CoercingRequestManager::register(&ctx, RequestKind::Refresh);
        let mut tokens = manager.tokens();

        ctx.send_request(FeedRequest::page(Some(10)));
        settle().await;
        assert!(manager.last_request().is_none());

        let idle = tokio::time::timeout(Duration::from_millis(30), tokens.next()).await;
        assert!(idle.is_err());
    }

    #[tokio::test]
    async fn test_coercing_stream_completes_on_cancellation() {
        let ctx = context();
        let manager = CoercingRequestManager::register(&ctx, RequestKind::Refresh);
        let mut tokens = manager.tokens();

        ctx.dispose();
        let ended = tokio::time::timeout(Duration::from_millis(200), tokens.next())
            .await
            .expect("stream should complete promptly");
        assert!(ended.is_none());
    }

    #[tokio::test]
    async fn test_sequential_mints_one_token_per_request() {
        let ctx = context();
        let manager = SequentialRequestManager::register(&ctx, RequestKind::Page);
        let mut tokens = manager.tokens();

        let requests: Vec<_> = (0..4).map(|_| FeedRequest::page(None)).collect();
        for request in &requests {
            ctx.send_request(request.clone());
        }

        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(tokens.next().await.expect("token per request"));
        }

        // Strictly increasing sequence ids, one per request.
        for window in seen.windows(2) {
            assert!(window[0] < window[1]);
        }
        for (request, token) in requests.iter().zip(&seen) {
            assert_eq!(request.tokens().token_set().tokens(), &[*token]);
        }
        assert!(manager.last_request().is_some());
    }

    #[tokio::test]
    async fn test_sequential_stream_completes_on_cancellation() {
        let ctx = context();
        let manager = SequentialRequestManager::register(&ctx, RequestKind::Page);
        let mut tokens = manager.tokens();

        ctx.dispose();
        let ended = tokio::time::timeout(Duration::from_millis(200), tokens.next())
            .await
            .expect("stream should complete promptly");
        assert!(ended.is_none());
    }

    #[tokio::test]
    async fn test_sequential_tokens_is_single_consumer() {
        let ctx = context();
        let manager = SequentialRequestManager::register(&ctx, RequestKind::Page);
        let _first = manager.tokens();
        let mut second = manager.tokens();
        assert!(second.next().await.is_none());
    }
}

//! Rill Commands - Asynchronous Command Execution
//!
//! An [`AsyncCommand`] runs fallible async work keyed by an optional
//! parameter: distinct parameters run concurrently, a parameter already in
//! flight refuses re-execution, and every accepted execution produces
//! exactly one [`CommandEvent::Completed`] — errors and cancellation
//! surface there, never out of [`AsyncCommand::execute`] itself.

#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use rill_core::context::{CancellationToken, SourceContext};
use rill_core::errors::FeedError;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Uniform key for the optional command parameter, so the null parameter
/// shares the in-flight table with real ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParamKey<P> {
    /// Execution without a parameter.
    None,
    /// Execution keyed by a parameter value.
    Some(P),
}

impl<P> From<Option<P>> for ParamKey<P> {
    fn from(param: Option<P>) -> Self {
        match param {
            Some(value) => Self::Some(value),
            None => Self::None,
        }
    }
}

impl<P> ParamKey<P> {
    /// Borrow the parameter, if any.
    pub fn as_option(&self) -> Option<&P> {
        match self {
            Self::Some(value) => Some(value),
            Self::None => None,
        }
    }
}

/// Lifecycle events a command publishes.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandEvent<P> {
    /// An execution was accepted and spawned.
    Started {
        /// The execution's parameter key.
        param: ParamKey<P>,
    },
    /// An execution finished; emitted exactly once per accepted execution.
    Completed {
        /// The execution's parameter key.
        param: ParamKey<P>,
        /// The failure, when the work failed. Never `FeedError::Cancelled`.
        error: Option<Arc<FeedError>>,
        /// Whether cancellation ended the execution.
        cancelled: bool,
    },
}

type Action<P> =
    Arc<dyn Fn(Option<P>, CancellationToken) -> BoxFuture<'static, Result<(), FeedError>> + Send + Sync>;
type Predicate<P> = Arc<dyn Fn(Option<&P>) -> bool + Send + Sync>;
type ErrorHook = Arc<dyn Fn(&FeedError) + Send + Sync>;

struct CommandInner<P> {
    action: Action<P>,
    predicate: Mutex<Option<Predicate<P>>>,
    in_flight: Mutex<HashMap<ParamKey<P>, usize>>,
    events: broadcast::Sender<CommandEvent<P>>,
    error_hook: Mutex<ErrorHook>,
    ct: CancellationToken,
}

impl<P> CommandInner<P>
where
    P: Clone + Eq + Hash + Send + Sync + 'static,
{
    /// Complete exactly once, whichever way the race resolved.
    fn finish(
        &self,
        guard: &AtomicBool,
        param: &ParamKey<P>,
        error: Option<Arc<FeedError>>,
        cancelled: bool,
    ) {
        if guard.swap(true, Ordering::AcqRel) {
            return;
        }
        {
            let mut in_flight = self.in_flight.lock();
            if let Some(count) = in_flight.get_mut(param) {
                *count -= 1;
                if *count == 0 {
                    in_flight.remove(param);
                }
            }
        }
        if let Some(error) = &error {
            let hook = Arc::clone(&self.error_hook.lock());
            hook(error);
        }
        let _ = self.events.send(CommandEvent::Completed {
            param: param.clone(),
            error,
            cancelled,
        });
    }
}

/// Fallible async work with per-parameter concurrency control.
pub struct AsyncCommand<P> {
    inner: Arc<CommandInner<P>>,
}

impl<P> Clone for AsyncCommand<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P> std::fmt::Debug for AsyncCommand<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncCommand")
            .field("in_flight", &self.inner.in_flight.lock().len())
            .finish()
    }
}

impl<P> AsyncCommand<P>
where
    P: Clone + Eq + Hash + Send + Sync + 'static,
{
    /// A command scoped to `context`; its cancellation token covers every
    /// execution.
    pub fn new<F, Fut>(context: &Arc<SourceContext>, action: F) -> Self
    where
        F: Fn(Option<P>, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), FeedError>> + Send + 'static,
    {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(CommandInner {
                action: Arc::new(move |param, ct| action(param, ct).boxed()),
                predicate: Mutex::new(None),
                in_flight: Mutex::new(HashMap::new()),
                events,
                error_hook: Mutex::new(Arc::new(|error| {
                    tracing::error!(%error, "command execution failed");
                })),
                ct: context.cancellation_token(),
            }),
        }
    }

    /// Restrict executability beyond the in-flight check.
    pub fn with_can_execute(
        self,
        predicate: impl Fn(Option<&P>) -> bool + Send + Sync + 'static,
    ) -> Self {
        *self.inner.predicate.lock() = Some(Arc::new(predicate));
        self
    }

    /// Replace the last-chance error hook (default logs the error).
    pub fn with_error_hook(self, hook: impl Fn(&FeedError) + Send + Sync + 'static) -> Self {
        *self.inner.error_hook.lock() = Arc::new(hook);
        self
    }

    fn accepted_by_predicate(&self, param: Option<&P>) -> bool {
        match &*self.inner.predicate.lock() {
            Some(predicate) => predicate(param),
            None => true,
        }
    }

    /// Whether an execution with this parameter would be accepted now.
    pub fn can_execute(&self, param: Option<&P>) -> bool {
        if !self.accepted_by_predicate(param) {
            return false;
        }
        let key = match param {
            Some(value) => ParamKey::Some(value.clone()),
            None => ParamKey::None,
        };
        *self.inner.in_flight.lock().get(&key).unwrap_or(&0) == 0
    }

    /// Whether any execution is in flight.
    pub fn is_executing(&self) -> bool {
        !self.inner.in_flight.lock().is_empty()
    }

    /// Subscribe to this command's lifecycle events.
    pub fn events(&self) -> broadcast::Receiver<CommandEvent<P>> {
        self.inner.events.subscribe()
    }

    /// Start an execution; `false` means it was refused (already in
    /// flight for this parameter, or rejected by the predicate).
    ///
    /// Acceptance emits `Started` synchronously; the work runs on the
    /// runtime and ends in exactly one `Completed`, whether it succeeded,
    /// failed, or was cancelled mid-flight.
    pub fn execute(&self, param: Option<P>) -> bool {
        if !self.accepted_by_predicate(param.as_ref()) {
            return false;
        }
        let key = ParamKey::from(param.clone());
        {
            let mut in_flight = self.inner.in_flight.lock();
            let count = in_flight.entry(key.clone()).or_insert(0);
            if *count > 0 {
                return false;
            }
            *count += 1;
        }
        let _ = self.inner.events.send(CommandEvent::Started { param: key.clone() });

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let guard = AtomicBool::new(false);
            let work = (inner.action)(param, inner.ct.clone());
            tokio::select! {
                _ = inner.ct.cancelled() => inner.finish(&guard, &key, None, true),
                outcome = work => match outcome {
                    Ok(()) => inner.finish(&guard, &key, None, false),
                    Err(error) if error.is_cancellation() => {
                        inner.finish(&guard, &key, None, true);
                    }
                    Err(error) => inner.finish(&guard, &key, Some(Arc::new(error)), false),
                },
            }
        });
        true
    }
}

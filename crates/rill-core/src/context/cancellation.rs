//! Cooperative cancellation built on watch channels.
//!
//! Every [`SourceContext`](super::SourceContext) node owns a
//! `watch::Sender<bool>` shutdown channel; a [`CancellationToken`] holds the
//! chain of receivers from its node up to the root, so a parent's
//! cancellation reaches every descendant while a child's cancellation never
//! travels upward.

use tokio::sync::watch;

/// Cheap, clonable cancellation handle.
///
/// `cancelled().await` resolves when this node or any ancestor cancels;
/// `is_cancelled()` is the non-blocking equivalent. A token with no
/// receivers ([`CancellationToken::never`]) never resolves.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    receivers: Vec<watch::Receiver<bool>>,
}

impl CancellationToken {
    /// A token that never cancels.
    pub fn never() -> Self {
        Self {
            receivers: Vec::new(),
        }
    }

    pub(crate) fn from_receivers(receivers: Vec<watch::Receiver<bool>>) -> Self {
        Self { receivers }
    }

    pub(crate) fn receivers(&self) -> &[watch::Receiver<bool>] {
        &self.receivers
    }

    /// Non-blocking cancellation check.
    pub fn is_cancelled(&self) -> bool {
        self.receivers.iter().any(|rx| *rx.borrow())
    }

    /// Resolves once cancellation is requested anywhere in the chain.
    ///
    /// A dropped sender counts as cancellation: the owning context is gone.
    pub async fn cancelled(&self) {
        if self.receivers.is_empty() {
            futures::future::pending::<()>().await;
            return;
        }
        let waits = self
            .receivers
            .iter()
            .map(|rx| {
                let mut rx = rx.clone();
                Box::pin(async move {
                    loop {
                        if *rx.borrow() {
                            return;
                        }
                        if rx.changed().await.is_err() {
                            return;
                        }
                    }
                })
            })
            .collect::<Vec<_>>();
        futures::future::select_all(waits).await;
    }
}

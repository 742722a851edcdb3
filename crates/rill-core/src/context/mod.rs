//! # Source contexts
//!
//! A [`SourceContext`] scopes one subscription tree. Each node owns a
//! cancellation scope (children cancel when the parent cancels, never the
//! reverse), a request channel (requests sent by a leaf propagate upward to
//! whichever ancestor owns the producer able to satisfy them), the
//! `root_context_id` shared by the whole tree so tokens minted anywhere in
//! it stay comparable, and an optional [`Dispatcher`] inherited by children.
//!
//! Ownership is arena-style: a parent owns its children strongly; children
//! keep only a `Weak` back-reference to the parent and an [`OwnerKey`] to
//! the subscriber that created them, for diagnostics.

mod cancellation;

pub use cancellation::CancellationToken;

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};

use crate::dispatcher::Dispatcher;
use crate::request::FeedRequest;

const REQUEST_CHANNEL_CAPACITY: usize = 64;

/// Identity of the object that owns a context node.
///
/// Keyed by pointer identity so `get_or_create_child` stays idempotent per
/// owner instance; the type name is carried for diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerKey {
    ptr: usize,
    type_name: &'static str,
}

impl OwnerKey {
    /// Key for a shared owner instance.
    pub fn of<O: Send + Sync + 'static>(owner: &Arc<O>) -> Self {
        Self {
            ptr: Arc::as_ptr(owner) as usize,
            type_name: std::any::type_name::<O>(),
        }
    }

    /// The owner's type name, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

/// One node of a subscription-scope tree.
pub struct SourceContext {
    root_context_id: u32,
    owner: Option<OwnerKey>,
    cancel_tx: watch::Sender<bool>,
    token: CancellationToken,
    requests_tx: broadcast::Sender<FeedRequest>,
    parent: Option<Weak<SourceContext>>,
    children: Mutex<HashMap<OwnerKey, Arc<SourceContext>>>,
    dispatcher: Option<Arc<dyn Dispatcher>>,
    disposed: AtomicBool,
}

impl fmt::Debug for SourceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceContext")
            .field("root_context_id", &self.root_context_id)
            .field("owner", &self.owner)
            .field("disposed", &self.disposed.load(Ordering::Relaxed))
            .finish()
    }
}

impl SourceContext {
    /// Create the root of a new context tree.
    ///
    /// The dispatcher, when given, is inherited by every descendant; there
    /// is no process-global fallback.
    pub fn root(dispatcher: Option<Arc<dyn Dispatcher>>) -> Arc<Self> {
        static NEXT_ROOT: AtomicU32 = AtomicU32::new(1);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (requests_tx, _) = broadcast::channel(REQUEST_CHANNEL_CAPACITY);
        Arc::new(Self {
            root_context_id: NEXT_ROOT.fetch_add(1, Ordering::Relaxed),
            owner: None,
            cancel_tx,
            token: CancellationToken::from_receivers(vec![cancel_rx]),
            requests_tx,
            parent: None,
            children: Mutex::new(HashMap::new()),
            dispatcher,
            disposed: AtomicBool::new(false),
        })
    }

    /// Get the live child scoped to `owner`, creating it on first use.
    ///
    /// Idempotent per owner identity: repeated calls return the same child
    /// until that child is disposed. Children derive a linked cancellation
    /// scope, share the tree's `root_context_id`, and inherit the parent's
    /// dispatcher. A child created under a disposed parent starts already
    /// cancelled rather than panicking.
    pub fn get_or_create_child(self: &Arc<Self>, owner: OwnerKey) -> Arc<SourceContext> {
        let mut children = self.children.lock();
        if let Some(existing) = children.get(&owner) {
            if !existing.is_disposed() {
                return Arc::clone(existing);
            }
        }

        let (cancel_tx, cancel_rx) = watch::channel(self.is_disposed());
        let mut receivers = self.token.receivers().to_vec();
        receivers.push(cancel_rx);
        let (requests_tx, _) = broadcast::channel(REQUEST_CHANNEL_CAPACITY);
        let child = Arc::new(SourceContext {
            root_context_id: self.root_context_id,
            owner: Some(owner),
            cancel_tx,
            token: CancellationToken::from_receivers(receivers),
            requests_tx,
            parent: Some(Arc::downgrade(self)),
            children: Mutex::new(HashMap::new()),
            dispatcher: self.dispatcher.clone(),
            disposed: AtomicBool::new(false),
        });
        children.insert(owner, Arc::clone(&child));
        child
    }

    /// Identifier shared by every node of this tree.
    pub fn root_context_id(&self) -> u32 {
        self.root_context_id
    }

    /// The owner this node is scoped to (`None` for the root).
    pub fn owner(&self) -> Option<OwnerKey> {
        self.owner
    }

    /// Dispatcher threaded through this tree, if any.
    pub fn dispatcher(&self) -> Option<Arc<dyn Dispatcher>> {
        self.dispatcher.clone()
    }

    /// Cancellation token covering this node and all its ancestors.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Whether this node has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Subscribe to the requests arriving at this node.
    ///
    /// A node observes requests sent on itself or on any descendant, not
    /// those sent on ancestors or siblings.
    pub fn requests(&self) -> broadcast::Receiver<FeedRequest> {
        self.requests_tx.subscribe()
    }

    /// Route a request from this node upward.
    ///
    /// The request is published on this node and on every live ancestor, so
    /// it reaches whichever scope registered the producer able to satisfy
    /// it. Sending on a disposed node is a logged no-op.
    pub fn send_request(&self, request: FeedRequest) {
        if self.is_disposed() {
            tracing::debug!(context = ?self, "request dropped: context disposed");
            return;
        }
        let _ = self.requests_tx.send(request.clone());
        let mut parent = self.parent.as_ref().and_then(Weak::upgrade);
        while let Some(ancestor) = parent {
            if !ancestor.is_disposed() {
                let _ = ancestor.requests_tx.send(request.clone());
            }
            parent = ancestor.parent.as_ref().and_then(Weak::upgrade);
        }
    }

    /// Tear the node down: cancel its token, stop accepting requests, and
    /// recursively dispose every live child. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.cancel_tx.send(true);
        let children: Vec<_> = self.children.lock().drain().map(|(_, c)| c).collect();
        for child in children {
            child.dispose();
        }
        tracing::trace!(
            root = self.root_context_id,
            owner = self.owner.map(|o| o.type_name()),
            "source context disposed"
        );
    }
}

impl Drop for SourceContext {
    fn drop(&mut self) {
        // Backstop for trees torn down by dropping the root Arc.
        if !self.disposed.swap(true, Ordering::AcqRel) {
            let _ = self.cancel_tx.send(true);
            let children: Vec<_> = self.children.lock().drain().map(|(_, c)| c).collect();
            for child in children {
                child.dispose();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RequestKind;

    #[tokio::test]
    async fn test_get_or_create_child_is_idempotent_per_owner() {
        let root = SourceContext::root(None);
        let owner_a = Arc::new("a".to_string());
        let owner_b = Arc::new("b".to_string());

        let child1 = root.get_or_create_child(OwnerKey::of(&owner_a));
        let child2 = root.get_or_create_child(OwnerKey::of(&owner_a));
        let child3 = root.get_or_create_child(OwnerKey::of(&owner_b));

        assert!(Arc::ptr_eq(&child1, &child2));
        assert!(!Arc::ptr_eq(&child1, &child3));
        assert_eq!(child1.root_context_id(), root.root_context_id());
    }

    #[tokio::test]
    async fn test_disposed_child_is_recreated() {
        let root = SourceContext::root(None);
        let owner = Arc::new(1u8);

        let child = root.get_or_create_child(OwnerKey::of(&owner));
        child.dispose();
        let replacement = root.get_or_create_child(OwnerKey::of(&owner));

        assert!(!Arc::ptr_eq(&child, &replacement));
        assert!(!replacement.is_disposed());
    }

    #[tokio::test]
    async fn test_parent_cancellation_reaches_grandchildren() {
        let root = SourceContext::root(None);
        let owner = Arc::new(1u8);
        let nested = Arc::new(2u8);
        let child = root.get_or_create_child(OwnerKey::of(&owner));
        let grandchild = child.get_or_create_child(OwnerKey::of(&nested));

        let token = grandchild.cancellation_token();
        assert!(!token.is_cancelled());

        root.dispose();
        token.cancelled().await;
        assert!(grandchild.is_disposed());
        assert!(child.is_disposed());
    }

    #[tokio::test]
    async fn test_child_cancellation_never_cancels_parent() {
        let root = SourceContext::root(None);
        let owner = Arc::new(1u8);
        let child = root.get_or_create_child(OwnerKey::of(&owner));

        child.dispose();
        assert!(child.cancellation_token().is_cancelled());
        assert!(!root.cancellation_token().is_cancelled());
        assert!(!root.is_disposed());
    }

    #[tokio::test]
    async fn test_leaf_request_propagates_to_ancestors() {
        let root = SourceContext::root(None);
        let owner = Arc::new(1u8);
        let nested = Arc::new(2u8);
        let child = root.get_or_create_child(OwnerKey::of(&owner));
        let leaf = child.get_or_create_child(OwnerKey::of(&nested));

        let mut at_root = root.requests();
        let mut at_child = child.requests();

        leaf.send_request(FeedRequest::refresh());

        let seen = at_root.recv().await.expect("request should reach the root");
        assert_eq!(seen.kind(), RequestKind::Refresh);
        let seen = at_child.recv().await.expect("request should reach the parent");
        assert_eq!(seen.kind(), RequestKind::Refresh);
    }

    #[tokio::test]
    async fn test_requests_do_not_travel_downward() {
        let root = SourceContext::root(None);
        let owner = Arc::new(1u8);
        let child = root.get_or_create_child(OwnerKey::of(&owner));

        let mut at_child = child.requests();
        root.send_request(FeedRequest::refresh());

        // Nothing arrives at the child; the channel stays empty.
        assert!(matches!(
            at_child.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_send_on_disposed_context_is_a_noop() {
        let root = SourceContext::root(None);
        let mut rx = root.requests();
        root.dispose();
        root.send_request(FeedRequest::refresh());
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_child_under_disposed_parent_starts_cancelled() {
        let root = SourceContext::root(None);
        root.dispose();
        let owner = Arc::new(1u8);
        let child = root.get_or_create_child(OwnerKey::of(&owner));
        assert!(child.cancellation_token().is_cancelled());
    }
}

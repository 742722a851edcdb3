//! Observable vectors.
//!
//! An [`ObservableVec`] owns an ordered collection and notifies registered
//! listeners with each [`CollectionChange`] applied to it. Listeners are
//! removed when their [`ListenerGuard`] drops. Bindings drain a
//! [`CollectionUpdater`] into the vector with [`dequeue_changes`], which
//! can apply silently when the binding wants the data without downstream
//! notifications.
//!
//! [`dequeue_changes`]: ObservableVec::dequeue_changes

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::change::{try_apply_change, CollectionChange};
use crate::updater::CollectionUpdater;

type ListenerFn<T> = Box<dyn Fn(&CollectionChange<T>) + Send + Sync>;

struct Listener<T> {
    id: u64,
    callback: ListenerFn<T>,
}

/// An ordered collection that reports its changes to listeners.
pub struct ObservableVec<T> {
    items: RwLock<Vec<T>>,
    listeners: Arc<Mutex<Vec<Listener<T>>>>,
    next_listener_id: AtomicU64,
}

impl<T> Default for ObservableVec<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<T> ObservableVec<T> {
    /// Wrap an initial collection.
    pub fn new(initial: Vec<T>) -> Self {
        Self {
            items: RwLock::new(initial),
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_listener_id: AtomicU64::new(0),
        }
    }

    /// Current length.
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Whether the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    /// Register a listener, dropped together with the returned guard.
    pub fn subscribe(
        &self,
        listener: impl Fn(&CollectionChange<T>) + Send + Sync + 'static,
    ) -> ListenerGuard<T> {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push(Listener {
            id,
            callback: Box::new(listener),
        });
        ListenerGuard {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }
}

impl<T: Clone> ObservableVec<T> {
    /// Current contents.
    pub fn snapshot(&self) -> Vec<T> {
        self.items.read().clone()
    }

    /// Apply one change, notifying listeners when `notify` is set.
    ///
    /// A change whose indices do not fit the current contents is dropped
    /// with a warning rather than corrupting the collection.
    pub fn apply(&self, change: &CollectionChange<T>, notify: bool) {
        {
            let mut items = self.items.write();
            if let Err(error) = try_apply_change(&mut items, change) {
                tracing::warn!(%error, "dropping inapplicable collection change");
                return;
            }
        }
        if notify {
            for listener in self.listeners.lock().iter() {
                (listener.callback)(change);
            }
        }
    }

    /// Drain an updater into this collection.
    ///
    /// Every queued change mutates the contents; listeners are notified
    /// only when `silently` is unset.
    pub fn dequeue_changes(&self, updater: &mut CollectionUpdater<T>, silently: bool) {
        updater.dequeue(|change, silent| self.apply(change, !silent), silently);
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for ObservableVec<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservableVec")
            .field("items", &*self.items.read())
            .field("listeners", &self.listeners.lock().len())
            .finish()
    }
}

/// Keeps one listener registered; dropping it unregisters.
pub struct ListenerGuard<T> {
    id: u64,
    listeners: Weak<Mutex<Vec<Listener<T>>>>,
}

impl<T> Drop for ListenerGuard<T> {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.lock().retain(|listener| listener.id != self.id);
        }
    }
}

impl<T> std::fmt::Debug for ListenerGuard<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerGuard").field("id", &self.id).finish()
    }
}

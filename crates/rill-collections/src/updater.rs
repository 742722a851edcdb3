//! Batched collection updates.
//!
//! A [`CollectionUpdater`] queues groups of [`CollectionChange`]s together
//! with callbacks that must run before and after each group is applied.
//! Producers build an updater while diffing, consumers drain it exactly once
//! against their concrete collection. Nested updaters (from grouped or
//! derived collections) merge into the outer one so the combined queue still
//! applies in a single pass.

use std::collections::VecDeque;

use crate::change::CollectionChange;

/// A callback fired around one group of changes.
pub type Callback = Box<dyn FnOnce() + Send>;

/// Before/after hooks for one group of changes.
///
/// Merging follows scope nesting: an inner group's `before` hooks run after
/// the outer ones (the outer scope opens first), while its `after` hooks run
/// before the outer ones (the inner scope closes first).
#[derive(Default)]
pub struct UpdateCallbacks {
    before: Vec<Callback>,
    after: Vec<Callback>,
}

impl UpdateCallbacks {
    /// An empty callback set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook to run before the group's changes apply.
    pub fn run_before(&mut self, callback: impl FnOnce() + Send + 'static) {
        self.before.push(Box::new(callback));
    }

    /// Register a hook to run after the group's changes apply.
    pub fn run_after(&mut self, callback: impl FnOnce() + Send + 'static) {
        self.after.push(Box::new(callback));
    }

    /// Fold a nested group's callbacks into this one.
    pub fn merge(&mut self, nested: UpdateCallbacks) {
        self.before.extend(nested.before);
        let mut after = nested.after;
        after.append(&mut self.after);
        self.after = after;
    }

    fn fire_before(&mut self) {
        for callback in self.before.drain(..) {
            callback();
        }
    }

    fn fire_after(&mut self) {
        for callback in self.after.drain(..) {
            callback();
        }
    }
}

impl std::fmt::Debug for UpdateCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateCallbacks")
            .field("before", &self.before.len())
            .field("after", &self.after.len())
            .finish()
    }
}

/// One queued group: its changes plus the hooks bracketing them.
struct UpdateNode<T> {
    changes: Vec<CollectionChange<T>>,
    callbacks: UpdateCallbacks,
}

/// An ordered queue of change groups awaiting application.
pub struct CollectionUpdater<T> {
    queue: VecDeque<UpdateNode<T>>,
}

impl<T> Default for CollectionUpdater<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CollectionUpdater<T> {
    /// An empty updater.
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }

    /// Queue a group of changes with no callbacks.
    pub fn push(&mut self, changes: Vec<CollectionChange<T>>) {
        self.push_with(changes, UpdateCallbacks::new());
    }

    /// Queue a group of changes bracketed by callbacks.
    pub fn push_with(&mut self, changes: Vec<CollectionChange<T>>, callbacks: UpdateCallbacks) {
        self.queue.push_back(UpdateNode { changes, callbacks });
    }

    /// Append a nested updater's queue after this one's.
    pub fn merge(&mut self, mut nested: CollectionUpdater<T>) {
        self.queue.append(&mut nested.queue);
    }

    /// Whether any changes are queued.
    pub fn is_empty(&self) -> bool {
        self.queue.iter().all(|node| node.changes.is_empty())
    }

    /// Total queued changes across all groups.
    pub fn change_count(&self) -> usize {
        self.queue.iter().map(|node| node.changes.len()).sum()
    }

    /// Drain the queue, invoking `handler` for every change in order.
    ///
    /// For each group the `before` hooks fire, then the handler sees each
    /// change (with the `silently` flag passed through), then the `after`
    /// hooks fire. The handler must apply every change regardless of the
    /// flag; `silently` only governs whether downstream listeners hear
    /// about it.
    pub fn dequeue(
        &mut self,
        mut handler: impl FnMut(&CollectionChange<T>, bool),
        silently: bool,
    ) {
        while let Some(mut node) = self.queue.pop_front() {
            node.callbacks.fire_before();
            for change in &node.changes {
                handler(change, silently);
            }
            node.callbacks.fire_after();
        }
    }
}

impl<T> std::fmt::Debug for CollectionUpdater<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionUpdater")
            .field("groups", &self.queue.len())
            .field("changes", &self.change_count())
            .finish()
    }
}

//! # Entity bridge
//!
//! Translates an external pub/sub stream of entity events into
//! [`ListState`] updates: one event, one published message, in the
//! stream's own order.

use futures::{Stream, StreamExt};

use rill_core::context::CancellationToken;

use crate::list_state::ListState;

/// What happened to an entity on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityChange {
    /// The entity came into existence.
    Created,
    /// The entity's content changed.
    Updated,
    /// The entity was removed.
    Deleted,
}

/// One entity event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMessage<T> {
    /// What happened.
    pub change: EntityChange,
    /// The entity it happened to. For deletions, any value carrying the
    /// entity's key suffices.
    pub entity: T,
}

impl<T> EntityMessage<T> {
    /// A creation event.
    pub fn created(entity: T) -> Self {
        Self {
            change: EntityChange::Created,
            entity,
        }
    }

    /// An update event.
    pub fn updated(entity: T) -> Self {
        Self {
            change: EntityChange::Updated,
            entity,
        }
    }

    /// A deletion event.
    pub fn deleted(entity: T) -> Self {
        Self {
            change: EntityChange::Deleted,
            entity,
        }
    }
}

/// Forward entity events into `list` until the stream ends or `ct` cancels.
///
/// Failed updates are logged and the watch continues; cancellation ends it
/// silently. The caller decides where this future runs.
pub async fn watch_entities<T, K, S, F>(
    list: ListState<T>,
    mut events: S,
    key: F,
    ct: CancellationToken,
) where
    T: Clone + PartialEq + Send + Sync + 'static,
    K: PartialEq,
    S: Stream<Item = EntityMessage<T>> + Unpin + Send,
    F: Fn(&T) -> K + Send + Sync,
{
    loop {
        let event = tokio::select! {
            _ = ct.cancelled() => break,
            event = events.next() => match event {
                Some(event) => event,
                None => break,
            },
        };
        match list.update_by_key(&key, event, &ct).await {
            Ok(()) => {}
            Err(error) if error.is_cancellation() => break,
            Err(error) => tracing::error!(%error, "entity update failed"),
        }
    }
}

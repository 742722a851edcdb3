//! # ListState
//!
//! A [`ListState`] is a [`State`] over an immutable ordered collection kept
//! on the data axis. Every mutation is exactly one
//! [`State::update_message`]: one guard acquisition, one published message.
//! An emptied list stays `Data::Some(vec![])` — `Data::None` is reserved
//! for explicit absence, never inferred from emptiness.

use rill_core::context::CancellationToken;
use rill_core::errors::FeedError;
use rill_core::message::Data;

use crate::entity::{EntityChange, EntityMessage};
use crate::state::State;

/// Shared mutable list with message-per-mutation publishing.
pub struct ListState<T> {
    state: State<Vec<T>>,
}

impl<T> Clone for ListState<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T> std::fmt::Debug for ListState<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListState").finish()
    }
}

impl<T> ListState<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// A list holding the given items.
    pub fn new(items: Vec<T>) -> Self {
        Self {
            state: State::new(items),
        }
    }

    /// A list with an explicit data-axis payload.
    pub fn from_data(data: Data<Vec<T>>) -> Self {
        Self {
            state: State::from_data(data),
        }
    }

    /// The underlying state, for subscriptions and raw message updates.
    pub fn state(&self) -> &State<Vec<T>> {
        &self.state
    }

    /// Current items; empty when the data axis holds no list.
    pub fn items(&self) -> Vec<T> {
        self.state
            .current()
            .current()
            .data()
            .value()
            .cloned()
            .unwrap_or_default()
    }

    /// Append one item.
    pub async fn add(&self, item: T, ct: &CancellationToken) -> Result<(), FeedError> {
        self.state
            .update_message(
                move |builder| {
                    builder
                        .map_data(move |data| {
                            let mut items = data.into_value().unwrap_or_default();
                            items.push(item);
                            Data::Some(items)
                        })
                        .clear_error()
                },
                ct,
            )
            .await
    }

    /// Remove every item matching the predicate. An emptied list stays
    /// `Data::Some(vec![])`.
    pub async fn remove_all(
        &self,
        predicate: impl Fn(&T) -> bool + Send,
        ct: &CancellationToken,
    ) -> Result<(), FeedError> {
        self.state
            .update_message(
                move |builder| {
                    builder
                        .map_data(move |data| match data {
                            Data::Some(mut items) => {
                                items.retain(|item| !predicate(item));
                                Data::Some(items)
                            }
                            other => other,
                        })
                        .clear_error()
                },
                ct,
            )
            .await
    }

    /// Transform every item matching the predicate.
    pub async fn update_all(
        &self,
        predicate: impl Fn(&T) -> bool + Send,
        transform: impl Fn(&T) -> T + Send,
        ct: &CancellationToken,
    ) -> Result<(), FeedError> {
        self.state
            .update_message(
                move |builder| {
                    builder
                        .map_data(move |data| match data {
                            Data::Some(mut items) => {
                                for item in items.iter_mut() {
                                    if predicate(item) {
                                        *item = transform(item);
                                    }
                                }
                                Data::Some(items)
                            }
                            other => other,
                        })
                        .clear_error()
                },
                ct,
            )
            .await
    }

    /// Apply one entity event under a key extractor.
    ///
    /// Created appends (a key already present is ignored), Updated replaces
    /// in place (a missing key is ignored, never appended), Deleted removes
    /// by key. Ignored events still publish their (changeless) message.
    pub async fn update_by_key<K: PartialEq>(
        &self,
        key: impl Fn(&T) -> K + Send,
        message: EntityMessage<T>,
        ct: &CancellationToken,
    ) -> Result<(), FeedError> {
        self.state
            .update_message(
                move |builder| {
                    builder
                        .map_data(move |data| apply_entity(data, &key, message))
                        .clear_error()
                },
                ct,
            )
            .await
    }
}

fn apply_entity<T, K: PartialEq>(
    data: Data<Vec<T>>,
    key: &impl Fn(&T) -> K,
    message: EntityMessage<T>,
) -> Data<Vec<T>> {
    let entity_key = key(&message.entity);
    match message.change {
        EntityChange::Created => {
            let mut items = data.into_value().unwrap_or_default();
            if items.iter().any(|item| key(item) == entity_key) {
                tracing::debug!("created entity already present; ignoring");
            } else {
                items.push(message.entity);
            }
            Data::Some(items)
        }
        EntityChange::Updated => match data {
            Data::Some(mut items) => {
                match items.iter().position(|item| key(item) == entity_key) {
                    Some(at) => items[at] = message.entity,
                    None => tracing::debug!("updated entity not present; ignoring"),
                }
                Data::Some(items)
            }
            other => {
                tracing::debug!("entity update against an unloaded list; ignoring");
                other
            }
        },
        EntityChange::Deleted => match data {
            Data::Some(mut items) => {
                match items.iter().position(|item| key(item) == entity_key) {
                    Some(at) => {
                        items.remove(at);
                    }
                    None => tracing::debug!("deleted entity not present; ignoring"),
                }
                Data::Some(items)
            }
            other => {
                tracing::debug!("entity delete against an unloaded list; ignoring");
                other
            }
        },
    }
}

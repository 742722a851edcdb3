//! Rill Feeds - Reactive Producers
//!
//! The subscription layer of the Rill engine: the [`Feed`] trait and its
//! async-loader implementation [`AsyncFeed`], the shared mutable
//! [`State`] and collection-holding [`ListState`] with replay-then-live
//! subscriptions, the entity pub/sub bridge, and the binding adapter that
//! keeps an observable collection synchronized with a list through
//! granular diffs.

#![forbid(unsafe_code)]

/// ListState-to-ObservableVec binding adapter.
pub mod binding;

/// External entity events applied to lists.
pub mod entity;

/// The Feed trait and the async-loader feed.
pub mod feed;

/// States over ordered collections.
pub mod list_state;

/// Shared mutable message holders.
pub mod state;

pub use binding::bind_list_state;
pub use entity::{watch_entities, EntityChange, EntityMessage};
pub use feed::{AsyncFeed, Feed, MessageStream};
pub use list_state::ListState;
pub use state::State;

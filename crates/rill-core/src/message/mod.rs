//! # Message model
//!
//! A [`Message`] is an immutable snapshot of several independent "axes":
//! the data value, the current load error, a refresh-in-progress flag,
//! pagination and selection metadata, and any caller-defined custom axes.
//! Each message also carries the exact set of axes whose value differs from
//! the previous snapshot, so subscribers react only to what changed.
//!
//! Messages are built, never mutated: [`Message::with`] starts a
//! [`MessageBuilder`] from the current snapshot, setters touch individual
//! axes, and `build()` freezes the result and computes the changed set.

mod axis;
mod builder;

pub use axis::{custom_value, custom_value_as, AxisSet, AxisValue, CustomAxis, MessageAxis};
pub use builder::MessageBuilder;

use std::ops::Range;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::errors::FeedError;

/// The data axis payload.
///
/// Distinguishes "no value yet" ([`Data::Undefined`], the state before the
/// first load) from "explicitly absent" ([`Data::None`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Data<T> {
    /// No value has been produced yet.
    Undefined,
    /// A value was produced and it is explicitly absent.
    None,
    /// A value.
    Some(T),
}

impl<T> Data<T> {
    /// Whether no value has been produced yet.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Whether the value is explicitly absent.
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Whether a value is present.
    pub fn is_some(&self) -> bool {
        matches!(self, Self::Some(_))
    }

    /// Borrow the value, if present.
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Some(value) => Some(value),
            _ => None,
        }
    }

    /// Consume into the value, if present.
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Some(value) => Some(value),
            _ => None,
        }
    }

    /// Map the contained value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Data<U> {
        match self {
            Self::Undefined => Data::Undefined,
            Self::None => Data::None,
            Self::Some(value) => Data::Some(f(value)),
        }
    }
}

impl<T> From<Option<T>> for Data<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Self::Some(v),
            None => Self::None,
        }
    }
}

/// Pagination metadata carried on the Pagination axis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationInfo {
    /// Whether a load-more operation is in flight.
    pub is_loading_more: bool,
    /// Whether the producer reports more items beyond the loaded ones.
    pub has_more_items: bool,
    /// Number of items loaded so far.
    pub loaded_count: u32,
}

/// Selection metadata carried on the Selection axis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionInfo {
    ranges: Vec<Range<usize>>,
}

impl SelectionInfo {
    /// No selection.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Select a single index.
    pub fn single(index: usize) -> Self {
        Self {
            ranges: vec![index..index + 1],
        }
    }

    /// Select a contiguous range.
    pub fn range(range: Range<usize>) -> Self {
        Self {
            ranges: vec![range],
        }
    }

    /// The selected ranges, in insertion order.
    pub fn ranges(&self) -> &[Range<usize>] {
        &self.ranges
    }

    /// Whether nothing is selected.
    pub fn is_empty(&self) -> bool {
        self.ranges.iter().all(|r| r.is_empty())
    }

    /// Whether the index falls inside the selection.
    pub fn contains(&self, index: usize) -> bool {
        self.ranges.iter().any(|r| r.contains(&index))
    }
}

/// One immutable snapshot of every axis.
#[derive(Debug)]
pub struct MessageEntry<T> {
    pub(crate) data: Data<T>,
    pub(crate) error: Option<Arc<FeedError>>,
    pub(crate) progress: bool,
    pub(crate) pagination: Option<PaginationInfo>,
    pub(crate) selection: Option<SelectionInfo>,
    pub(crate) custom: IndexMap<CustomAxis, Arc<dyn AxisValue>>,
}

impl<T> Default for MessageEntry<T> {
    fn default() -> Self {
        Self {
            data: Data::Undefined,
            error: None,
            progress: false,
            pagination: None,
            selection: None,
            custom: IndexMap::new(),
        }
    }
}

impl<T: Clone> Clone for MessageEntry<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            error: self.error.clone(),
            progress: self.progress,
            pagination: self.pagination.clone(),
            selection: self.selection.clone(),
            custom: self.custom.clone(),
        }
    }
}

impl<T> MessageEntry<T> {
    /// The data axis.
    pub fn data(&self) -> &Data<T> {
        &self.data
    }

    /// The error axis.
    pub fn error(&self) -> Option<&Arc<FeedError>> {
        self.error.as_ref()
    }

    /// The progress axis (`true` while refreshing).
    pub fn progress(&self) -> bool {
        self.progress
    }

    /// The pagination axis.
    pub fn pagination(&self) -> Option<&PaginationInfo> {
        self.pagination.as_ref()
    }

    /// The selection axis.
    pub fn selection(&self) -> Option<&SelectionInfo> {
        self.selection.as_ref()
    }

    /// A custom axis value, if set.
    pub fn custom(&self, axis: CustomAxis) -> Option<&Arc<dyn AxisValue>> {
        self.custom.get(&axis)
    }
}

/// Immutable message: previous snapshot, current snapshot, and the exact set
/// of axes that differ between them.
///
/// Owned by the feed or state that emitted it; shared read-only with every
/// subscriber. The initial message has an empty predecessor, so the first
/// built message reports every set axis as changed.
#[derive(Debug)]
pub struct Message<T> {
    previous: Arc<MessageEntry<T>>,
    current: Arc<MessageEntry<T>>,
    changes: AxisSet,
}

impl<T> Clone for Message<T> {
    fn clone(&self) -> Self {
        Self {
            previous: Arc::clone(&self.previous),
            current: Arc::clone(&self.current),
            changes: self.changes.clone(),
        }
    }
}

impl<T> Default for Message<T> {
    fn default() -> Self {
        Self::initial()
    }
}

impl<T> Message<T> {
    /// The state before anything happened: all axes unset, nothing changed.
    pub fn initial() -> Self {
        let empty = Arc::new(MessageEntry::default());
        Self {
            previous: Arc::clone(&empty),
            current: empty,
            changes: AxisSet::new(),
        }
    }

    pub(crate) fn from_parts(
        previous: Arc<MessageEntry<T>>,
        current: Arc<MessageEntry<T>>,
        changes: AxisSet,
    ) -> Self {
        Self {
            previous,
            current,
            changes,
        }
    }

    /// Snapshot preceding this message.
    pub fn previous(&self) -> &MessageEntry<T> {
        &self.previous
    }

    /// Current snapshot.
    pub fn current(&self) -> &MessageEntry<T> {
        &self.current
    }

    pub(crate) fn current_arc(&self) -> Arc<MessageEntry<T>> {
        Arc::clone(&self.current)
    }

    /// Exactly the axes whose value differs from the previous snapshot.
    pub fn changes(&self) -> &AxisSet {
        &self.changes
    }

    /// Shorthand: whether the given axis changed in this message.
    pub fn changed(&self, axis: MessageAxis) -> bool {
        self.changes.contains(axis)
    }
}

impl<T: Clone> Message<T> {
    /// Start building the next message from this one.
    pub fn with(&self) -> MessageBuilder<T> {
        MessageBuilder::new(self)
    }
}

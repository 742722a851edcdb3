//! Message axes and the changed-axis set.
//!
//! Axes are identified by a closed enumeration plus a typed extension point
//! for custom axes. There is no string-keyed dispatch on the hot path: the
//! closed axes are compared through their static types, and custom axis
//! values carry their own equality through [`AxisValue`].

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A caller-defined axis, identified by a stable static key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CustomAxis {
    key: &'static str,
}

impl CustomAxis {
    /// Declare a custom axis. The key must be stable for the program's life.
    pub const fn new(key: &'static str) -> Self {
        Self { key }
    }

    /// The axis key.
    pub fn key(&self) -> &'static str {
        self.key
    }
}

/// Identity of one independent axis of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageAxis {
    /// The data value itself.
    Data,
    /// Load error, or absent.
    Error,
    /// Whether a refresh is in progress.
    Progress,
    /// Pagination metadata.
    Pagination,
    /// Selection metadata.
    Selection,
    /// A caller-defined axis.
    Custom(CustomAxis),
}

/// Typed value stored on a custom axis.
///
/// Equality is supplied by the registering type; two values of different
/// concrete types never compare equal.
pub trait AxisValue: Any + Send + Sync + fmt::Debug {
    /// Upcast for typed retrieval.
    fn as_any(&self) -> &dyn Any;

    /// Value equality against another axis value.
    fn eq_value(&self, other: &dyn AxisValue) -> bool;
}

#[derive(Debug)]
struct CustomValue<V>(V);

impl<V> AxisValue for CustomValue<V>
where
    V: PartialEq + Send + Sync + fmt::Debug + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_value(&self, other: &dyn AxisValue) -> bool {
        other
            .as_any()
            .downcast_ref::<CustomValue<V>>()
            .is_some_and(|o| o.0 == self.0)
    }
}

/// Wrap a value for storage on a custom axis.
pub fn custom_value<V>(value: V) -> Arc<dyn AxisValue>
where
    V: PartialEq + Send + Sync + fmt::Debug + 'static,
{
    Arc::new(CustomValue(value))
}

/// Retrieve a typed reference from a custom axis value.
pub fn custom_value_as<V: 'static>(value: &Arc<dyn AxisValue>) -> Option<&V> {
    value
        .as_any()
        .downcast_ref::<CustomValue<V>>()
        .map(|c| &c.0)
}

const DATA_BIT: u8 = 1;
const ERROR_BIT: u8 = 1 << 1;
const PROGRESS_BIT: u8 = 1 << 2;
const PAGINATION_BIT: u8 = 1 << 3;
const SELECTION_BIT: u8 = 1 << 4;

/// Set of axes, used for a message's changed-axis report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AxisSet {
    bits: u8,
    custom: Vec<CustomAxis>,
}

impl AxisSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    fn bit(axis: MessageAxis) -> Option<u8> {
        match axis {
            MessageAxis::Data => Some(DATA_BIT),
            MessageAxis::Error => Some(ERROR_BIT),
            MessageAxis::Progress => Some(PROGRESS_BIT),
            MessageAxis::Pagination => Some(PAGINATION_BIT),
            MessageAxis::Selection => Some(SELECTION_BIT),
            MessageAxis::Custom(_) => None,
        }
    }

    /// Add an axis to the set.
    pub fn insert(&mut self, axis: MessageAxis) {
        match Self::bit(axis) {
            Some(bit) => self.bits |= bit,
            None => {
                if let MessageAxis::Custom(custom) = axis {
                    if !self.custom.contains(&custom) {
                        self.custom.push(custom);
                    }
                }
            }
        }
    }

    /// Whether the set contains the axis.
    pub fn contains(&self, axis: MessageAxis) -> bool {
        match Self::bit(axis) {
            Some(bit) => self.bits & bit != 0,
            None => {
                matches!(axis, MessageAxis::Custom(custom) if self.custom.contains(&custom))
            }
        }
    }

    /// Whether no axis changed.
    pub fn is_empty(&self) -> bool {
        self.bits == 0 && self.custom.is_empty()
    }

    /// Number of axes in the set.
    pub fn len(&self) -> usize {
        self.bits.count_ones() as usize + self.custom.len()
    }

    /// Iterate the axes in the set.
    pub fn iter(&self) -> impl Iterator<Item = MessageAxis> + '_ {
        let closed = [
            (DATA_BIT, MessageAxis::Data),
            (ERROR_BIT, MessageAxis::Error),
            (PROGRESS_BIT, MessageAxis::Progress),
            (PAGINATION_BIT, MessageAxis::Pagination),
            (SELECTION_BIT, MessageAxis::Selection),
        ];
        closed
            .into_iter()
            .filter(move |(bit, _)| self.bits & bit != 0)
            .map(|(_, axis)| axis)
            .chain(self.custom.iter().copied().map(MessageAxis::Custom))
    }
}

impl FromIterator<MessageAxis> for AxisSet {
    fn from_iter<I: IntoIterator<Item = MessageAxis>>(iter: I) -> Self {
        let mut set = Self::new();
        for axis in iter {
            set.insert(axis);
        }
        set
    }
}

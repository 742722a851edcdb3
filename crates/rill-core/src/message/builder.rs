//! Message construction with per-axis change tracking.

use std::sync::Arc;

use crate::errors::FeedError;
use crate::message::axis::{AxisSet, AxisValue, CustomAxis, MessageAxis};
use crate::message::{Data, Message, MessageEntry, PaginationInfo, SelectionInfo};

/// Builds the next [`Message`] from a previous one.
///
/// Setters are pure per-axis mutations over the carried-over snapshot.
/// `build()` computes the changed-axis set by comparing only the touched
/// axes against the previous snapshot — cost is O(axes touched), and
/// untouched axes carry over verbatim without comparison.
pub struct MessageBuilder<T> {
    previous: Arc<MessageEntry<T>>,
    entry: MessageEntry<T>,
    touched: AxisSet,
}

impl<T: Clone> MessageBuilder<T> {
    pub(crate) fn new(base: &Message<T>) -> Self {
        let previous = base.current_arc();
        Self {
            entry: (*previous).clone(),
            previous,
            touched: AxisSet::new(),
        }
    }

    /// Set the data axis.
    pub fn data(mut self, data: Data<T>) -> Self {
        self.entry.data = data;
        self.touched.insert(MessageAxis::Data);
        self
    }

    /// Set the data axis to a value.
    pub fn some(self, value: T) -> Self {
        self.data(Data::Some(value))
    }

    /// Transform the data axis from its carried-over value.
    pub fn map_data(mut self, f: impl FnOnce(Data<T>) -> Data<T>) -> Self {
        let old = std::mem::replace(&mut self.entry.data, Data::Undefined);
        self.entry.data = f(old);
        self.touched.insert(MessageAxis::Data);
        self
    }

    /// Set or clear the error axis.
    pub fn error(mut self, error: Option<Arc<FeedError>>) -> Self {
        self.entry.error = error;
        self.touched.insert(MessageAxis::Error);
        self
    }

    /// Clear the error axis.
    pub fn clear_error(self) -> Self {
        self.error(None)
    }

    /// Set the progress axis.
    pub fn progress(mut self, refreshing: bool) -> Self {
        self.entry.progress = refreshing;
        self.touched.insert(MessageAxis::Progress);
        self
    }

    /// Set the pagination axis.
    pub fn pagination(mut self, info: PaginationInfo) -> Self {
        self.entry.pagination = Some(info);
        self.touched.insert(MessageAxis::Pagination);
        self
    }

    /// Set the selection axis.
    pub fn selection(mut self, info: SelectionInfo) -> Self {
        self.entry.selection = Some(info);
        self.touched.insert(MessageAxis::Selection);
        self
    }

    /// Set a custom axis value.
    pub fn custom(mut self, axis: CustomAxis, value: Arc<dyn AxisValue>) -> Self {
        self.entry.custom.insert(axis, value);
        self.touched.insert(MessageAxis::Custom(axis));
        self
    }

    /// Unset a custom axis.
    pub fn clear_custom(mut self, axis: CustomAxis) -> Self {
        self.entry.custom.shift_remove(&axis);
        self.touched.insert(MessageAxis::Custom(axis));
        self
    }
}

impl<T: Clone + PartialEq> MessageBuilder<T> {
    /// Freeze the builder into an immutable message.
    ///
    /// The changed set contains exactly the touched axes whose value differs
    /// from the previous snapshot under that axis's comparer. Setting data
    /// over an uncleared error is a caller bug: debug builds assert; release
    /// builds keep both axes and report both changed.
    pub fn build(self) -> Message<T> {
        debug_assert!(
            !(self.touched.contains(MessageAxis::Data)
                && !self.touched.contains(MessageAxis::Error)
                && self.previous.error.is_some()),
            "data set while a previous error is still present; clear the error axis explicitly"
        );

        let mut changes = AxisSet::new();
        for axis in self.touched.iter() {
            let differs = match axis {
                MessageAxis::Data => self.entry.data != self.previous.data,
                MessageAxis::Error => !error_eq(&self.entry.error, &self.previous.error),
                MessageAxis::Progress => self.entry.progress != self.previous.progress,
                MessageAxis::Pagination => self.entry.pagination != self.previous.pagination,
                MessageAxis::Selection => self.entry.selection != self.previous.selection,
                MessageAxis::Custom(custom) => {
                    !custom_eq(self.entry.custom.get(&custom), self.previous.custom.get(&custom))
                }
            };
            if differs {
                changes.insert(axis);
            }
        }

        Message::from_parts(self.previous, Arc::new(self.entry), changes)
    }
}

fn error_eq(a: &Option<Arc<FeedError>>, b: &Option<Arc<FeedError>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => Arc::ptr_eq(x, y) || x == y,
        _ => false,
    }
}

fn custom_eq(a: Option<&Arc<dyn AxisValue>>, b: Option<&Arc<dyn AxisValue>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => x.eq_value(y.as_ref()),
        _ => false,
    }
}

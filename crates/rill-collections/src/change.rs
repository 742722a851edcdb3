//! Collection change operations.
//!
//! A [`CollectionChange`] describes one incremental mutation of an ordered
//! collection. Changes are designed to be applied in emission order: the
//! indices of each change are valid against the collection state produced
//! by the preceding changes. A relocation is a first-class [`Move`] — never
//! a remove/add pair — so observable-collection consumers can preserve
//! selection and animation state.
//!
//! [`Move`]: CollectionChange::Move

/// One incremental change to an ordered collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionChange<T> {
    /// Insert `items` starting at `at`. Items at and after `at` shift right.
    Add {
        /// Position of the first inserted item (0-indexed).
        at: usize,
        /// Items to insert, in order.
        items: Vec<T>,
    },

    /// Remove `items.len()` items starting at `at`. Later items shift left.
    Remove {
        /// Position of the first removed item (0-indexed).
        at: usize,
        /// The removed items, for consumers that need them.
        items: Vec<T>,
    },

    /// Replace the items starting at `at` in place.
    ///
    /// `old` and `new` may have different lengths; the `old.len()` items at
    /// `at` are replaced by `new`.
    Replace {
        /// Position of the first replaced item (0-indexed).
        at: usize,
        /// Items being replaced.
        old: Vec<T>,
        /// Replacement items.
        new: Vec<T>,
    },

    /// Relocate `items.len()` items from `from` to `to`.
    ///
    /// `to` is the destination index after the removal has taken effect.
    Move {
        /// Source position (0-indexed).
        from: usize,
        /// Destination position after removal (0-indexed).
        to: usize,
        /// The relocated items.
        items: Vec<T>,
    },

    /// Replace the entire collection. Emitted instead of a flood of
    /// granular changes when too many positions differ.
    Reset {
        /// Complete previous contents.
        old: Vec<T>,
        /// Complete new contents.
        new: Vec<T>,
    },
}

impl<T> CollectionChange<T> {
    /// Create a single-item add.
    pub fn add(at: usize, item: T) -> Self {
        Self::Add {
            at,
            items: vec![item],
        }
    }

    /// Create a single-item remove.
    pub fn remove(at: usize, item: T) -> Self {
        Self::Remove {
            at,
            items: vec![item],
        }
    }

    /// Create a single-item in-place replace.
    pub fn replace(at: usize, old: T, new: T) -> Self {
        Self::Replace {
            at,
            old: vec![old],
            new: vec![new],
        }
    }

    /// Create a single-item move.
    pub fn move_item(from: usize, to: usize, item: T) -> Self {
        Self::Move {
            from,
            to,
            items: vec![item],
        }
    }

    /// Create a reset.
    pub fn reset(old: Vec<T>, new: Vec<T>) -> Self {
        Self::Reset { old, new }
    }

    /// Whether this is a reset.
    pub fn is_reset(&self) -> bool {
        matches!(self, Self::Reset { .. })
    }
}

/// Error applying a change to a concrete vector.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChangeError {
    /// The change's indices do not fit the target collection.
    #[error("Change out of bounds: {message}")]
    OutOfBounds {
        /// Describes the offending change and collection size.
        message: String,
    },
}

impl ChangeError {
    fn out_of_bounds(message: impl Into<String>) -> Self {
        Self::OutOfBounds {
            message: message.into(),
        }
    }
}

/// Apply a change to a mutable vector.
///
/// # Panics
///
/// Panics if the change's indices are out of bounds for `target`; use
/// [`try_apply_change`] to handle that case.
#[allow(clippy::expect_used)]
pub fn apply_change<T: Clone>(target: &mut Vec<T>, change: &CollectionChange<T>) {
    try_apply_change(target, change).expect("collection change out of bounds");
}

/// Apply a change to a mutable vector, reporting out-of-bounds indices.
pub fn try_apply_change<T: Clone>(
    target: &mut Vec<T>,
    change: &CollectionChange<T>,
) -> Result<(), ChangeError> {
    match change {
        CollectionChange::Add { at, items } => {
            if *at > target.len() {
                return Err(ChangeError::out_of_bounds(format!(
                    "add at {at} into {} items",
                    target.len()
                )));
            }
            target.splice(*at..*at, items.iter().cloned());
        }
        CollectionChange::Remove { at, items } => {
            let end = at + items.len();
            if end > target.len() {
                return Err(ChangeError::out_of_bounds(format!(
                    "remove {at}..{end} from {} items",
                    target.len()
                )));
            }
            target.drain(*at..end);
        }
        CollectionChange::Replace { at, old, new } => {
            let end = at + old.len();
            if end > target.len() {
                return Err(ChangeError::out_of_bounds(format!(
                    "replace {at}..{end} in {} items",
                    target.len()
                )));
            }
            target.splice(*at..end, new.iter().cloned());
        }
        CollectionChange::Move { from, to, items } => {
            let end = from + items.len();
            if end > target.len() {
                return Err(ChangeError::out_of_bounds(format!(
                    "move {from}..{end} from {} items",
                    target.len()
                )));
            }
            let moved: Vec<T> = target.drain(*from..end).collect();
            if *to > target.len() {
                return Err(ChangeError::out_of_bounds(format!(
                    "move destination {to} into {} items",
                    target.len()
                )));
            }
            target.splice(*to..*to, moved);
        }
        CollectionChange::Reset { new, .. } => {
            *target = new.clone();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_add_remove_replace() {
        let mut items = vec!["a", "b", "c"];

        apply_change(&mut items, &CollectionChange::add(1, "x"));
        assert_eq!(items, vec!["a", "x", "b", "c"]);

        apply_change(&mut items, &CollectionChange::remove(2, "b"));
        assert_eq!(items, vec!["a", "x", "c"]);

        apply_change(&mut items, &CollectionChange::replace(1, "x", "y"));
        assert_eq!(items, vec!["a", "y", "c"]);
    }

    #[test]
    fn test_apply_move_is_not_remove_plus_add() {
        let mut items = vec![1, 2, 3, 4];
        apply_change(&mut items, &CollectionChange::move_item(3, 0, 4));
        assert_eq!(items, vec![4, 1, 2, 3]);

        // Multi-item move.
        let mut items = vec![1, 2, 3, 4, 5];
        apply_change(
            &mut items,
            &CollectionChange::Move {
                from: 0,
                to: 2,
                items: vec![1, 2],
            },
        );
        assert_eq!(items, vec![3, 4, 1, 2, 5]);
    }

    #[test]
    fn test_apply_reset() {
        let mut items = vec![1, 2];
        apply_change(&mut items, &CollectionChange::reset(vec![1, 2], vec![7, 8, 9]));
        assert_eq!(items, vec![7, 8, 9]);
    }

    #[test]
    fn test_try_apply_out_of_bounds() {
        let mut items = vec![1];
        let result = try_apply_change(&mut items, &CollectionChange::remove(5, 9));
        assert!(matches!(result, Err(ChangeError::OutOfBounds { .. })));
        // Target untouched on failure.
        assert_eq!(items, vec![1]);
    }

    #[test]
    fn test_replace_with_different_lengths() {
        let mut items = vec![1, 2, 3];
        apply_change(
            &mut items,
            &CollectionChange::Replace {
                at: 1,
                old: vec![2],
                new: vec![8, 9],
            },
        );
        assert_eq!(items, vec![1, 8, 9, 3]);
    }
}

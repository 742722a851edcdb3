//! Keyed collection diffing.
//!
//! [`diff`] compares two snapshots of an ordered collection under a pair of
//! comparers and produces a [`CollectionUpdater`] whose queued
//! [`CollectionChange`]s transform the old snapshot into the new one. The
//! changes apply sequentially: each change's indices are valid against the
//! collection state left by the previous change.
//!
//! Items that survive under a changed position are reported as a single
//! [`Move`], with a follow-up [`Replace`] when the content also changed.
//! When the granular change list would be disproportionately long the diff
//! collapses to a single [`Reset`] instead.
//!
//! [`Move`]: CollectionChange::Move
//! [`Reset`]: CollectionChange::Reset

use std::sync::Arc;

use crate::change::CollectionChange;
use crate::updater::{CollectionUpdater, UpdateCallbacks};

/// Reset fallback kicks in when the granular change count exceeds this
/// fraction of the larger snapshot's length.
pub const DEFAULT_RESET_THRESHOLD: f64 = 0.5;

type Comparer<T> = Arc<dyn Fn(&T, &T) -> bool + Send + Sync>;

/// Comparers and tuning for [`diff`].
///
/// `key_eq` decides whether two items are the same entity; `content_eq`
/// decides whether a surviving entity is up to date. Without a `content_eq`
/// a surviving entity is always considered up to date, so in-place updates
/// go unnoticed; callers that re-emit changed entities under a stable key
/// must supply one.
#[derive(Clone)]
pub struct DiffOptions<T> {
    key_eq: Comparer<T>,
    content_eq: Option<Comparer<T>>,
    /// Reset fallback threshold as a fraction of the larger snapshot.
    /// A diff of a single change never resets.
    pub reset_threshold: f64,
}

impl<T> DiffOptions<T> {
    /// Options with an identity comparer and no content comparer.
    pub fn new(key_eq: impl Fn(&T, &T) -> bool + Send + Sync + 'static) -> Self {
        Self {
            key_eq: Arc::new(key_eq),
            content_eq: None,
            reset_threshold: DEFAULT_RESET_THRESHOLD,
        }
    }

    /// Options comparing identity through an extracted key.
    pub fn by_key<K: PartialEq>(key: impl Fn(&T) -> K + Send + Sync + 'static) -> Self {
        Self::new(move |a, b| key(a) == key(b))
    }

    /// Set the content comparer consulted for surviving entities.
    pub fn with_content_eq(
        mut self,
        content_eq: impl Fn(&T, &T) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.content_eq = Some(Arc::new(content_eq));
        self
    }

    /// Override the reset fallback threshold.
    pub fn with_reset_threshold(mut self, threshold: f64) -> Self {
        self.reset_threshold = threshold;
        self
    }

    fn same_key(&self, a: &T, b: &T) -> bool {
        (self.key_eq)(a, b)
    }

    fn up_to_date(&self, old: &T, new: &T) -> bool {
        match &self.content_eq {
            Some(content_eq) => content_eq(old, new),
            None => true,
        }
    }
}

impl<T: PartialEq> Default for DiffOptions<T> {
    fn default() -> Self {
        Self::new(|a: &T, b: &T| a == b)
    }
}

impl<T> std::fmt::Debug for DiffOptions<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiffOptions")
            .field("content_eq", &self.content_eq.is_some())
            .field("reset_threshold", &self.reset_threshold)
            .finish()
    }
}

/// Observes each diff outcome as it is emitted, in application order.
///
/// Mutating hooks receive the [`UpdateCallbacks`] queued with that change,
/// so a visitor can attach before/after work to individual changes.
#[allow(unused_variables)]
pub trait DiffVisitor<T> {
    /// An item inserted at `at`.
    fn add_item(&mut self, at: usize, item: &T, callbacks: &mut UpdateCallbacks) {}

    /// An item that kept its position and content; no change is queued.
    fn same_item(&mut self, at: usize, item: &T) {}

    /// An item replaced in place at `at`.
    fn replace_item(&mut self, at: usize, old: &T, new: &T, callbacks: &mut UpdateCallbacks) {}

    /// An item relocated from `from` to `to`.
    fn move_item(&mut self, from: usize, to: usize, item: &T, callbacks: &mut UpdateCallbacks) {}

    /// An item removed from `at`.
    fn remove_item(&mut self, at: usize, item: &T, callbacks: &mut UpdateCallbacks) {}

    /// The whole collection replaced at once.
    fn reset(&mut self, old: &[T], new: &[T], callbacks: &mut UpdateCallbacks) {}
}

/// A visitor that ignores every outcome.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopVisitor;

impl<T> DiffVisitor<T> for NoopVisitor {}

/// Diff `old` against `new`, producing the update batch to apply.
pub fn diff<T: Clone>(old: &[T], new: &[T], options: &DiffOptions<T>) -> CollectionUpdater<T> {
    diff_with_visitor(old, new, options, &mut NoopVisitor)
}

/// Diff `old` against `new`, feeding every outcome through `visitor`.
pub fn diff_with_visitor<T: Clone>(
    old: &[T],
    new: &[T],
    options: &DiffOptions<T>,
    visitor: &mut impl DiffVisitor<T>,
) -> CollectionUpdater<T> {
    let steps = compute_steps(old, new, options);
    let change_count = steps
        .iter()
        .filter(|step| matches!(step, Step::Change(_)))
        .count();

    let mut updater = CollectionUpdater::new();

    if should_reset(change_count, old.len(), new.len(), options.reset_threshold) {
        tracing::trace!(
            granular = change_count,
            old_len = old.len(),
            new_len = new.len(),
            "diff collapsed to reset"
        );
        let mut callbacks = UpdateCallbacks::new();
        visitor.reset(old, new, &mut callbacks);
        updater.push_with(
            vec![CollectionChange::reset(old.to_vec(), new.to_vec())],
            callbacks,
        );
        return updater;
    }

    for step in steps {
        match step {
            Step::Same { at, item } => visitor.same_item(at, &item),
            Step::Change(change) => {
                let mut callbacks = UpdateCallbacks::new();
                match &change {
                    CollectionChange::Add { at, items } => {
                        visitor.add_item(*at, &items[0], &mut callbacks);
                    }
                    CollectionChange::Remove { at, items } => {
                        visitor.remove_item(*at, &items[0], &mut callbacks);
                    }
                    CollectionChange::Replace { at, old, new } => {
                        visitor.replace_item(*at, &old[0], &new[0], &mut callbacks);
                    }
                    CollectionChange::Move { from, to, items } => {
                        visitor.move_item(*from, *to, &items[0], &mut callbacks);
                    }
                    CollectionChange::Reset { .. } => unreachable!("granular steps never reset"),
                }
                updater.push_with(vec![change], callbacks);
            }
        }
    }

    updater
}

fn should_reset(change_count: usize, old_len: usize, new_len: usize, threshold: f64) -> bool {
    if change_count < 2 {
        return false;
    }
    let larger = old_len.max(new_len) as f64;
    change_count as f64 > threshold * larger
}

enum Step<T> {
    Change(CollectionChange<T>),
    Same { at: usize, item: T },
}

/// Produce the granular step sequence, without the reset fallback.
///
/// Works over a scratch copy of `old` so every emitted index is valid
/// against the state the preceding changes produced. First remove
/// identities absent from `new` (descending, so indices stay stable), then
/// walk target positions resolving each to in-place content change,
/// relocation, or insertion, then remove whatever the walk left past the
/// last target position.
fn compute_steps<T: Clone>(old: &[T], new: &[T], options: &DiffOptions<T>) -> Vec<Step<T>> {
    let mut steps = Vec::new();
    let mut work: Vec<T> = old.to_vec();

    for at in (0..work.len()).rev() {
        if !new.iter().any(|item| options.same_key(&work[at], item)) {
            let item = work.remove(at);
            steps.push(Step::Change(CollectionChange::remove(at, item)));
        }
    }

    for pos in 0..new.len() {
        let target = &new[pos];

        if pos < work.len() && options.same_key(&work[pos], target) {
            if options.up_to_date(&work[pos], target) {
                steps.push(Step::Same {
                    at: pos,
                    item: target.clone(),
                });
            } else {
                steps.push(Step::Change(CollectionChange::replace(
                    pos,
                    work[pos].clone(),
                    target.clone(),
                )));
                work[pos] = target.clone();
            }
            continue;
        }

        // Every surviving identity ahead of `pos` is already settled, so a
        // match can only sit at a later index.
        let found = work
            .iter()
            .skip(pos)
            .position(|item| options.same_key(item, target))
            .map(|offset| pos + offset);

        match found {
            Some(from) => {
                let item = work.remove(from);
                steps.push(Step::Change(CollectionChange::move_item(
                    from,
                    pos,
                    item.clone(),
                )));
                work.insert(pos, item);
                if !options.up_to_date(&work[pos], target) {
                    steps.push(Step::Change(CollectionChange::replace(
                        pos,
                        work[pos].clone(),
                        target.clone(),
                    )));
                    work[pos] = target.clone();
                }
            }
            None => {
                steps.push(Step::Change(CollectionChange::add(pos, target.clone())));
                work.insert(pos, target.clone());
            }
        }
    }

    // Duplicate identities can leave surplus items behind the settled
    // positions: the removal pass keeps every item whose key survives, but
    // the position walk only consumes one per target slot. Trim the tail.
    for at in (new.len()..work.len()).rev() {
        let item = work.remove(at);
        steps.push(Step::Change(CollectionChange::remove(at, item)));
    }

    steps
}

#[cfg(test)]
mod tests {
    use crate::change::apply_change;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Row {
        id: u32,
        body: &'static str,
    }

    fn row(id: u32, body: &'static str) -> Row {
        Row { id, body }
    }

    fn options() -> DiffOptions<Row> {
        DiffOptions::by_key(|r: &Row| r.id).with_content_eq(|a, b| a == b)
    }

    fn changes_of(mut updater: CollectionUpdater<Row>) -> Vec<CollectionChange<Row>> {
        let mut out = Vec::new();
        updater.dequeue(|change, _| out.push(change.clone()), false);
        out
    }

    fn apply_all(old: &[Row], changes: &[CollectionChange<Row>]) -> Vec<Row> {
        let mut items = old.to_vec();
        for change in changes {
            apply_change(&mut items, change);
        }
        items
    }

    #[test]
    fn test_identical_snapshots_produce_no_changes() {
        let items = vec![row(1, "a"), row(2, "b")];
        let updater = diff(&items, &items, &options());
        assert!(updater.is_empty());
    }

    #[test]
    fn test_content_change_is_single_replace() {
        let old = vec![row(1, "a"), row(2, "b"), row(3, "c")];
        let new = vec![row(1, "a"), row(2, "b2"), row(3, "c")];

        let changes = changes_of(diff(&old, &new, &options()));
        assert_eq!(
            changes,
            vec![CollectionChange::replace(1, row(2, "b"), row(2, "b2"))]
        );
        assert_eq!(apply_all(&old, &changes), new);
    }

    #[test]
    fn test_without_content_comparer_survivors_stay_untouched() {
        let old = vec![row(1, "a"), row(2, "b")];
        let new = vec![row(1, "a"), row(2, "b2")];

        let identity_only = DiffOptions::by_key(|r: &Row| r.id);
        let changes = changes_of(diff(&old, &new, &identity_only));
        assert!(changes.is_empty());
    }

    #[test]
    fn test_vanished_identity_is_single_remove() {
        let old = vec![row(1, "a"), row(2, "b"), row(3, "c")];
        let new = vec![row(1, "a"), row(2, "b")];

        let changes = changes_of(diff(&old, &new, &options()));
        assert_eq!(changes, vec![CollectionChange::remove(2, row(3, "c"))]);
        assert_eq!(apply_all(&old, &changes), new);
    }

    #[test]
    fn test_appended_identity_is_single_add() {
        let old = vec![row(1, "a"), row(2, "b")];
        let new = vec![row(1, "a"), row(2, "b"), row(4, "d")];

        let changes = changes_of(diff(&old, &new, &options()));
        assert_eq!(changes, vec![CollectionChange::add(2, row(4, "d"))]);
        assert_eq!(apply_all(&old, &changes), new);
    }

    #[test]
    fn test_relocation_is_a_move_not_remove_add() {
        let old = vec![row(1, "a"), row(2, "b"), row(3, "c"), row(4, "d")];
        let new = vec![row(4, "d"), row(1, "a"), row(2, "b"), row(3, "c")];

        let changes = changes_of(diff(&old, &new, &options()));
        assert_eq!(changes, vec![CollectionChange::move_item(3, 0, row(4, "d"))]);
        assert_eq!(apply_all(&old, &changes), new);
    }

    #[test]
    fn test_move_with_content_change_emits_move_then_replace() {
        let old = vec![row(1, "a"), row(2, "b"), row(3, "c"), row(4, "d")];
        let new = vec![row(3, "c2"), row(1, "a"), row(2, "b"), row(4, "d")];

        let changes = changes_of(diff(&old, &new, &options()));
        assert_eq!(
            changes,
            vec![
                CollectionChange::move_item(2, 0, row(3, "c")),
                CollectionChange::replace(0, row(3, "c"), row(3, "c2")),
            ]
        );
        assert_eq!(apply_all(&old, &changes), new);
    }

    #[test]
    fn test_removals_emitted_at_descending_indices() {
        let old = vec![
            row(1, "a"),
            row(2, "b"),
            row(3, "c"),
            row(4, "d"),
            row(5, "e"),
        ];
        let new = vec![row(2, "b"), row(4, "d"), row(5, "e")];

        let changes = changes_of(diff(&old, &new, &options()));
        assert_eq!(
            changes,
            vec![
                CollectionChange::remove(2, row(3, "c")),
                CollectionChange::remove(0, row(1, "a")),
            ]
        );
        assert_eq!(apply_all(&old, &changes), new);
    }

    #[test]
    fn test_surplus_duplicate_identities_are_removed() {
        // Two items sharing a key, only one slot for it in the target.
        let old = vec![row(1, "a"), row(1, "dup")];
        let new = vec![row(1, "a")];

        let changes = changes_of(diff(&old, &new, &options()));
        assert_eq!(changes, vec![CollectionChange::remove(1, row(1, "dup"))]);
        assert_eq!(apply_all(&old, &changes), new);
    }

    #[test]
    fn test_duplicate_identities_fill_duplicate_slots() {
        let old = vec![row(1, "a"), row(1, "b")];
        let new = vec![row(1, "b"), row(1, "a"), row(1, "c")];

        let opts = options().with_reset_threshold(1.0);
        let changes = changes_of(diff(&old, &new, &opts));
        assert_eq!(apply_all(&old, &changes), new);
    }

    #[test]
    fn test_mostly_different_snapshots_collapse_to_reset() {
        let old = vec![row(1, "a"), row(2, "b"), row(3, "c")];
        let new = vec![row(7, "x"), row(8, "y"), row(9, "z")];

        let changes = changes_of(diff(&old, &new, &options()));
        assert_eq!(changes.len(), 1);
        assert!(changes[0].is_reset());
        assert_eq!(apply_all(&old, &changes), new);
    }

    #[test]
    fn test_single_change_never_resets() {
        // One granular change is always cheaper than a reset, whatever
        // the threshold says.
        let old = vec![row(1, "a")];
        let new = vec![row(1, "a2")];

        let opts = options().with_reset_threshold(0.0);
        let changes = changes_of(diff(&old, &new, &opts));
        assert_eq!(
            changes,
            vec![CollectionChange::replace(0, row(1, "a"), row(1, "a2"))]
        );
    }

    #[test]
    fn test_visitor_outcomes_match_emitted_changes() {
        #[derive(Default)]
        struct Recorder {
            adds: Vec<usize>,
            sames: Vec<usize>,
            replaces: Vec<usize>,
            moves: Vec<(usize, usize)>,
            removes: Vec<usize>,
        }
        impl DiffVisitor<Row> for Recorder {
            fn add_item(&mut self, at: usize, _item: &Row, _cb: &mut UpdateCallbacks) {
                self.adds.push(at);
            }
            fn same_item(&mut self, at: usize, _item: &Row) {
                self.sames.push(at);
            }
            fn replace_item(&mut self, at: usize, _o: &Row, _n: &Row, _cb: &mut UpdateCallbacks) {
                self.replaces.push(at);
            }
            fn move_item(&mut self, from: usize, to: usize, _i: &Row, _cb: &mut UpdateCallbacks) {
                self.moves.push((from, to));
            }
            fn remove_item(&mut self, at: usize, _item: &Row, _cb: &mut UpdateCallbacks) {
                self.removes.push(at);
            }
        }

        let old = vec![row(1, "a"), row(2, "b"), row(3, "c"), row(4, "d")];
        let new = vec![row(1, "a"), row(3, "c"), row(2, "b2")];

        let mut recorder = Recorder::default();
        let opts = options().with_reset_threshold(1.0);
        let updater = diff_with_visitor(&old, &new, &opts, &mut recorder);

        assert_eq!(recorder.removes, vec![3]);
        assert_eq!(recorder.sames, vec![0]);
        assert_eq!(recorder.moves, vec![(2, 1)]);
        assert_eq!(recorder.replaces, vec![2]);
        assert!(recorder.adds.is_empty());
        assert_eq!(apply_all(&old, &changes_of(updater)), new);
    }

    #[test]
    fn test_visitor_callbacks_fire_around_their_change() {
        use parking_lot::Mutex;

        struct Hooks(Arc<Mutex<Vec<String>>>);
        impl DiffVisitor<Row> for Hooks {
            fn add_item(&mut self, at: usize, _item: &Row, callbacks: &mut UpdateCallbacks) {
                let log = Arc::clone(&self.0);
                callbacks.run_before(move || log.lock().push(format!("before-add-{at}")));
                let log = Arc::clone(&self.0);
                callbacks.run_after(move || log.lock().push(format!("after-add-{at}")));
            }
        }

        let old = vec![row(1, "a")];
        let new = vec![row(1, "a"), row(2, "b")];

        let log: Arc<Mutex<Vec<String>>> = Arc::default();
        let mut updater = diff_with_visitor(&old, &new, &options(), &mut Hooks(Arc::clone(&log)));

        {
            let log = Arc::clone(&log);
            updater.dequeue(move |_, _| log.lock().push("change".into()), false);
        }
        assert_eq!(*log.lock(), vec!["before-add-1", "change", "after-add-1"]);
    }

    #[test]
    fn test_update_then_trim_then_append_stays_granular() {
        let a = row(1, "a");
        let b = row(2, "b");
        let c = row(3, "c");
        let b2 = row(2, "b2");
        let d = row(4, "d");

        // Update in place.
        let s0 = vec![a.clone(), b.clone(), c.clone()];
        let s1 = vec![a.clone(), b2.clone(), c.clone()];
        let changes = changes_of(diff(&s0, &s1, &options()));
        assert_eq!(changes, vec![CollectionChange::replace(1, b, b2.clone())]);

        // Trim the tail.
        let s2 = vec![a.clone(), b2.clone()];
        let changes = changes_of(diff(&s1, &s2, &options()));
        assert_eq!(changes, vec![CollectionChange::remove(2, c)]);

        // Append.
        let s3 = vec![a, b2, d.clone()];
        let changes = changes_of(diff(&s2, &s3, &options()));
        assert_eq!(changes, vec![CollectionChange::add(2, d)]);
    }
}

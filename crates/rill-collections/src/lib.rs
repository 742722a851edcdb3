//! Rill Collections - Incremental Collection Updates
//!
//! Keyed diffing between collection snapshots, the [`CollectionChange`]
//! vocabulary those diffs speak, batched application through
//! [`CollectionUpdater`], and listener-backed [`ObservableVec`]s that
//! bindings mutate change-by-change instead of wholesale.
//!
//! The diff guarantees relocations surface as single `Move` changes, so a
//! bound view can keep selection and animation state across reorders, and
//! falls back to a full `Reset` only when granular changes would cost more
//! than rebuilding.

#![forbid(unsafe_code)]

/// Change operations and their application to concrete vectors.
pub mod change;

/// Keyed snapshot diffing with move detection and reset fallback.
pub mod diff;

/// Listener-backed observable vectors.
pub mod observable;

/// Batched change queues with before/after hooks.
pub mod updater;

pub use change::{apply_change, try_apply_change, ChangeError, CollectionChange};
pub use diff::{
    diff, diff_with_visitor, DiffOptions, DiffVisitor, NoopVisitor, DEFAULT_RESET_THRESHOLD,
};
pub use observable::{ListenerGuard, ObservableVec};
pub use updater::{Callback, CollectionUpdater, UpdateCallbacks};

//! # Collection binding
//!
//! Bridges a [`ListState`] to an [`ObservableVec`]: every published list
//! snapshot is diffed against the collection's known contents and the
//! resulting change batch is applied on the collection's owner context,
//! marshalled through the [`Dispatcher`] when the binding task does not
//! have thread access.

use std::sync::Arc;

use futures::StreamExt;
use tokio::task::JoinHandle;

use rill_collections::{diff, CollectionUpdater, DiffOptions, ObservableVec};
use rill_core::context::{CancellationToken, SourceContext};
use rill_core::dispatcher::Dispatcher;

use crate::feed::Feed;
use crate::list_state::ListState;

/// Keep `target` synchronized with `list` until `ct` cancels or the list
/// is dropped.
///
/// The target's current contents seed the first diff, so a pre-populated
/// collection bound to an identical list sees no changes at all.
pub fn bind_list_state<T>(
    list: &ListState<T>,
    target: Arc<ObservableVec<T>>,
    options: DiffOptions<T>,
    context: Arc<SourceContext>,
    dispatcher: Arc<dyn Dispatcher>,
    ct: CancellationToken,
) -> JoinHandle<()>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    let mut source = list.state().source(context, ct.clone());

    tokio::spawn(async move {
        let mut known: Vec<T> = target.snapshot();
        loop {
            let message = tokio::select! {
                _ = ct.cancelled() => break,
                message = source.next() => match message {
                    Some(message) => message,
                    None => break,
                },
            };

            let items: Vec<T> = message
                .current()
                .data()
                .value()
                .cloned()
                .unwrap_or_default();
            if items == known {
                continue;
            }

            let updater = diff(&known, &items, &options);
            known = items;
            apply_batch(&target, &dispatcher, updater);
        }
        tracing::trace!("list binding ended");
    })
}

fn apply_batch<T>(
    target: &Arc<ObservableVec<T>>,
    dispatcher: &Arc<dyn Dispatcher>,
    mut updater: CollectionUpdater<T>,
) where
    T: Clone + Send + Sync + 'static,
{
    if dispatcher.has_thread_access() {
        target.dequeue_changes(&mut updater, false);
    } else {
        let target = Arc::clone(target);
        dispatcher.enqueue(Box::new(move || {
            target.dequeue_changes(&mut updater, false);
        }));
    }
}

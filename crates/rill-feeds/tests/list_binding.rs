//! End-to-end list propagation: entity events drive a `ListState`, the
//! binding diffs each published snapshot, and an `ObservableVec` receives
//! granular changes (moves and replaces, not rebuilds) on the right
//! execution context.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use rill_collections::{CollectionChange, DiffOptions, ObservableVec};
use rill_core::context::SourceContext;
use rill_core::dispatcher::Dispatcher;
use rill_feeds::{bind_list_state, EntityMessage, ListState};
use rill_testkit::{init_tracing, TestDispatcher};

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

type Recorded = Arc<Mutex<Vec<CollectionChange<Row>>>>;

fn recording(target: &ObservableVec<Row>) -> (Recorded, rill_collections::ListenerGuard<Row>) {
    let seen: Recorded = Arc::default();
    let sink = Arc::clone(&seen);
    let guard = target.subscribe(move |change| sink.lock().push(change.clone()));
    (seen, guard)
}

async fn wait_until(mut predicate: impl FnMut() -> bool) {
    for _ in 0..200 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached before the deadline");
}

#[tokio::test]
async fn test_entity_flow_emits_granular_changes() {
    init_tracing();
    let ctx = SourceContext::root(None);
    let ct = ctx.cancellation_token();

    let (a, b, c) = (row(1, "a"), row(2, "b"), row(3, "c"));
    let (b2, d) = (row(2, "b2"), row(4, "d"));

    let list = ListState::new(vec![a.clone(), b.clone(), c.clone()]);
    let target = Arc::new(ObservableVec::new(vec![a.clone(), b.clone(), c.clone()]));
    let (seen, _guard) = recording(&target);

    let dispatcher: Arc<dyn Dispatcher> = Arc::new(TestDispatcher::new(true));
    let _binding = bind_list_state(
        &list,
        Arc::clone(&target),
        options(),
        Arc::clone(&ctx),
        dispatcher,
        ct.clone(),
    );

    list.update_by_key(|r| r.id, EntityMessage::updated(b2.clone()), &ct)
        .await
        .expect("update");
    list.update_by_key(|r| r.id, EntityMessage::deleted(c.clone()), &ct)
        .await
        .expect("delete");
    list.update_by_key(|r| r.id, EntityMessage::created(d.clone()), &ct)
        .await
        .expect("create");

    wait_until(|| seen.lock().len() >= 3).await;

    assert_eq!(
        *seen.lock(),
        vec![
            CollectionChange::replace(1, b, b2.clone()),
            CollectionChange::remove(2, c),
            CollectionChange::add(2, d.clone()),
        ]
    );
    assert_eq!(target.snapshot(), vec![a, b2, d]);
}

#[tokio::test]
async fn test_binding_marshals_without_thread_access() {
    init_tracing();
    let ctx = SourceContext::root(None);
    let ct = ctx.cancellation_token();

    let list = ListState::new(vec![row(1, "a")]);
    let target = Arc::new(ObservableVec::new(vec![row(1, "a")]));
    let dispatcher = Arc::new(TestDispatcher::new(false));

    let _binding = bind_list_state(
        &list,
        Arc::clone(&target),
        options(),
        Arc::clone(&ctx),
        Arc::clone(&dispatcher) as Arc<dyn Dispatcher>,
        ct.clone(),
    );

    list.add(row(2, "b"), &ct).await.expect("add");

    // The batch queues on the dispatcher instead of applying directly.
    wait_until(|| dispatcher.pending() > 0).await;
    assert_eq!(target.snapshot(), vec![row(1, "a")]);

    dispatcher.run_pending();
    assert_eq!(target.snapshot(), vec![row(1, "a"), row(2, "b")]);
}

#[tokio::test]
async fn test_wholesale_replacement_collapses_to_reset() {
    init_tracing();
    let ctx = SourceContext::root(None);
    let ct = ctx.cancellation_token();

    let old = vec![row(1, "a"), row(2, "b"), row(3, "c")];
    let new = vec![row(7, "x"), row(8, "y"), row(9, "z")];

    let list = ListState::new(old.clone());
    let target = Arc::new(ObservableVec::new(old));
    let (seen, _guard) = recording(&target);

    let dispatcher: Arc<dyn Dispatcher> = Arc::new(TestDispatcher::new(true));
    let _binding = bind_list_state(
        &list,
        Arc::clone(&target),
        options(),
        Arc::clone(&ctx),
        dispatcher,
        ct.clone(),
    );

    let replacement = new.clone();
    list.state()
        .update_message(move |b| b.some(replacement), &ct)
        .await
        .expect("replace");

    wait_until(|| !seen.lock().is_empty()).await;
    let changes = seen.lock().clone();
    assert_eq!(changes.len(), 1);
    assert!(changes[0].is_reset());
    assert_eq!(target.snapshot(), new);
}

#[tokio::test]
async fn test_binding_ends_on_context_disposal() {
    init_tracing();
    let ctx = SourceContext::root(None);
    let ct = ctx.cancellation_token();

    let list = ListState::new(vec![row(1, "a")]);
    let target = Arc::new(ObservableVec::new(vec![row(1, "a")]));
    let dispatcher: Arc<dyn Dispatcher> = Arc::new(TestDispatcher::new(true));

    let binding = bind_list_state(
        &list,
        Arc::clone(&target),
        options(),
        Arc::clone(&ctx),
        dispatcher,
        ct,
    );

    ctx.dispose();
    tokio::time::timeout(Duration::from_millis(500), binding)
        .await
        .expect("binding task should end promptly")
        .expect("binding task should not panic");
}

//! End-to-end dispatch behavior through the public API

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use flux_dispatch::prelude::*;
use flux_dispatch::testing::TestHarness;
use flux_dispatch::{assert_lifecycle, from_fn, Domain, TrackingZone};

#[derive(Action, Debug)]
enum CounterAction {
    Increment,
    Fail,
    Load(u32),
}

#[derive(Debug, Default)]
struct Counter {
    count: i32,
}

type Harness = TestHarness<Counter, CounterAction>;

/// Applies `Increment`; every other action leaves the state untouched.
fn reducer(
    state: Arc<Counter>,
    action: Arc<CounterAction>,
    next: Next<Counter, CounterAction>,
) -> PluginFuture<Counter> {
    let next_state = match *action {
        CounterAction::Increment => Arc::new(Counter {
            count: state.count + 1,
        }),
        _ => state,
    };
    next.run(next_state, action)
}

fn builder() -> DispatcherBuilder<Counter, CounterAction> {
    Dispatcher::builder(Counter::default()).plugin(from_fn("reducer", reducer))
}

fn harness() -> Harness {
    TestHarness::with_builder(builder())
}

/// `Fail` errors with "boom", everything else succeeds.
fn complete_all(harness: &Harness) {
    harness.spawn_handler(|action| match action {
        CounterAction::Fail => Err("boom".into()),
        _ => Ok(()),
    });
}

async fn within<F: std::future::Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(1), future)
        .await
        .expect("timed out")
}

#[tokio::test]
async fn test_increment_resolves_with_new_state() {
    let harness = harness();
    complete_all(&harness);

    let state = within(harness.dispatch(CounterAction::Increment))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.count, 1);
    assert_eq!(harness.state().count, 1);
}

#[tokio::test]
async fn test_fail_errors_and_reaches_global_handler() {
    let harness = harness();
    complete_all(&harness);

    let err = within(harness.dispatch(CounterAction::Fail))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Action { action: "Fail", .. }));
    assert_eq!(err.error().to_string(), "boom");

    assert!(harness.errors.wait_for(1).await);
    let reported = harness.errors.errors();
    assert_eq!(reported.len(), 1);
    assert_eq!(reported[0].error().to_string(), "boom");
    assert_eq!(harness.errors.reported_tracked(), vec![true]);
}

#[tokio::test]
async fn test_errors_reported_when_handle_is_dropped() {
    let harness = harness();
    complete_all(&harness);

    drop(harness.dispatch(CounterAction::Fail));
    assert!(harness.errors.wait_for(1).await);
}

#[tokio::test]
async fn test_lifecycle_is_dispatched_then_terminal() {
    let mut harness = harness();
    complete_all(&harness);

    let ok = Arc::new(CounterAction::Increment);
    let failed = Arc::new(CounterAction::Fail);
    within(harness.dispatch(ok.clone())).await.unwrap();
    within(harness.dispatch(failed.clone())).await.unwrap_err();

    let events = harness.events.collect(4).await;
    assert_lifecycle!(events, &ok, [Dispatched, Successful]);
    assert_lifecycle!(events, &failed, [Dispatched, Errored]);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(harness.drain_events().is_empty());
}

#[tokio::test]
async fn test_dispatched_observer_sees_updated_state() {
    let harness = harness();
    let mut events = harness.dispatcher.actions().subscribe();
    let state = harness.dispatcher.state().clone();

    let observer = tokio::spawn(async move {
        let context = events.recv().await.unwrap();
        (context.status(), state.get().count)
    });

    let _pending = harness.dispatch(CounterAction::Increment);
    let (status, count) = within(observer).await.unwrap();
    assert_eq!(status, ActionStatus::Dispatched);
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_replay_runs_chain_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let harness = TestHarness::with_builder(builder().plugin_fn(
        "count",
        move |state, action, next: Next<Counter, CounterAction>| {
            counter.fetch_add(1, Ordering::SeqCst);
            next.run(state, action)
        },
    ));
    complete_all(&harness);

    let handle = harness.dispatch(CounterAction::Increment);
    let replay = handle.clone();
    let first = within(handle).await.unwrap().unwrap();
    let second = within(replay).await.unwrap().unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unresolved_action_never_settles() {
    let harness = harness();

    let handle = harness.dispatch(CounterAction::Load(1));
    let waited = tokio::time::timeout(Duration::from_millis(50), handle.clone()).await;
    assert!(waited.is_err());
    assert!(!handle.is_settled());
    assert!(harness.errors.is_empty());
}

#[tokio::test]
async fn test_dispatch_many_keeps_input_order() {
    let harness = harness();
    let first = Arc::new(CounterAction::Load(1));
    let second = Arc::new(CounterAction::Load(2));

    let handle = harness.dispatch_many([first.clone(), second.clone()]);

    // Complete out of order with a different state current each time.
    harness.succeed(&second);
    tokio::time::sleep(Duration::from_millis(20)).await;
    harness.dispatcher.state().set(Arc::new(Counter { count: 100 }));
    harness.succeed(&first);

    let states = within(handle).await.unwrap().unwrap();
    let counts: Vec<i32> = states.iter().map(|s| s.count).collect();
    assert_eq!(counts, vec![100, 0]);
}

#[tokio::test]
async fn test_dispatch_many_fails_fast() {
    let harness = harness();
    let never = Arc::new(CounterAction::Load(1));
    let failing = Arc::new(CounterAction::Fail);

    let handle = harness.dispatch_many([never, failing.clone()]);
    harness.fail(&failing, "boom");

    let err = within(handle).await.unwrap_err();
    assert_eq!(err.error().to_string(), "boom");
    assert!(harness.errors.wait_for(1).await);
}

#[tokio::test]
async fn test_dispatch_many_completes_without_value_when_one_does() {
    // `Load(0)` ends the chain without a state and never reaches the buses.
    let harness = TestHarness::with_builder(builder().plugin_fn(
        "skip-empty-load",
        |state, action, next: Next<Counter, CounterAction>| -> PluginFuture<Counter> {
            match *action {
                CounterAction::Load(0) => Box::pin(std::future::ready(Ok(None))),
                _ => next.run(state, action),
            }
        },
    ));

    // `Load(1)` is never completed, so only the empty load can settle the join.
    let outcome = within(harness.dispatch_many([CounterAction::Load(1), CounterAction::Load(0)]))
        .await
        .unwrap();
    assert!(outcome.is_none());
}

#[tokio::test]
async fn test_same_arc_in_flight_twice_settles_both_on_one_result() {
    let mut harness = harness();
    let action = Arc::new(CounterAction::Increment);

    let first = harness.dispatch(action.clone());
    let second = harness.dispatch(action.clone());
    assert_eq!(harness.state().count, 2);

    harness.succeed(&action);
    let first = within(first).await.unwrap().unwrap();
    let second = within(second).await.unwrap().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.count, 2);

    // Each dispatch forwards the shared terminal context once.
    let events = harness.events.collect(4).await;
    assert_lifecycle!(events, &action, [Dispatched, Dispatched, Successful, Successful]);

    // The result was consumed; a later publish settles nothing new.
    assert_eq!(harness.results().pending_count(), 0);
    harness.succeed(&action);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(harness.drain_events().is_empty());
}

#[tokio::test]
async fn test_burst_through_handler_settles_every_dispatch() {
    let harness = harness();
    complete_all(&harness);

    let actions: Vec<CounterAction> = (0..3000).map(|_| CounterAction::Increment).collect();
    let handle = harness.dispatch_many(actions);
    let states = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("burst settled")
        .unwrap()
        .unwrap();

    assert_eq!(states.len(), 3000);
    assert!(states.iter().all(|state| state.count == 3000));
    assert_eq!(harness.results().pending_count(), 0);
}

#[tokio::test]
async fn test_dispatch_many_empty() {
    let harness = harness();
    let states = within(harness.dispatch_many(Vec::<CounterAction>::new()))
        .await
        .unwrap();
    assert_eq!(states.map(|s| s.len()), Some(0));
}

/// Records whether the chain ran inside the tracked domain.
fn domain_recorder(seen: Arc<AtomicBool>) -> DispatcherBuilder<Counter, CounterAction> {
    builder().plugin_fn("domain", move |state, action, next| {
        seen.store(TrackingZone::is_tracked(), Ordering::SeqCst);
        next.run(state, action)
    })
}

async fn run_in_domain(platform: Platform, outside_zone: Option<bool>) -> (Harness, bool) {
    let seen = Arc::new(AtomicBool::new(false));
    let harness = TestHarness::with_builder(
        domain_recorder(seen.clone())
            .platform(platform)
            .config(DispatchConfig::default().with_outside_zone(outside_zone)),
    );
    complete_all(&harness);

    within(harness.dispatch(CounterAction::Increment))
        .await
        .unwrap();
    let tracked = seen.load(Ordering::SeqCst);
    (harness, tracked)
}

#[tokio::test]
async fn test_server_always_runs_tracked() {
    for outside_zone in [None, Some(true), Some(false)] {
        let (harness, tracked) = run_in_domain(Platform::Server, outside_zone).await;
        assert_eq!(harness.dispatcher.domain(), Domain::Tracked);
        assert!(tracked);
        assert_eq!(harness.zone.tracked_runs(), 1);
        assert_eq!(harness.zone.untracked_runs(), 0);
    }
}

#[tokio::test]
async fn test_client_inside_zone_runs_tracked() {
    let (harness, tracked) = run_in_domain(Platform::Client, Some(false)).await;
    assert_eq!(harness.dispatcher.domain(), Domain::Tracked);
    assert!(tracked);
    assert_eq!(harness.zone.untracked_runs(), 0);
}

#[tokio::test]
async fn test_client_outside_zone_runs_untracked() {
    for outside_zone in [None, Some(true)] {
        let (harness, tracked) = run_in_domain(Platform::Client, outside_zone).await;
        assert_eq!(harness.dispatcher.domain(), Domain::Untracked);
        assert!(!tracked);
        assert_eq!(harness.zone.untracked_runs(), 1);
    }
}

#[tokio::test]
async fn test_client_outside_zone_delivers_value_inside_tracked_domain() {
    let harness = TestHarness::with_builder(
        builder().config(DispatchConfig::default().with_outside_zone(Some(true))),
    );
    complete_all(&harness);

    let (tx, rx) = oneshot::channel();
    let settled = harness
        .dispatch(CounterAction::Increment)
        .on_settled(move |outcome| {
            let count = outcome.ok().flatten().map(|state| state.count);
            let _ = tx.send((TrackingZone::is_tracked(), count));
        });

    within(settled).await.unwrap();
    assert_eq!(within(rx).await.unwrap(), (true, Some(1)));
    assert_eq!(harness.zone.untracked_runs(), 1);
    assert_eq!(harness.zone.tracked_runs(), 1);
}

#[tokio::test]
async fn test_client_delivers_error_inside_tracked_domain() {
    let harness = harness();
    complete_all(&harness);

    let (tx, rx) = oneshot::channel();
    harness.dispatch(CounterAction::Fail).subscribe(
        |_state| panic!("Fail never resolves with a state"),
        move |error| {
            let _ = tx.send((TrackingZone::is_tracked(), error.error().to_string()));
        },
    );

    assert_eq!(within(rx).await.unwrap(), (true, "boom".to_string()));
}

#[tokio::test]
async fn test_logging_plugin_is_transparent() {
    let harness = TestHarness::with_builder(builder().plugin(LoggingPlugin::verbose()));
    complete_all(&harness);

    let state = within(harness.dispatch(CounterAction::Increment))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.count, 1);
}

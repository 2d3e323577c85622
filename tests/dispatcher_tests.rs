//! Event dispatch: serial handling, deferral and redelivery

mod common;

use common::{configured_spec, relation, Harness};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use site_manager_operator::constants::{ENROLL_ENDPOINT, HEALTH_CHECK_NAME};
use site_manager_operator::controller::enroll::TOKEN_KEY;
use site_manager_operator::controller::{Event, OperatorStatus, Outcome};
use site_manager_operator::runtime::dispatcher::Dispatcher;
use site_manager_operator::runtime::pebble_poller::PebblePoller;
use site_manager_operator::workload::{Check, Layer, Workload};

#[tokio::test]
async fn test_deferred_event_is_queued_once() {
    let harness = Harness::leader();
    harness.relations.add(relation(ENROLL_ENDPOINT, 7, &[]));
    let mut dispatcher = Dispatcher::new(harness.operator(configured_spec()));
    let joined = Event::EnrollJoined { relation_id: 7 };

    assert!(dispatcher.deliver(joined.clone()).await.is_deferred());
    assert!(dispatcher.deliver(joined.clone()).await.is_deferred());

    assert_eq!(dispatcher.deferred(), [joined]);
}

#[tokio::test]
async fn test_deferred_event_redelivered_before_next_event() {
    let harness = Harness::leader().with_required_integrations();
    harness.relations.add(relation(ENROLL_ENDPOINT, 7, &[]));
    let mut dispatcher = Dispatcher::new(harness.operator(configured_spec()));

    let joined = Event::EnrollJoined { relation_id: 7 };
    assert!(dispatcher.deliver(joined.clone()).await.is_deferred());

    // Redelivery happens before the bootstrap this event triggers
    assert_eq!(dispatcher.deliver(Event::WorkloadReady).await, Outcome::Applied);
    assert_eq!(dispatcher.deferred(), [joined]);

    assert_eq!(dispatcher.deliver(Event::CheckRecovered).await, Outcome::Applied);
    assert!(dispatcher.deferred().is_empty());
    assert_eq!(
        harness.relations.local_data(ENROLL_ENDPOINT, 7)[TOKEN_KEY],
        "enroll-token-0"
    );
}

#[tokio::test]
async fn test_unreachable_runtime_event_is_retried() {
    let harness = Harness::leader().with_required_integrations();
    harness.workload.set_reachable(false);
    let mut dispatcher = Dispatcher::new(harness.operator(configured_spec()));

    assert!(dispatcher.deliver(Event::DatabaseCreated).await.is_deferred());
    assert_eq!(dispatcher.deferred(), [Event::DatabaseCreated]);

    harness.workload.set_reachable(true);
    assert_eq!(dispatcher.deliver(Event::WorkloadReady).await, Outcome::Applied);
    assert!(dispatcher.deferred().is_empty());
    assert_eq!(dispatcher.operator().status(), &OperatorStatus::Active);
}

#[tokio::test]
async fn test_run_consumes_until_senders_close() {
    let harness = Harness::leader().with_required_integrations();
    let dispatcher = Dispatcher::new(harness.operator(configured_spec()));
    let ready = Arc::new(AtomicBool::new(false));
    let (tx, rx) = mpsc::channel(8);

    tx.send(Event::WorkloadReady).await.unwrap();
    tx.send(Event::DatabaseEndpointsChanged).await.unwrap();
    drop(tx);

    tokio::time::timeout(
        Duration::from_secs(5),
        dispatcher.run(rx, Arc::clone(&ready)),
    )
    .await
    .expect("event loop exits when every sender is dropped");

    assert!(!ready.load(Ordering::Relaxed));
    assert_eq!(harness.workload.restarts(), 1);
    assert_eq!(harness.status.published().last(), Some(&OperatorStatus::Active));
}

#[tokio::test]
async fn test_poller_emits_edges_only() {
    let harness = Harness::leader();
    let workload: Arc<dyn Workload> = harness.workload.clone();
    let mut poller = PebblePoller::new(workload, Duration::from_secs(10));

    assert_eq!(poller.poll_once().await, vec![Event::WorkloadReady]);
    assert!(poller.poll_once().await.is_empty());

    let layer = Layer {
        checks: [(HEALTH_CHECK_NAME.to_string(), Check::default())].into(),
        ..Layer::default()
    };
    harness
        .workload
        .add_layer("site-manager", &layer, true)
        .await
        .unwrap();
    assert_eq!(poller.poll_once().await, vec![Event::CheckRecovered]);
    assert!(poller.poll_once().await.is_empty());

    harness.workload.set_check_up(false);
    assert_eq!(poller.poll_once().await, vec![Event::CheckFailed]);
    assert!(poller.poll_once().await.is_empty());

    harness.workload.set_reachable(false);
    assert!(poller.poll_once().await.is_empty());
    harness.workload.set_check_up(true);
    harness.workload.set_reachable(true);
    assert_eq!(
        poller.poll_once().await,
        vec![Event::WorkloadReady, Event::CheckRecovered]
    );
}

//! A host with a short `check_interval` gets checked repeatedly, roughly
//! that often apart, once `Scheduler::prime` has scanned it in.

use std::sync::Arc;
use std::time::Duration;

use object_model::{Host, ObjectRef, Registry};
use scheduler::{NullCheckResultSink, NullNotificationSink, Scheduler};
use test_support::MockCommandRunner;
use tokio::sync::RwLock;

fn due_host(name: &str, interval: f64) -> Host {
    let mut host = Host::new(name, "10.0.0.1", "hostalive");
    host.base.active = true;
    host.base.authority = true;
    host.checkable.check_interval = interval;
    host.checkable.retry_interval = interval;
    host.checkable.next_check = 0.0;
    host
}

#[tokio::test]
async fn checks_recur_on_their_configured_interval() {
    let mut registry = Registry::new();
    registry.insert(ObjectRef::Host(due_host("web1", 0.2)));
    let registry = Arc::new(RwLock::new(registry));

    let runner = Arc::new(MockCommandRunner::new());
    let scheduler = Scheduler::new(
        registry.clone(),
        runner.clone(),
        None,
        Arc::new(NullNotificationSink),
        Arc::new(NullCheckResultSink),
        "master",
    );

    scheduler.prime().await;
    tokio::time::sleep(Duration::from_millis(1_000)).await;

    let calls = runner.calls().len();
    assert!(calls >= 3, "expected at least 3 checks in a one second window at a 200ms cadence, got {calls}");
}

#[tokio::test]
async fn disabling_active_checks_stops_recurrence() {
    let mut host = due_host("web2", 0.15);
    host.checkable.enable_active_checks = false;
    let mut registry = Registry::new();
    registry.insert(ObjectRef::Host(host));
    let registry = Arc::new(RwLock::new(registry));

    let runner = Arc::new(MockCommandRunner::new());
    let scheduler = Scheduler::new(
        registry,
        runner.clone(),
        None,
        Arc::new(NullNotificationSink),
        Arc::new(NullCheckResultSink),
        "master",
    );

    scheduler.prime().await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert!(runner.calls().is_empty(), "prime() must skip checkables with active checks disabled");
}

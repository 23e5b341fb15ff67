//! Drives a service through a full soft-retry cycle into a hard problem
//! and back to recovery, asserting on what the scheduler hands its sinks
//! at each step rather than just on the checkable's own fields.

use std::sync::{Arc, Mutex};

use object_model::{CheckResult, NotificationKind, ObjectName, ObjectRef, Registry, Service};
use scheduler::{CheckResultSink, NotificationSink, Scheduler};
use test_support::MockCommandRunner;
use tokio::sync::RwLock;

struct CapturingResultSink(Mutex<Vec<i32>>);
impl CheckResultSink for CapturingResultSink {
    fn emit_check_result(&self, _object: &ObjectName, cr: &CheckResult) {
        self.0.lock().unwrap().push(cr.exit_status);
    }
}

struct CapturingNotificationSink(Mutex<Vec<NotificationKind>>);
impl NotificationSink for CapturingNotificationSink {
    fn send_notifications(&self, _object: &ObjectName, kind: NotificationKind) {
        self.0.lock().unwrap().push(kind);
    }
}

fn make_cr(exit_status: i32, t: f64) -> CheckResult {
    CheckResult {
        scheduled_start: t,
        execution_start: t,
        execution_end: t,
        exit_status,
        output: "integration".to_owned(),
        perfdata: vec![],
        schedule_end: t,
        command_name: "check_http".to_owned(),
    }
}

#[tokio::test(start_paused = true)]
async fn service_recovers_after_max_check_attempts_soft_retries() {
    let mut service = Service::new("web1", "http", "check_http");
    service.base.active = true;
    service.base.authority = true;
    service.checkable.max_check_attempts = 3;
    let name = service.base.object_name.clone();

    let mut registry = Registry::new();
    registry.insert(ObjectRef::Service(service));
    let registry = Arc::new(RwLock::new(registry));

    let results = Arc::new(CapturingResultSink(Mutex::new(Vec::new())));
    let notifications = Arc::new(CapturingNotificationSink(Mutex::new(Vec::new())));

    let scheduler = Scheduler::new(
        registry.clone(),
        Arc::new(MockCommandRunner::new()),
        None,
        notifications.clone(),
        results.clone(),
        "master",
    );

    // Two critical checks: soft, then a third commits hard.
    scheduler.apply_result(&name, make_cr(2, 1.0)).await;
    scheduler.apply_result(&name, make_cr(2, 2.0)).await;
    scheduler.apply_result(&name, make_cr(2, 3.0)).await;

    assert_eq!(results.0.lock().unwrap().clone(), vec![2, 2, 2], "every applied result is relayed, not just hard transitions");
    assert_eq!(notifications.0.lock().unwrap().len(), 1, "only the hard transition notifies");
    assert!(matches!(notifications.0.lock().unwrap()[0], NotificationKind::Problem));

    {
        let reg = registry.read().await;
        let is_hard_critical = matches!(
            reg.get(&name),
            Some(ObjectRef::Service(s)) if s.checkable.state_type == object_model::StateType::Hard && s.checkable.current_attempt == 3
        );
        assert!(is_hard_critical);
    }

    scheduler.apply_result(&name, make_cr(0, 4.0)).await;

    assert_eq!(results.0.lock().unwrap().clone(), vec![2, 2, 2, 0]);
    assert_eq!(notifications.0.lock().unwrap().len(), 2, "recovery fires exactly one more notification");
    assert!(matches!(notifications.0.lock().unwrap()[1], NotificationKind::Recovery));

    let reg = registry.read().await;
    let recovered = matches!(
        reg.get(&name),
        Some(ObjectRef::Service(s)) if s.checkable.state == object_model::ServiceState::Ok && s.checkable.current_attempt == 1
    );
    assert!(recovered);
}

#[tokio::test(start_paused = true)]
async fn acknowledged_problem_still_commits_hard_but_suppresses_the_notification() {
    let mut service = Service::new("web2", "http", "check_http");
    service.base.active = true;
    service.base.authority = true;
    service.checkable.max_check_attempts = 1;
    service.checkable.acknowledgement = Some(object_model::Acknowledgement {
        author: "op".to_owned(),
        comment: "known flaky link".to_owned(),
        acktype: object_model::AckType::Normal,
        notify: false,
        expiry: None,
    });
    let name = service.base.object_name.clone();

    let mut registry = Registry::new();
    registry.insert(ObjectRef::Service(service));
    let registry = Arc::new(RwLock::new(registry));

    let notifications = Arc::new(CapturingNotificationSink(Mutex::new(Vec::new())));
    let scheduler = Scheduler::new(
        registry,
        Arc::new(MockCommandRunner::new()),
        None,
        notifications.clone(),
        Arc::new(scheduler::NullCheckResultSink),
        "master",
    );

    scheduler.apply_result(&name, make_cr(2, 1.0)).await;
    assert!(notifications.0.lock().unwrap().is_empty(), "an acknowledged problem must not page anyone");
}

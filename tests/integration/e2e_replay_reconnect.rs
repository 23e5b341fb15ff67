//! A peer that's disconnected while events go by catches up on exactly
//! what it missed once it reconnects: `Relay::relay_event` persists to
//! the replay log regardless of delivery, `Relay::catch_up` hands back
//! only what the requesting zone may see, and replaying those records
//! through the normal inbound dispatch path rebuilds the peer's state.

use std::sync::Arc;

use cluster_protocol::{CheckResultParams, Envelope, SecObj, METHOD_CHECK_RESULT};
use cluster_rpc::{FunctionRegistry, RequestContext};
use object_model::{CheckResult, Host, ObjectName, ObjectRef, Registry, Zone, ZoneTree};
use relay::{PeerLink, Relay};
use replay_log::ReplayLog;
use scheduler::{NullNotificationSink, Scheduler};
use test_support::MockCommandRunner;
use tokio::sync::RwLock;

struct AlwaysDisconnected;
impl PeerLink for AlwaysDisconnected {
    fn is_connected(&self, _endpoint: &str) -> bool {
        false
    }
    fn send_to(&self, _endpoint: &str, _payload: Vec<u8>) {}
}

fn zones(local: &str) -> ZoneTree {
    ZoneTree::build(
        vec![
            Zone::new("master", None, vec!["master1".to_owned()]),
            Zone::new("satellite", Some("master".to_owned()), vec!["sat1".to_owned()]),
        ],
        local,
    )
    .unwrap()
}

fn cr(exit_status: i32, t: f64) -> CheckResult {
    CheckResult {
        scheduled_start: t,
        execution_start: t,
        execution_end: t,
        exit_status,
        output: "integration".to_owned(),
        perfdata: vec![],
        schedule_end: t,
        command_name: "hostalive".to_owned(),
    }
}

#[tokio::test]
async fn a_reconnecting_peer_catches_up_on_everything_it_missed() {
    let master_dir = tempfile::tempdir().unwrap();
    let mut master_registry = Registry::new();
    let mut master_host = Host::new("web1", "10.0.0.1", "hostalive");
    master_host.base.activate();
    master_host.base.home_zone = Some("satellite".to_owned());
    master_registry.insert(ObjectRef::Host(master_host));

    let master_replay_log = Arc::new(ReplayLog::open(master_dir.path()).await.unwrap());
    let master_relay = Relay::new(
        Arc::new(RwLock::new(master_registry)),
        Arc::new(zones("master")),
        "master1",
        master_replay_log,
        Arc::new(AlwaysDisconnected),
        Arc::new(MockCommandRunner::new()),
    );

    // sat1 is down while three check results go by.
    for (exit_status, ts) in [(2, 1.0), (2, 2.0), (0, 3.0)] {
        let params = CheckResultParams { host: "web1".to_owned(), service: None, cr: relay::convert::check_result_to_wire(&cr(exit_status, ts)) };
        let envelope = Envelope::notification(METHOD_CHECK_RESULT, &params, ts);
        let secobj = Some(SecObj { object_type: "Host".to_owned(), name: "web1".to_owned() });
        let outcome = master_relay.relay_event("satellite", secobj, &envelope).await.unwrap();
        assert!(outcome.delivered.is_empty(), "sat1 is down, nothing should be marked delivered");
        assert_eq!(outcome.deferred, vec!["sat1".to_owned()]);
    }

    // sat1 reconnects and asks what it missed since the beginning of time.
    let missed = master_relay.catch_up("satellite", 0.0).await.unwrap();
    assert_eq!(missed.len(), 3, "all three deferred check results must still be in the replay log");

    // Replay them through sat1's own inbound dispatch path, the same way
    // cluster-rpc hands a live peer's messages to the relay.
    let sat_dir = tempfile::tempdir().unwrap();
    let mut sat_registry = Registry::new();
    let mut sat_host = Host::new("web1", "10.0.0.1", "hostalive");
    sat_host.base.activate();
    sat_host.base.authority = true;
    sat_host.checkable.max_check_attempts = 2;
    sat_registry.insert(ObjectRef::Host(sat_host));
    let sat_registry = Arc::new(RwLock::new(sat_registry));

    let sat_replay_log = Arc::new(ReplayLog::open(sat_dir.path()).await.unwrap());
    let sat_relay = Relay::new(
        sat_registry.clone(),
        Arc::new(zones("satellite")),
        "sat1",
        sat_replay_log,
        Arc::new(AlwaysDisconnected),
        Arc::new(MockCommandRunner::new()),
    );
    let sat_scheduler = Scheduler::new(
        sat_registry.clone(),
        Arc::new(MockCommandRunner::new()),
        None,
        Arc::new(NullNotificationSink),
        Arc::new(scheduler::NullCheckResultSink),
        "satellite",
    );
    sat_relay.attach_scheduler(sat_scheduler).await;

    let mut function_registry = FunctionRegistry::new();
    sat_relay.register_handlers(&mut function_registry);

    for record in &missed {
        let envelope: Envelope = serde_json::from_str(&record.message).unwrap();
        let ctx = RequestContext { peer_endpoint: "master1".to_owned(), origin_zone: envelope.origin_zone.clone(), ts: envelope.ts };
        function_registry.dispatch(&envelope.method, envelope.params.clone(), &ctx).await.unwrap();
    }

    let name = ObjectName::new("Host", "web1");
    let reg = sat_registry.read().await;
    let rebuilt = matches!(reg.get(&name), Some(ObjectRef::Host(h)) if h.checkable.state == object_model::HostState::Up && h.checkable.results.len() == 3);
    assert!(rebuilt, "replaying the three missed results must rebuild the same end state as if sat1 had been connected all along");
}

#[tokio::test]
async fn an_unrelated_zone_cannot_catch_up_on_satellite_only_records() {
    let dir = tempfile::tempdir().unwrap();
    let mut registry = Registry::new();
    let mut host = Host::new("web1", "10.0.0.1", "hostalive");
    host.base.activate();
    host.base.home_zone = Some("satellite".to_owned());
    registry.insert(ObjectRef::Host(host));

    let replay_log = Arc::new(ReplayLog::open(dir.path()).await.unwrap());
    let relay = Relay::new(
        Arc::new(RwLock::new(registry)),
        Arc::new(zones("master")),
        "master1",
        replay_log,
        Arc::new(AlwaysDisconnected),
        Arc::new(MockCommandRunner::new()),
    );

    let params = CheckResultParams { host: "web1".to_owned(), service: None, cr: relay::convert::check_result_to_wire(&cr(0, 1.0)) };
    let envelope = Envelope::notification(METHOD_CHECK_RESULT, &params, 1.0);
    let secobj = Some(SecObj { object_type: "Host".to_owned(), name: "web1".to_owned() });
    relay.relay_event("satellite", secobj, &envelope).await.unwrap();

    let seen_by_satellite = relay.catch_up("satellite", 0.0).await.unwrap();
    assert_eq!(seen_by_satellite.len(), 1);

    let seen_by_stranger = relay.catch_up("another-master", 0.0).await.unwrap();
    assert!(seen_by_stranger.is_empty());
}

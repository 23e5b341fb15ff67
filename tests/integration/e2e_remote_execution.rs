//! A host whose `command_endpoint` points at a satellite gets checked by
//! asking that satellite to run the plugin (`event::ExecuteCommand`)
//! rather than running it locally; the satellite's result comes back as
//! an ordinary `event::CheckResult` and lands in the master's own state
//! machine the same way a local check result would.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use cluster_protocol::Envelope;
use cluster_rpc::{FunctionRegistry, RequestContext};
use object_model::{Host, ObjectName, ObjectRef, Registry, Zone, ZoneTree};
use relay::{PeerLink, Relay};
use replay_log::ReplayLog;
use scheduler::{NullNotificationSink, Scheduler};
use test_support::MockCommandRunner;
use tokio::sync::RwLock;

/// A fake cluster fabric: every node registers its inbound
/// `FunctionRegistry` under its own endpoint name, and `send_to` decodes
/// the envelope and dispatches it on the target as if it had arrived over
/// a real framed connection.
#[derive(Default)]
struct Bus {
    nodes: StdMutex<HashMap<String, Arc<FunctionRegistry>>>,
}

impl Bus {
    fn register(&self, endpoint: &str, registry: Arc<FunctionRegistry>) {
        self.nodes.lock().unwrap().insert(endpoint.to_owned(), registry);
    }
}

struct BusLink {
    bus: Arc<Bus>,
    self_endpoint: String,
}

impl PeerLink for BusLink {
    fn is_connected(&self, endpoint: &str) -> bool {
        self.bus.nodes.lock().unwrap().contains_key(endpoint)
    }

    fn send_to(&self, endpoint: &str, payload: Vec<u8>) {
        let Some(registry) = self.bus.nodes.lock().unwrap().get(endpoint).cloned() else { return };
        let self_endpoint = self.self_endpoint.clone();
        tokio::spawn(async move {
            let envelope: Envelope = match serde_json::from_slice(&payload) {
                Ok(e) => e,
                Err(_) => return,
            };
            let ctx = RequestContext { peer_endpoint: self_endpoint, origin_zone: envelope.origin_zone.clone(), ts: envelope.ts };
            let _ = registry.dispatch(&envelope.method, envelope.params, &ctx).await;
        });
    }
}

fn two_node_zones(local: &str) -> ZoneTree {
    ZoneTree::build(
        vec![Zone::new("master", None, vec!["master1".to_owned(), "sat1".to_owned()])],
        local,
    )
    .unwrap()
}

#[tokio::test]
async fn a_remote_command_endpoint_is_executed_on_its_satellite_and_the_result_lands_locally() {
    let bus = Arc::new(Bus::default());

    let mut master_host = Host::new("web1", "10.0.0.1", "hostalive");
    master_host.base.active = true;
    master_host.base.authority = true;
    master_host.checkable.next_check = 0.0;
    master_host.checkable.check_interval = 3600.0;
    master_host.checkable.command_endpoint = Some("sat1".to_owned());
    let host_name = master_host.base.object_name.clone();

    let mut master_registry = Registry::new();
    master_registry.insert(ObjectRef::Host(master_host));
    let master_registry = Arc::new(RwLock::new(master_registry));

    let master_dir = tempfile::tempdir().unwrap();
    let master_replay_log = Arc::new(ReplayLog::open(master_dir.path()).await.unwrap());
    let master_link = Arc::new(BusLink { bus: bus.clone(), self_endpoint: "master1".to_owned() });
    let master_relay = Relay::new(
        master_registry.clone(),
        Arc::new(two_node_zones("master")),
        "master1",
        master_replay_log,
        master_link,
        Arc::new(MockCommandRunner::new()),
    );
    let mut master_function_registry = FunctionRegistry::new();
    master_relay.register_handlers(&mut master_function_registry);
    bus.register("master1", Arc::new(master_function_registry));

    let master_scheduler = Scheduler::new(
        master_registry.clone(),
        Arc::new(MockCommandRunner::new()),
        Some(master_relay.clone()),
        Arc::new(NullNotificationSink),
        master_relay.clone(),
        "master",
    );
    master_relay.attach_scheduler(master_scheduler.clone()).await;

    // sat1's own side: it has no opinion on web1's check state, it just
    // runs whatever command it's handed and replies.
    let sat_registry = Arc::new(RwLock::new(Registry::new()));
    let sat_dir = tempfile::tempdir().unwrap();
    let sat_replay_log = Arc::new(ReplayLog::open(sat_dir.path()).await.unwrap());
    let sat_link = Arc::new(BusLink { bus: bus.clone(), self_endpoint: "sat1".to_owned() });
    let sat_runner = Arc::new(MockCommandRunner::new());
    sat_runner.push_result(object_model::CheckResult {
        scheduled_start: 0.0,
        execution_start: 0.0,
        execution_end: 0.0,
        exit_status: 0,
        output: "PING OK".to_owned(),
        perfdata: vec![],
        schedule_end: 0.0,
        command_name: "hostalive".to_owned(),
    });
    let sat_relay = Relay::new(sat_registry, Arc::new(two_node_zones("master")), "sat1", sat_replay_log, sat_link, sat_runner.clone());
    let mut sat_function_registry = FunctionRegistry::new();
    sat_relay.register_handlers(&mut sat_function_registry);
    bus.register("sat1", Arc::new(sat_function_registry));

    master_scheduler.prime().await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(sat_runner.calls(), vec!["hostalive".to_owned()], "sat1 must be the one to actually run the plugin");

    let reg = master_registry.read().await;
    let applied = matches!(
        reg.get(&host_name),
        Some(ObjectRef::Host(h)) if h.checkable.state == object_model::HostState::Up && h.checkable.results.len() == 1
    );
    assert!(applied, "the remote result must come back and apply to web1's state on master, not sat1");
}

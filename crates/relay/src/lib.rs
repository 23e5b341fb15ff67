//! The event relay (spec §4.H): the work queue every locally produced
//! event passes through on its way to peers, and the landing point for
//! every inbound `event::*` call this node accepts from a peer.
//!
//! `relay` is the one crate that knows about every other piece: the
//! object model (to mutate checkables and resolve zones), the wire
//! protocol (to (de)serialize envelopes), cluster-rpc (to register its
//! handlers), the replay log (to persist what it relays) and the
//! scheduler (to feed `event::CheckResult` back into the state machine
//! and to satisfy `RemoteCommandSink`). Nothing depends on `relay` in
//! turn, which is what keeps the lower crates testable in isolation.

pub mod convert;
pub mod error;
pub mod routing;

use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use cluster_protocol::{
    AckType as WireAckType, ClearAcknowledgementParams, Envelope, ExecuteCommandParams, NotificationType, SecObj,
    SendNotificationsParams, SetAcknowledgementParams, SetForceNextCheckParams, SetLogPositionParams, SetNextCheckParams,
    METHOD_CHECK_RESULT, METHOD_CLEAR_ACKNOWLEDGEMENT, METHOD_EXECUTE_COMMAND, METHOD_SEND_NOTIFICATIONS, METHOD_SET_ACKNOWLEDGEMENT,
    METHOD_SET_FORCE_NEXT_CHECK, METHOD_SET_LOG_POSITION, METHOD_SET_NEXT_CHECK,
};
use cluster_protocol::{CheckResultParams, CommandType, ReplayRecord};
use cluster_rpc::{ApiFunction, FunctionRegistry, RequestContext, RpcError};
use object_model::{AckType as ObjectAckType, Acknowledgement, CheckResult, NotificationKind, ObjectName, ObjectRef, Registry, ZoneTree};
use replay_log::ReplayLog;
use scheduler::{CheckResultSink, CommandRunner, NotificationSink, RemoteCommandSink, Scheduler};
use serde_json::Value;
use tokio::sync::RwLock;

pub use error::RelayError;

fn now() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
}

/// How often the steady-state `log::SetLogPosition` echo goes out to
/// every connected peer (spec §4.I point 4, "every ~10s").
const LOG_POSITION_INTERVAL: Duration = Duration::from_secs(10);

/// Drives the periodic `log::SetLogPosition` echo for as long as `relay`
/// is alive. Holding only a `Weak` means this task exits on its own once
/// the relay (and the process around it) is torn down.
async fn log_position_ticker(relay: Weak<Relay>) {
    let mut interval = tokio::time::interval(LOG_POSITION_INTERVAL);
    interval.tick().await; // first tick fires immediately; skip it
    loop {
        interval.tick().await;
        let Some(relay) = relay.upgrade() else { return };
        relay.broadcast_log_position().await;
    }
}

fn resolve_name(host: &str, service: Option<&str>) -> ObjectName {
    match service {
        Some(svc) => ObjectName::new("Service", svc),
        None => ObjectName::new("Host", host),
    }
}

fn ack_type_from_wire(t: WireAckType) -> ObjectAckType {
    match t {
        WireAckType::None => ObjectAckType::None,
        WireAckType::Normal => ObjectAckType::Normal,
        WireAckType::Sticky => ObjectAckType::Sticky,
    }
}

/// Where the relay hands outbound wire bytes for a specific connected
/// peer. Implemented by whatever owns the live `PeerConnection`s (the
/// root binary's connection manager); fire-and-forget, matching
/// `RemoteCommandSink`'s no-reply-path shape.
pub trait PeerLink: Send + Sync {
    fn is_connected(&self, endpoint: &str) -> bool;
    fn send_to(&self, endpoint: &str, payload: Vec<u8>);
}

/// What happened when an event was handed to the relay: who it reached
/// directly and who it couldn't (left for the replay log to deliver on
/// reconnect).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayOutcome {
    pub delivered: Vec<String>,
    pub deferred: Vec<String>,
}

pub struct Relay {
    registry: Arc<RwLock<Registry>>,
    zones: Arc<ZoneTree>,
    local_zone: String,
    local_endpoint: String,
    replay_log: Arc<ReplayLog>,
    peer_link: Arc<dyn PeerLink>,
    command_runner: Arc<dyn CommandRunner>,
    scheduler: tokio::sync::OnceCell<Arc<Scheduler>>,
    self_weak: Weak<Relay>,
}

impl Relay {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<RwLock<Registry>>,
        zones: Arc<ZoneTree>,
        local_endpoint: impl Into<String>,
        replay_log: Arc<ReplayLog>,
        peer_link: Arc<dyn PeerLink>,
        command_runner: Arc<dyn CommandRunner>,
    ) -> Arc<Self> {
        let local_zone = zones.local_zone().to_owned();
        Arc::new_cyclic(|weak| {
            tokio::spawn(log_position_ticker(weak.clone()));
            Relay {
                registry,
                local_zone,
                local_endpoint: local_endpoint.into(),
                zones,
                replay_log,
                peer_link,
                command_runner,
                scheduler: tokio::sync::OnceCell::new(),
                self_weak: weak.clone(),
            }
        })
    }

    /// Breaks the `Relay <-> Scheduler` construction cycle: the
    /// scheduler needs an `Arc<dyn CheckResultSink>` (this relay) at
    /// construction time, and the relay needs the finished
    /// `Arc<Scheduler>` to hand inbound `event::CheckResult`s to. Wired
    /// once by the process's startup sequence.
    pub async fn attach_scheduler(&self, scheduler: Arc<Scheduler>) {
        let _ = self.scheduler.set(scheduler);
    }

    async fn object_zone(&self, name: &ObjectName) -> String {
        let reg = self.registry.read().await;
        reg.get(name).and_then(|o| o.base().home_zone.clone()).unwrap_or_else(|| self.local_zone.clone())
    }

    /// `(host, service)` pair for the wire params, resolving a `Service`
    /// object's owning host rather than assuming the object's own name is
    /// the host name (mirrors `scheduler::split_host_service`).
    async fn resolve_host_service(&self, name: &ObjectName) -> (String, Option<String>) {
        let reg = self.registry.read().await;
        match reg.get(name) {
            Some(ObjectRef::Host(h)) => (h.name().to_owned(), None),
            Some(ObjectRef::Service(s)) => (s.host_name.clone(), Some(s.name().to_owned())),
            _ => (name.name.clone(), None),
        }
    }

    /// Core routing + delivery + durability step (spec §4.H). Computes
    /// the destination endpoint set, sends to whichever are connected,
    /// and always appends the event to the replay log.
    pub async fn relay_event(&self, target_zone: &str, secobj: Option<SecObj>, envelope: &Envelope) -> Result<RelayOutcome, RelayError> {
        let destinations = routing::destination_endpoints(&self.zones, target_zone, &self.local_endpoint);
        let destinations = routing::without_origin_zone(&self.zones, destinations, envelope.origin_zone.as_deref());

        let payload = serde_json::to_vec(envelope)?;
        let mut outcome = RelayOutcome::default();
        for endpoint in destinations {
            if self.peer_link.is_connected(&endpoint) {
                self.peer_link.send_to(&endpoint, payload.clone());
                outcome.delivered.push(endpoint);
            } else {
                outcome.deferred.push(endpoint);
            }
        }
        self.advance_local_log_position_for(&outcome.delivered, envelope.ts).await;
        self.advance_local_log_position_for(&outcome.deferred, envelope.ts).await;

        let message = serde_json::to_string(envelope)?;
        self.replay_log.append(&ReplayRecord { timestamp: envelope.ts, message, secobj }).await?;

        Ok(outcome)
    }

    /// Records a peer's catch-up request (spec §4.I): every record since
    /// `since` whose `secobj` (if any) the requester's zone is entitled
    /// to see per `Zone.CanAccessObject`.
    pub async fn catch_up(&self, requester_zone: &str, since: f64) -> Result<Vec<ReplayRecord>, RelayError> {
        let reg = self.registry.read().await;
        let zones = self.zones.clone();
        let registry_snapshot = reg.clone();
        drop(reg);
        let records = self
            .replay_log
            .catch_up(since, move |record| match &record.secobj {
                None => true,
                Some(secobj) => {
                    let object_zone = registry_snapshot
                        .get(&ObjectName::new(secobj.object_type.clone(), secobj.name.clone()))
                        .and_then(|o| o.base().home_zone.clone())
                        .unwrap_or_else(|| zones.local_zone().to_owned());
                    zones.can_access_object(requester_zone, &object_zone)
                }
            })
            .await?;
        Ok(records)
    }

    /// Records our own progress relaying (or deferring) an event to each
    /// of `endpoints` — spec §4.H point 3, "record only the
    /// `local_log_position` advance" for the ones we couldn't reach now.
    async fn advance_local_log_position_for(&self, endpoints: &[String], ts: f64) {
        if endpoints.is_empty() {
            return;
        }
        let mut reg = self.registry.write().await;
        for endpoint in endpoints {
            if let Some(ObjectRef::Endpoint(e)) = reg.get_mut(&ObjectName::new("Endpoint", endpoint.clone())) {
                e.advance_local_log_position(ts);
            }
        }
    }

    /// `log::SetLogPosition` sent by a connected peer to durably record
    /// what it's persisted of us (spec §4.I point 4: "P echoes
    /// SetLogPosition back when it has persisted us").
    async fn handle_set_log_position(&self, params: SetLogPositionParams, ctx: &RequestContext) -> Result<(), RelayError> {
        let mut reg = self.registry.write().await;
        if let Some(ObjectRef::Endpoint(e)) = reg.get_mut(&ObjectName::new("Endpoint", ctx.peer_endpoint.clone())) {
            e.advance_remote_log_position(params.log_position);
        }
        Ok(())
    }

    /// Sends every connected peer a `log::SetLogPosition` carrying our own
    /// `local_log_position` for it — the periodic steady-state echo, not
    /// just the one sent during an active catch-up.
    async fn broadcast_log_position(&self) {
        let endpoints: Vec<String> = self.zones.iter().flat_map(|z| z.endpoints.iter().cloned()).collect();
        for endpoint in endpoints {
            if endpoint == self.local_endpoint || !self.peer_link.is_connected(&endpoint) {
                continue;
            }
            let position = {
                let reg = self.registry.read().await;
                match reg.get(&ObjectName::new("Endpoint", endpoint.clone())) {
                    Some(ObjectRef::Endpoint(e)) => e.local_log_position,
                    _ => continue,
                }
            };
            let envelope = Envelope::notification(METHOD_SET_LOG_POSITION, &SetLogPositionParams { log_position: position }, now());
            if let Ok(payload) = serde_json::to_vec(&envelope) {
                self.peer_link.send_to(&endpoint, payload);
            }
        }
    }

    /// Looks up `peer_endpoint`'s last-acknowledged cursor and hands back
    /// everything since then that its zone is entitled to see — the
    /// reconnect catch-up flow (spec §4.I), driven by whoever owns the
    /// live connection once it comes up.
    pub async fn catch_up_endpoint(&self, peer_endpoint: &str) -> Result<Vec<ReplayRecord>, RelayError> {
        let since = {
            let reg = self.registry.read().await;
            match reg.get(&ObjectName::new("Endpoint", peer_endpoint)) {
                Some(ObjectRef::Endpoint(e)) => e.remote_log_position,
                _ => 0.0,
            }
        };
        let zone = routing::endpoint_zone(&self.zones, peer_endpoint).unwrap_or(&self.local_zone).to_owned();
        self.catch_up(&zone, since).await
    }

    async fn reforward(&self, name: &ObjectName, method: &str, params: Value, ctx: &RequestContext) -> Result<(), RelayError> {
        let target_zone = self.object_zone(name).await;
        let mut envelope = Envelope::notification(method, &params, ctx.ts);
        envelope.origin_zone = ctx.origin_zone.clone();
        let secobj = Some(SecObj { object_type: name.object_type.clone(), name: name.name.clone() });
        self.relay_event(&target_zone, secobj, &envelope).await?;
        Ok(())
    }

    async fn handle_check_result(&self, params: CheckResultParams, ctx: &RequestContext) -> Result<(), RelayError> {
        let name = resolve_name(&params.host, params.service.as_deref());
        let cr = convert::check_result_from_wire(&params.cr);
        if let Some(scheduler) = self.scheduler.get() {
            scheduler.apply_result(&name, cr).await;
        }
        let value = serde_json::to_value(&params)?;
        self.reforward(&name, METHOD_CHECK_RESULT, value, ctx).await
    }

    async fn handle_execute_command(&self, params: ExecuteCommandParams, ctx: &RequestContext) -> Result<(), RelayError> {
        let cr = self.command_runner.run(&params.command, now(), scheduler::DEFAULT_COMMAND_TIMEOUT).await;
        let reply = CheckResultParams {
            host: params.host.clone(),
            service: params.service.clone(),
            cr: convert::check_result_to_wire(&cr),
        };
        let mut envelope = Envelope::notification(METHOD_CHECK_RESULT, &reply, now());
        envelope.origin_zone = Some(self.local_zone.clone());
        let payload = serde_json::to_vec(&envelope)?;
        // This is a direct point-to-point reply to whoever asked us to
        // run the check, not a zone broadcast.
        self.peer_link.send_to(&ctx.peer_endpoint, payload);

        let message = serde_json::to_string(&envelope)?;
        let name = resolve_name(&params.host, params.service.as_deref());
        let secobj = Some(SecObj { object_type: name.object_type, name: name.name });
        self.replay_log.append(&ReplayRecord { timestamp: envelope.ts, message, secobj }).await?;
        Ok(())
    }

    async fn handle_set_next_check(&self, params: SetNextCheckParams, ctx: &RequestContext) -> Result<(), RelayError> {
        let name = resolve_name(&params.host, params.service.as_deref());
        {
            let mut reg = self.registry.write().await;
            match reg.get_mut(&name) {
                Some(ObjectRef::Host(h)) => h.checkable.next_check = params.next_check,
                Some(ObjectRef::Service(s)) => s.checkable.next_check = params.next_check,
                _ => {}
            }
        }
        let value = serde_json::to_value(&params)?;
        self.reforward(&name, METHOD_SET_NEXT_CHECK, value, ctx).await
    }

    async fn handle_set_force_next_check(&self, params: SetForceNextCheckParams, ctx: &RequestContext) -> Result<(), RelayError> {
        let name = resolve_name(&params.host, params.service.as_deref());
        {
            let mut reg = self.registry.write().await;
            match reg.get_mut(&name) {
                Some(ObjectRef::Host(h)) => h.checkable.force_next_check = params.forced,
                Some(ObjectRef::Service(s)) => s.checkable.force_next_check = params.forced,
                _ => {}
            }
        }
        let value = serde_json::to_value(&params)?;
        self.reforward(&name, METHOD_SET_FORCE_NEXT_CHECK, value, ctx).await
    }

    async fn handle_set_acknowledgement(&self, params: SetAcknowledgementParams, ctx: &RequestContext) -> Result<(), RelayError> {
        let name = resolve_name(&params.host, params.service.as_deref());
        let ack = Acknowledgement {
            author: params.author.clone(),
            comment: params.comment.clone(),
            acktype: ack_type_from_wire(params.acktype),
            notify: params.notify,
            expiry: params.expiry,
        };
        {
            let mut reg = self.registry.write().await;
            match reg.get_mut(&name) {
                Some(ObjectRef::Host(h)) => h.checkable.acknowledgement = Some(ack),
                Some(ObjectRef::Service(s)) => s.checkable.acknowledgement = Some(ack),
                _ => {}
            }
        }
        let value = serde_json::to_value(&params)?;
        self.reforward(&name, METHOD_SET_ACKNOWLEDGEMENT, value, ctx).await
    }

    async fn handle_clear_acknowledgement(&self, params: ClearAcknowledgementParams, ctx: &RequestContext) -> Result<(), RelayError> {
        let name = resolve_name(&params.host, params.service.as_deref());
        {
            let mut reg = self.registry.write().await;
            match reg.get_mut(&name) {
                Some(ObjectRef::Host(h)) => h.checkable.acknowledgement = None,
                Some(ObjectRef::Service(s)) => s.checkable.acknowledgement = None,
                _ => {}
            }
        }
        let value = serde_json::to_value(&params)?;
        self.reforward(&name, METHOD_CLEAR_ACKNOWLEDGEMENT, value, ctx).await
    }

    /// Registers every `event::*` handler this node accepts from a peer
    /// (spec §4.D/§4.H) onto a `cluster-rpc` function registry.
    pub fn register_handlers(self: &Arc<Self>, registry: &mut FunctionRegistry) {
        registry.register(METHOD_CHECK_RESULT, Arc::new(CheckResultHandler(self.clone())));
        registry.register(METHOD_EXECUTE_COMMAND, Arc::new(ExecuteCommandHandler(self.clone())));
        registry.register(METHOD_SET_NEXT_CHECK, Arc::new(SetNextCheckHandler(self.clone())));
        registry.register(METHOD_SET_FORCE_NEXT_CHECK, Arc::new(SetForceNextCheckHandler(self.clone())));
        registry.register(METHOD_SET_ACKNOWLEDGEMENT, Arc::new(SetAcknowledgementHandler(self.clone())));
        registry.register(METHOD_CLEAR_ACKNOWLEDGEMENT, Arc::new(ClearAcknowledgementHandler(self.clone())));
        registry.register(METHOD_SET_LOG_POSITION, Arc::new(SetLogPositionHandler(self.clone())));
    }
}

macro_rules! handler {
    ($name:ident, $params:ty, $method:expr, $handle:ident) => {
        struct $name(Arc<Relay>);
        #[async_trait]
        impl ApiFunction for $name {
            async fn call(&self, params: Value, ctx: &RequestContext) -> Result<(), RpcError> {
                let parsed: $params = serde_json::from_value(params)?;
                self.0.$handle(parsed, ctx).await.map_err(|e| RpcError::BadParams { method: $method.to_owned(), reason: e.to_string() })
            }
        }
    };
}

handler!(CheckResultHandler, CheckResultParams, METHOD_CHECK_RESULT, handle_check_result);
handler!(ExecuteCommandHandler, ExecuteCommandParams, METHOD_EXECUTE_COMMAND, handle_execute_command);
handler!(SetNextCheckHandler, SetNextCheckParams, METHOD_SET_NEXT_CHECK, handle_set_next_check);
handler!(SetForceNextCheckHandler, SetForceNextCheckParams, METHOD_SET_FORCE_NEXT_CHECK, handle_set_force_next_check);
handler!(SetAcknowledgementHandler, SetAcknowledgementParams, METHOD_SET_ACKNOWLEDGEMENT, handle_set_acknowledgement);
handler!(ClearAcknowledgementHandler, ClearAcknowledgementParams, METHOD_CLEAR_ACKNOWLEDGEMENT, handle_clear_acknowledgement);
handler!(SetLogPositionHandler, SetLogPositionParams, METHOD_SET_LOG_POSITION, handle_set_log_position);

// ---------------------------------------------------------------------------
// Scheduler collaborator traits: the relay is how locally produced events
// actually leave the process.
// ---------------------------------------------------------------------------

impl CheckResultSink for Relay {
    fn emit_check_result(&self, object: &ObjectName, cr: &CheckResult) {
        let Some(relay) = self.self_weak.upgrade() else { return };
        let object = object.clone();
        let cr = cr.clone();
        tokio::spawn(async move {
            let target_zone = relay.object_zone(&object).await;
            let (host, service) = relay.resolve_host_service(&object).await;
            let params = CheckResultParams { host, service, cr: convert::check_result_to_wire(&cr) };
            let Ok(value) = serde_json::to_value(&params) else { return };
            let mut envelope = Envelope::notification(METHOD_CHECK_RESULT, &value, cr.execution_end);
            envelope.origin_zone = Some(relay.local_zone.clone());
            let secobj = Some(SecObj { object_type: object.object_type.clone(), name: object.name.clone() });
            if let Err(e) = relay.relay_event(&target_zone, secobj, &envelope).await {
                tracing::warn!(object = %object, error = %e, "failed to relay check result");
            }
        });
    }
}

impl NotificationSink for Relay {
    fn send_notifications(&self, object: &ObjectName, kind: NotificationKind) {
        let Some(relay) = self.self_weak.upgrade() else { return };
        let object = object.clone();
        tokio::spawn(async move {
            let target_zone = relay.object_zone(&object).await;
            let (host, service) = relay.resolve_host_service(&object).await;
            let notification_type = match kind {
                NotificationKind::Problem => NotificationType::Problem,
                NotificationKind::Recovery => NotificationType::Recovery,
            };
            let params = SendNotificationsParams { host, service, notification_type, cr: None, author: None, text: None };
            let Ok(value) = serde_json::to_value(&params) else { return };
            let mut envelope = Envelope::notification(METHOD_SEND_NOTIFICATIONS, &value, now());
            envelope.origin_zone = Some(relay.local_zone.clone());
            let secobj = Some(SecObj { object_type: object.object_type.clone(), name: object.name.clone() });
            if let Err(e) = relay.relay_event(&target_zone, secobj, &envelope).await {
                tracing::warn!(object = %object, error = %e, "failed to relay notification request");
            }
        });
    }
}

impl RemoteCommandSink for Relay {
    fn execute_remote(&self, endpoint: &str, host: &str, service: Option<&str>, command: &str, macros: serde_json::Map<String, Value>) {
        let Some(relay) = self.self_weak.upgrade() else { return };
        let endpoint = endpoint.to_owned();
        let host = host.to_owned();
        let service = service.map(str::to_owned);
        let command = command.to_owned();
        tokio::spawn(async move {
            let params = ExecuteCommandParams { host, service, command_type: CommandType::Check, command, macros };
            let envelope = Envelope::notification(METHOD_EXECUTE_COMMAND, &params, now());
            let Ok(payload) = serde_json::to_vec(&envelope) else { return };
            relay.peer_link.send_to(&endpoint, payload);
        });
    }
}

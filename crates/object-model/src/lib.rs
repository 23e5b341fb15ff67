//! The Icinga2 config object model (spec §3): `Checkable`-derived types,
//! cluster topology objects, and the auxiliary records attached to them.

pub mod attr;
pub mod check_result;
pub mod checkable;
pub mod comment;
pub mod config_object;
pub mod downtime;
pub mod endpoint;
pub mod host;
pub mod ring;
pub mod service;
pub mod zone;

pub use attr::Attr;
pub use check_result::{CheckResult, HostState, PerfdataUnit, PerfdataValue, ServiceState};
pub use checkable::{AckType, Acknowledgement, CheckState, CheckableCore, NotificationKind, NotificationRequest, ProcessOutcome, StateType};
pub use comment::Comment;
pub use config_object::{ConfigObjectBase, HaMode, ObjectName};
pub use downtime::Downtime;
pub use endpoint::Endpoint;
pub use host::Host;
pub use ring::CheckResultRing;
pub use service::Service;
pub use zone::{Zone, ZoneTree, ZoneTreeError, MAX_ZONE_DEPTH};

use std::collections::HashMap;

/// A tagged union over every `ConfigObject` kind, for code that needs to
/// operate on "any object" generically — authority election and the
/// relay's routing/ACL filtering both do (see `config_object` module doc).
#[derive(Debug, Clone)]
pub enum ObjectRef {
    Host(Host),
    Service(Service),
    Endpoint(Endpoint),
    Zone(Zone),
}

impl ObjectRef {
    pub fn base(&self) -> &ConfigObjectBase {
        match self {
            ObjectRef::Host(h) => &h.base,
            ObjectRef::Service(s) => &s.base,
            ObjectRef::Endpoint(e) => &e.base,
            ObjectRef::Zone(z) => &z.base,
        }
    }

    pub fn base_mut(&mut self) -> &mut ConfigObjectBase {
        match self {
            ObjectRef::Host(h) => &mut h.base,
            ObjectRef::Service(s) => &mut s.base,
            ObjectRef::Endpoint(e) => &mut e.base,
            ObjectRef::Zone(z) => &mut z.base,
        }
    }

    pub fn object_name(&self) -> &ObjectName {
        &self.base().object_name
    }
}

/// By-name lookup of every config object, the in-memory analogue of the
/// original's `ConfigObject::GetObjectsByType` registry.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    objects: HashMap<ObjectName, ObjectRef>,
}

impl Registry {
    pub fn new() -> Self {
        Registry { objects: HashMap::new() }
    }

    pub fn insert(&mut self, object: ObjectRef) {
        let name = object.object_name().clone();
        self.objects.insert(name, object);
    }

    pub fn get(&self, name: &ObjectName) -> Option<&ObjectRef> {
        self.objects.get(name)
    }

    pub fn get_mut(&mut self, name: &ObjectName) -> Option<&mut ObjectRef> {
        self.objects.get_mut(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObjectRef> {
        self.objects.values()
    }

    /// Objects eligible for authority election: `RunOnOnce` and active
    /// (spec §4.F, "only HARunOnce + active objects get authority
    /// computed").
    pub fn run_on_once_active(&self) -> impl Iterator<Item = &ObjectRef> {
        self.objects
            .values()
            .filter(|o| o.base().ha_mode == HaMode::RunOnOnce && o.base().active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_round_trips_objects_by_name() {
        let mut reg = Registry::new();
        let host = Host::new("web1", "10.0.0.1", "hostalive");
        let name = host.base.object_name.clone();
        reg.insert(ObjectRef::Host(host));
        assert!(reg.get(&name).is_some());
        assert_eq!(reg.iter().count(), 1);
    }

    #[test]
    fn run_on_once_active_filters_out_paused_and_run_on_all() {
        let mut reg = Registry::new();
        let mut host = Host::new("web1", "10.0.0.1", "hostalive");
        host.base.activate();
        reg.insert(ObjectRef::Host(host));

        let endpoint = Endpoint::new("master1"); // RunOnAll
        reg.insert(ObjectRef::Endpoint(endpoint));

        let mut inactive_svc = Service::new("web1", "http", "check_http");
        inactive_svc.base.authority = true; // would be eligible if active
        reg.insert(ObjectRef::Service(inactive_svc));

        assert_eq!(reg.run_on_once_active().count(), 1);
    }
}

//! `Service` config object (spec §3): a check attached to a `Host`.

use crate::check_result::ServiceState;
use crate::checkable::CheckableCore;
use crate::config_object::{ConfigObjectBase, HaMode, ObjectName};

#[derive(Debug, Clone)]
pub struct Service {
    pub base: ConfigObjectBase,
    pub checkable: CheckableCore<ServiceState>,
    pub host_name: String,
}

impl Service {
    pub fn new(host_name: impl Into<String>, name: impl Into<String>, check_command: impl Into<String>) -> Self {
        let name = name.into();
        Service {
            base: ConfigObjectBase::new(ObjectName::new("Service", name), HaMode::RunOnOnce),
            checkable: CheckableCore::new(check_command, ServiceState::Ok, 60.0, 60.0, 3),
            host_name: host_name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.base.object_name.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_service_starts_ok_and_unauthoritative() {
        let svc = Service::new("web1", "http", "check_http");
        assert_eq!(svc.checkable.state, ServiceState::Ok);
        assert!(svc.base.paused());
        assert_eq!(svc.host_name, "web1");
        assert_eq!(svc.name(), "http");
    }
}

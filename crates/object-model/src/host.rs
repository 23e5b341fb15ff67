//! `Host` config object (spec §3).

use crate::check_result::HostState;
use crate::checkable::CheckableCore;
use crate::config_object::{ConfigObjectBase, HaMode, ObjectName};

#[derive(Debug, Clone)]
pub struct Host {
    pub base: ConfigObjectBase,
    pub checkable: CheckableCore<HostState>,
    pub address: String,
}

impl Host {
    pub fn new(name: impl Into<String>, address: impl Into<String>, check_command: impl Into<String>) -> Self {
        let name = name.into();
        Host {
            base: ConfigObjectBase::new(ObjectName::new("Host", name), HaMode::RunOnOnce),
            checkable: CheckableCore::new(check_command, HostState::Up, 60.0, 60.0, 3),
            address: address.into(),
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
    fn new_host_starts_up_and_unauthoritative() {
        let host = Host::new("web1", "10.0.0.1", "hostalive");
        assert_eq!(host.checkable.state, HostState::Up);
        assert!(host.base.paused());
        assert_eq!(host.name(), "web1");
    }
}

//! Remote execution hand-off (spec §4.G "Remote execution"): when a
//! checkable's `command_endpoint` is set, the scheduler doesn't run the
//! plugin itself — it asks `relay` to forward `event::ExecuteCommand` to
//! that endpoint and waits for the matching `event::CheckResult` to come
//! back through the normal cluster-rpc inbound path.

pub trait RemoteCommandSink: Send + Sync {
    fn execute_remote(&self, endpoint: &str, host: &str, service: Option<&str>, command: &str, macros: serde_json::Map<String, serde_json::Value>);
}

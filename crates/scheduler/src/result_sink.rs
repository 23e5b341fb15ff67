//! Where a freshly processed `CheckResult` goes after the state machine
//! has applied it (spec §4.G: "emits an `event::CheckResult` onto the
//! relay"). Unlike `NotificationSink`, this fires on every result, not
//! just hard transitions.

use object_model::{CheckResult, ObjectName};

pub trait CheckResultSink: Send + Sync {
    fn emit_check_result(&self, object: &ObjectName, cr: &CheckResult);
}

/// A sink that drops every result — useful for tests and for nodes that
/// don't run the relay component at all.
pub struct NullCheckResultSink;

impl CheckResultSink for NullCheckResultSink {
    fn emit_check_result(&self, _object: &ObjectName, _cr: &CheckResult) {}
}

//! Where a hard state transition's notification request goes (spec §4.G:
//! "if hard state change occurred, emits SendNotifications"). Kept as a
//! trait so `scheduler` doesn't need to depend on `relay` or
//! `cluster-protocol` just to hand off an event.

use object_model::{NotificationKind, ObjectName};

pub trait NotificationSink: Send + Sync {
    fn send_notifications(&self, object: &ObjectName, kind: NotificationKind);
}

/// A sink that drops every request — useful for tests and for nodes that
/// don't run the notification component at all.
pub struct NullNotificationSink;

impl NotificationSink for NullNotificationSink {
    fn send_notifications(&self, _object: &ObjectName, _kind: NotificationKind) {}
}

//! Wire types for the cluster JSON-RPC protocol (spec §6).
//!
//! This crate only knows about *serialization*: the envelope shape, the
//! `method` namespace, and the params payload for every method an
//! implementer must support. It has no dependency on `object-model` —
//! `WireCheckResult` and friends are plain serde structs; the object model
//! converts to/from them at the relay boundary.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The on-wire JSON-RPC 2.0 subset envelope (spec §6).
///
/// `id` is only present for the handful of request/response control calls;
/// the common cluster-event path uses notifications (no `id`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub jsonrpc: JsonRpcVersion,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    pub params: serde_json::Value,
    pub ts: f64,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "originZone")]
    pub origin_zone: Option<String>,
}

/// Always `"2.0"`, but kept as a type so a garbage value fails to
/// deserialize rather than silently being accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsonRpcVersion;

impl serde::Serialize for JsonRpcVersion {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str("2.0")
    }
}

impl<'de> serde::Deserialize<'de> for JsonRpcVersion {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        use serde::de::Error as _;
        let s = String::deserialize(d)?;
        if s == "2.0" {
            Ok(JsonRpcVersion)
        } else {
            Err(D::Error::custom(format!("unsupported jsonrpc version {s}")))
        }
    }
}

impl Envelope {
    pub fn notification(method: impl Into<String>, params: impl Serialize, ts: f64) -> Self {
        Envelope {
            jsonrpc: JsonRpcVersion,
            method: method.into(),
            id: None,
            params: serde_json::to_value(params).expect("params must serialize"),
            ts,
            origin_zone: None,
        }
    }

    #[must_use]
    pub fn with_origin_zone(mut self, zone: impl Into<String>) -> Self {
        self.origin_zone = Some(zone.into());
        self
    }

    pub fn decode_params<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.params.clone())
    }
}

// ---------------------------------------------------------------------------
// `icinga::Hello`
// ---------------------------------------------------------------------------

pub const METHOD_HELLO: &str = "icinga::Hello";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HelloParams {
    /// Advisory protocol/version string; logged, never enforced (spec
    /// doesn't ask for version gating, only for the exchange to happen).
    #[serde(default)]
    pub version: String,
}

// ---------------------------------------------------------------------------
// `event::CheckResult`
// ---------------------------------------------------------------------------

pub const METHOD_CHECK_RESULT: &str = "event::CheckResult";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerfdataUnit {
    Seconds,
    Bytes,
    Percent,
    Counter,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WirePerfdataValue {
    pub label: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<PerfdataUnit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warn: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireCheckResult {
    pub scheduled_start: f64,
    pub execution_start: f64,
    pub execution_end: f64,
    /// 0..=3 for services (ok/warning/critical/unknown), 0|1 for hosts (up/down).
    pub exit_status: i32,
    pub output: String,
    #[serde(default)]
    pub perfdata: Vec<WirePerfdataValue>,
    pub schedule_end: f64,
    pub command_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResultParams {
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    pub cr: WireCheckResult,
}

// ---------------------------------------------------------------------------
// `event::SetNextCheck`
// ---------------------------------------------------------------------------

pub const METHOD_SET_NEXT_CHECK: &str = "event::SetNextCheck";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetNextCheckParams {
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    pub next_check: f64,
}

// ---------------------------------------------------------------------------
// `event::SetForceNextCheck`
// ---------------------------------------------------------------------------

pub const METHOD_SET_FORCE_NEXT_CHECK: &str = "event::SetForceNextCheck";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetForceNextCheckParams {
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    pub forced: bool,
}

// ---------------------------------------------------------------------------
// `event::SetAcknowledgement` / `event::ClearAcknowledgement`
// ---------------------------------------------------------------------------

pub const METHOD_SET_ACKNOWLEDGEMENT: &str = "event::SetAcknowledgement";
pub const METHOD_CLEAR_ACKNOWLEDGEMENT: &str = "event::ClearAcknowledgement";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckType {
    None,
    Normal,
    Sticky,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetAcknowledgementParams {
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    pub author: String,
    pub comment: String,
    pub acktype: AckType,
    pub notify: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearAcknowledgementParams {
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
}

// ---------------------------------------------------------------------------
// `event::ExecuteCommand`
// ---------------------------------------------------------------------------

pub const METHOD_EXECUTE_COMMAND: &str = "event::ExecuteCommand";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandType {
    Check,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteCommandParams {
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    pub command_type: CommandType,
    pub command: String,
    #[serde(default)]
    pub macros: serde_json::Map<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// `event::SendNotifications`
// ---------------------------------------------------------------------------

pub const METHOD_SEND_NOTIFICATIONS: &str = "event::SendNotifications";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Problem,
    Recovery,
    Acknowledgement,
    Custom,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendNotificationsParams {
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cr: Option<WireCheckResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

// ---------------------------------------------------------------------------
// `event::Heartbeat`
// ---------------------------------------------------------------------------

pub const METHOD_HEARTBEAT: &str = "event::Heartbeat";

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HeartbeatParams {
    pub timeout: f64,
}

// ---------------------------------------------------------------------------
// `log::SetLogPosition`
// ---------------------------------------------------------------------------

pub const METHOD_SET_LOG_POSITION: &str = "log::SetLogPosition";

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SetLogPositionParams {
    pub log_position: f64,
}

// ---------------------------------------------------------------------------
// Replay segment record envelope (spec §6 "Replay segment file format")
// ---------------------------------------------------------------------------

/// One record inside a replay log segment. `message` is the full
/// serialized [`Envelope`] as a JSON string (double-encoded, matching the
/// original's storage of the raw wire bytes).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayRecord {
    pub timestamp: f64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secobj: Option<SecObj>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecObj {
    #[serde(rename = "type")]
    pub object_type: String,
    pub name: String,
}

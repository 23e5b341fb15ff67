//! `Endpoint` config object (spec §3, §4.E): one cluster peer.

use crate::config_object::{ConfigObjectBase, HaMode, ObjectName};

/// How long, by default, a peer's replay segments are retained for
/// (`log_duration`, spec §3/§4.I: "segments older than the configured
/// retention (log_duration per endpoint, max across endpoints) are
/// deleted"). 24h, matching `replay_log::DEFAULT_RETENTION`; duplicated
/// here as a literal rather than a cross-crate dependency since
/// `object-model` sits below `replay-log` in the workspace graph.
pub const DEFAULT_LOG_DURATION: f64 = 24.0 * 3600.0;

#[derive(Debug, Clone)]
pub struct Endpoint {
    pub base: ConfigObjectBase,
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Set by `cluster-rpc` when a connection to this peer is live. An
    /// endpoint can briefly have more than zero while a reconnect races a
    /// still-closing old connection; `connected()` just asks "any at all".
    connection_count: u32,
    pub last_message_time: f64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    /// How long replay segments relevant to this peer are kept.
    pub log_duration: f64,
    /// Max event timestamp this peer has told us (via `log::SetLogPosition`)
    /// it has durably persisted. Monotone — see `advance_remote_log_position`.
    pub remote_log_position: f64,
    /// Max event timestamp we've recorded as relayed (or deferred) to this
    /// peer. What we tell *it* in our own `log::SetLogPosition` echoes.
    pub local_log_position: f64,
}

impl Endpoint {
    pub fn new(name: impl Into<String>) -> Self {
        Endpoint {
            base: ConfigObjectBase::new(ObjectName::new("Endpoint", name), HaMode::RunOnAll),
            host: None,
            port: None,
            connection_count: 0,
            last_message_time: 0.0,
            bytes_received: 0,
            bytes_sent: 0,
            log_duration: DEFAULT_LOG_DURATION,
            remote_log_position: 0.0,
            local_log_position: 0.0,
        }
    }

    pub fn name(&self) -> &str {
        &self.base.object_name.name
    }

    pub fn connected(&self) -> bool {
        self.connection_count > 0
    }

    pub fn add_client(&mut self) {
        self.connection_count += 1;
    }

    pub fn remove_client(&mut self) {
        self.connection_count = self.connection_count.saturating_sub(1);
    }

    pub fn record_traffic(&mut self, received: u64, sent: u64, at: f64) {
        self.bytes_received += received;
        self.bytes_sent += sent;
        self.last_message_time = at;
    }

    /// `remote_log_position` only ever moves forward (spec §3 invariant).
    pub fn advance_remote_log_position(&mut self, ts: f64) {
        if ts > self.remote_log_position {
            self.remote_log_position = ts;
        }
    }

    /// Same monotonicity for our own side of the cursor.
    pub fn advance_local_log_position(&mut self, ts: f64) {
        if ts > self.local_log_position {
            self.local_log_position = ts;
        }
    }
}

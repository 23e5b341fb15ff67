//! `CheckResult` and perfdata (spec §3).

/// A closed set of units a perfdata value may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerfdataUnit {
    Seconds,
    Bytes,
    Percent,
    Counter,
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PerfdataValue {
    pub label: String,
    pub value: f64,
    pub unit: Option<PerfdataUnit>,
    pub warn: Option<f64>,
    pub crit: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl PerfdataValue {
    pub fn simple(label: impl Into<String>, value: f64) -> Self {
        PerfdataValue {
            label: label.into(),
            value,
            unit: None,
            warn: None,
            crit: None,
            min: None,
            max: None,
        }
    }
}

/// Immutable record produced by executing a `CheckCommand` (spec §3).
#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub scheduled_start: f64,
    pub execution_start: f64,
    pub execution_end: f64,
    pub exit_status: i32,
    pub output: String,
    pub perfdata: Vec<PerfdataValue>,
    pub schedule_end: f64,
    pub command_name: String,
}

impl CheckResult {
    /// A synthetic `unknown` result for command-execution errors: timeouts,
    /// spawn failures, remote-execution failures (spec §7).
    pub fn synthetic_unknown(reason: impl Into<String>, scheduled_start: f64, command_name: impl Into<String>) -> Self {
        let now = scheduled_start.max(crate::attr::now());
        CheckResult {
            scheduled_start,
            execution_start: now,
            execution_end: now,
            exit_status: 3,
            output: reason.into(),
            perfdata: Vec::new(),
            schedule_end: now,
            command_name: command_name.into(),
        }
    }
}

/// State implied by a check result's exit status, in the service state
/// space. Host state is derived separately (`ServiceState::to_host_state`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl ServiceState {
    pub fn from_exit_status(status: i32) -> Self {
        match status {
            0 => ServiceState::Ok,
            1 => ServiceState::Warning,
            2 => ServiceState::Critical,
            _ => ServiceState::Unknown,
        }
    }

    pub fn is_ok(self) -> bool {
        matches!(self, ServiceState::Ok)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    Up,
    Down,
}

impl HostState {
    pub fn from_exit_status(status: i32) -> Self {
        if status == 0 {
            HostState::Up
        } else {
            HostState::Down
        }
    }

    pub fn is_ok(self) -> bool {
        matches!(self, HostState::Up)
    }
}

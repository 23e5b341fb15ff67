//! Checkable state machine (spec §3, §4.J) shared by `Host` and `Service`.
//!
//! The attempt/state-type algorithm below is not fully pinned down by
//! `spec.md` prose alone (see `DESIGN.md` for the worked derivation from
//! the §8 scenario 2 fixture); it resolves to the classic
//! soft/hard-with-retry state machine: a checkable starts a fresh soft
//! cycle the instant it leaves a stable state, climbs through
//! `max_check_attempts` soft retries, commits hard on the last one (or
//! immediately recovers to hard-ok the moment a check comes back clean),
//! and only a hard transition ever emits a notification request.

use std::collections::HashMap;
use uuid::Uuid;

use crate::attr::now;
use crate::check_result::CheckResult;
use crate::comment::Comment;
use crate::downtime::Downtime;
use crate::ring::CheckResultRing;

/// The value space a Checkable's state lives in: `ServiceState` for
/// services, `HostState` for hosts.
pub trait CheckState: Copy + PartialEq + std::fmt::Debug {
    fn from_exit_status(status: i32) -> Self;
    fn is_ok(self) -> bool;
}

impl CheckState for crate::check_result::ServiceState {
    fn from_exit_status(status: i32) -> Self {
        crate::check_result::ServiceState::from_exit_status(status)
    }
    fn is_ok(self) -> bool {
        crate::check_result::ServiceState::is_ok(self)
    }
}

impl CheckState for crate::check_result::HostState {
    fn from_exit_status(status: i32) -> Self {
        crate::check_result::HostState::from_exit_status(status)
    }
    fn is_ok(self) -> bool {
        crate::check_result::HostState::is_ok(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateType {
    Soft,
    Hard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckType {
    None,
    Normal,
    Sticky,
}

#[derive(Debug, Clone)]
pub struct Acknowledgement {
    pub author: String,
    pub comment: String,
    pub acktype: AckType,
    pub notify: bool,
    /// `None` means it only clears explicitly (or, for `Normal`, on the
    /// next state change).
    pub expiry: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Problem,
    Recovery,
}

#[derive(Debug, Clone)]
pub struct NotificationRequest {
    pub kind: NotificationKind,
}

/// Outcome of [`CheckableCore::process_check_result`], enough for the
/// scheduler to decide what to emit on the relay.
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub hard_state_change: bool,
    pub soft_state_change: bool,
    pub notification: Option<NotificationRequest>,
}

/// Fields shared by `Host` and `Service`, generic over the state value
/// space (`HostState` / `ServiceState`).
#[derive(Debug, Clone)]
pub struct CheckableCore<S: CheckState> {
    pub check_command: String,
    pub enable_active_checks: bool,
    pub check_interval: f64,
    pub retry_interval: f64,
    pub max_check_attempts: u32,
    pub current_attempt: u32,
    pub state_type: StateType,
    pub state: S,
    pub next_check: f64,
    pub force_next_check: bool,
    pub results: CheckResultRing<CheckResult>,
    pub acknowledgement: Option<Acknowledgement>,
    pub comments: HashMap<Uuid, Comment>,
    pub downtimes: HashMap<Uuid, Downtime>,
    /// The peer that should execute this checkable's checks, if not local
    /// (spec §4.G "Remote execution").
    pub command_endpoint: Option<String>,
    pub last_state_change: f64,
    pub last_hard_state_change: f64,
    notified_problem: bool,
}

impl<S: CheckState> CheckableCore<S> {
    pub fn new(check_command: impl Into<String>, initial_state: S, check_interval: f64, retry_interval: f64, max_check_attempts: u32) -> Self {
        CheckableCore {
            check_command: check_command.into(),
            enable_active_checks: true,
            check_interval,
            retry_interval,
            max_check_attempts: max_check_attempts.max(1),
            current_attempt: 1,
            state_type: StateType::Hard,
            state: initial_state,
            next_check: now(),
            force_next_check: false,
            results: CheckResultRing::new(128),
            acknowledgement: None,
            comments: HashMap::new(),
            downtimes: HashMap::new(),
            command_endpoint: None,
            last_state_change: now(),
            last_hard_state_change: now(),
            notified_problem: false,
        }
    }

    pub fn is_in_downtime(&self, at: f64) -> bool {
        self.downtimes
            .values()
            .any(|dt| dt.is_in_effect(at as i64))
    }

    pub fn is_acknowledged(&self) -> bool {
        self.acknowledgement.is_some()
    }

    /// Core state machine, spec §4.J. `now` is the wall-clock time the
    /// result is being processed at (used to stamp `next_check` and
    /// transition timestamps).
    pub fn process_check_result(&mut self, cr: CheckResult, now: f64) -> ProcessOutcome {
        let new_state = S::from_exit_status(cr.exit_status);
        let was_ok = self.state.is_ok();
        let was_type = self.state_type;

        let mut outcome = ProcessOutcome {
            hard_state_change: false,
            soft_state_change: false,
            notification: None,
        };

        if new_state.is_ok() {
            if was_type == StateType::Hard && !was_ok {
                // Recovery: confirmed immediately, no soft recovery phase.
                self.state_type = StateType::Hard;
                self.current_attempt = 1;
                self.last_hard_state_change = now;
                self.last_state_change = now;
                outcome.hard_state_change = true;
                if self.notified_problem {
                    outcome.notification = self.maybe_notification(NotificationKind::Recovery, now);
                    self.notified_problem = false;
                }
            } else if !was_ok {
                // Soft recovery (mid soft-cycle failure clears on first good check).
                self.state_type = StateType::Hard;
                self.current_attempt = 1;
                self.last_hard_state_change = now;
                self.last_state_change = now;
                outcome.hard_state_change = true;
                if self.notified_problem {
                    outcome.notification = self.maybe_notification(NotificationKind::Recovery, now);
                    self.notified_problem = false;
                }
            } else {
                // Steady ok: nothing changes.
                self.current_attempt = 1;
            }
            self.next_check = now + self.check_interval;
        } else {
            if was_ok {
                // First deviation from a stable state: fresh soft cycle,
                // unless there's no room for retries at all, in which case
                // it commits hard on this very check.
                self.current_attempt = 1;
                self.last_state_change = now;
                if self.current_attempt >= self.max_check_attempts {
                    self.state_type = StateType::Hard;
                    self.last_hard_state_change = now;
                    outcome.hard_state_change = true;
                    outcome.notification = self.maybe_notification(NotificationKind::Problem, now);
                    self.notified_problem = true;
                    self.next_check = now + self.check_interval;
                } else {
                    self.state_type = StateType::Soft;
                    outcome.soft_state_change = true;
                    self.next_check = now + self.retry_interval;
                }
            } else if was_type == StateType::Soft {
                self.current_attempt += 1;
                self.last_state_change = now;
                if self.current_attempt >= self.max_check_attempts {
                    self.state_type = StateType::Hard;
                    self.last_hard_state_change = now;
                    outcome.hard_state_change = true;
                    outcome.notification = self.maybe_notification(NotificationKind::Problem, now);
                    self.notified_problem = true;
                    self.next_check = now + self.check_interval;
                } else {
                    outcome.soft_state_change = true;
                    self.next_check = now + self.retry_interval;
                }
            } else {
                // Already a confirmed hard problem; nothing changes unless
                // the raw value flaps between non-ok states, which does
                // not reopen the soft cycle per spec — only ok<->not-ok
                // transitions do.
                self.next_check = now + self.check_interval;
            }
        }

        self.state = new_state;
        self.results.push(cr);
        outcome
    }

    fn maybe_notification(&self, kind: NotificationKind, at: f64) -> Option<NotificationRequest> {
        if kind == NotificationKind::Problem {
            if self.is_acknowledged() || self.is_in_downtime(at) {
                return None;
            }
        }
        Some(NotificationRequest { kind })
    }
}

impl PartialEq for NotificationKind {
    fn eq(&self, other: &Self) -> bool {
        matches!(
            (self, other),
            (NotificationKind::Problem, NotificationKind::Problem)
                | (NotificationKind::Recovery, NotificationKind::Recovery)
        )
    }
}
impl Eq for NotificationKind {}

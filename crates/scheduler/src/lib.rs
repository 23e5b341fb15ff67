//! The check scheduler (spec §4.G): decides which checkables are due,
//! dispatches their execution through the bounded work queue, and feeds
//! results back into the checkable state machine.

pub mod notification;
pub mod remote;
pub mod result_sink;
pub mod runner;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use object_model::{CheckResult, HostState, ObjectName, ObjectRef, Registry, ServiceState};
use timer_wheel::TimerWheel;
use tokio::sync::RwLock;
use work_queue::{Priority, WorkQueue};

pub use notification::{NotificationSink, NullNotificationSink};
pub use remote::RemoteCommandSink;
pub use result_sink::{CheckResultSink, NullCheckResultSink};
pub use runner::{CommandRunner, ShellCommandRunner};

fn now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Default per-command execution budget before a check is forced to a
/// synthetic unknown (spec §7).
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

pub struct Scheduler {
    pub registry: Arc<RwLock<Registry>>,
    timer: TimerWheel,
    queue: Arc<WorkQueue>,
    runner: Arc<dyn CommandRunner>,
    remote_sink: Option<Arc<dyn RemoteCommandSink>>,
    notification_sink: Arc<dyn NotificationSink>,
    result_sink: Arc<dyn CheckResultSink>,
    command_timeout: Duration,
    pending: Arc<RwLock<HashSet<ObjectName>>>,
    local_zone: String,
}

impl Scheduler {
    pub fn new(
        registry: Arc<RwLock<Registry>>,
        runner: Arc<dyn CommandRunner>,
        remote_sink: Option<Arc<dyn RemoteCommandSink>>,
        notification_sink: Arc<dyn NotificationSink>,
        result_sink: Arc<dyn CheckResultSink>,
        local_zone: impl Into<String>,
    ) -> Arc<Self> {
        Arc::new(Scheduler {
            registry,
            timer: TimerWheel::start(),
            queue: WorkQueue::start("scheduler", 4096, 8),
            runner,
            remote_sink,
            notification_sink,
            result_sink,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            pending: Arc::new(RwLock::new(HashSet::new())),
            local_zone: local_zone.into(),
        })
    }

    /// Walk the registry once, scheduling a timer entry for every
    /// checkable whose `next_check` isn't already covered by one — the
    /// scan a freshly started node needs before the steady-state
    /// reschedule-on-completion loop takes over.
    pub async fn prime(self: &Arc<Self>) {
        let names: Vec<ObjectName> = {
            let reg = self.registry.read().await;
            reg.iter()
                .filter_map(|o| match o {
                    ObjectRef::Host(h) if h.checkable.enable_active_checks => Some(h.base.object_name.clone()),
                    ObjectRef::Service(s) if s.checkable.enable_active_checks => Some(s.base.object_name.clone()),
                    _ => None,
                })
                .collect()
        };
        for name in names {
            self.schedule_wakeup(name).await;
        }
    }

    async fn schedule_wakeup(self: &Arc<Self>, name: ObjectName) {
        let at = {
            let reg = self.registry.read().await;
            match reg.get(&name) {
                Some(ObjectRef::Host(h)) => h.checkable.next_check,
                Some(ObjectRef::Service(s)) => s.checkable.next_check,
                _ => return,
            }
        };
        let scheduler = self.clone();
        self.timer
            .schedule(at, move || {
                let scheduler = scheduler.clone();
                tokio::spawn(async move { scheduler.on_due(name).await });
            })
            .await;
    }

    /// `canRunNow` predicate chain (spec §4.G).
    fn can_run_now(base_authority: bool, enable_active_checks: bool, force_next_check: bool, next_check: f64, now: f64, already_pending: bool) -> bool {
        enable_active_checks && base_authority && !already_pending && (force_next_check || now >= next_check)
    }

    async fn on_due(self: Arc<Self>, name: ObjectName) {
        let should_run = {
            let reg = self.registry.read().await;
            let mut pending = self.pending.write().await;
            let already_pending = pending.contains(&name);
            let runnable = match reg.get(&name) {
                Some(ObjectRef::Host(h)) => Self::can_run_now(h.base.authority, h.checkable.enable_active_checks, h.checkable.force_next_check, h.checkable.next_check, now(), already_pending),
                Some(ObjectRef::Service(s)) => Self::can_run_now(s.base.authority, s.checkable.enable_active_checks, s.checkable.force_next_check, s.checkable.next_check, now(), already_pending),
                _ => false,
            };
            if runnable {
                pending.insert(name.clone());
            }
            runnable
        };

        if should_run {
            let scheduler = self.clone();
            let name_for_task = name.clone();
            self.queue
                .enqueue(
                    async move {
                        scheduler.execute_check(name_for_task).await;
                        Ok(())
                    },
                    Priority::Normal,
                )
                .await;
        } else {
            // Not runnable right now (paused, disabled, or a result is
            // already in flight) — check back in a second rather than
            // dropping the object off the schedule entirely.
            self.schedule_wakeup_after(name, Duration::from_secs(1)).await;
        }
    }

    async fn schedule_wakeup_after(self: &Arc<Self>, name: ObjectName, delay: Duration) {
        let scheduler = self.clone();
        self.timer
            .schedule_after(delay, move || {
                let scheduler = scheduler.clone();
                tokio::spawn(async move { scheduler.on_due(name).await });
            })
            .await;
    }

    async fn execute_check(self: Arc<Self>, name: ObjectName) {
        let (command, command_endpoint, scheduled_start, timeout) = {
            let reg = self.registry.read().await;
            match reg.get(&name) {
                Some(ObjectRef::Host(h)) => (h.checkable.check_command.clone(), h.checkable.command_endpoint.clone(), h.checkable.next_check, self.command_timeout),
                Some(ObjectRef::Service(s)) => (s.checkable.check_command.clone(), s.checkable.command_endpoint.clone(), s.checkable.next_check, self.command_timeout),
                _ => {
                    self.pending.write().await.remove(&name);
                    return;
                }
            }
        };

        if let Some(endpoint) = command_endpoint {
            if let Some(sink) = &self.remote_sink {
                let (host, service) = split_host_service(&self.registry, &name).await;
                sink.execute_remote(&endpoint, &host, service.as_deref(), &command, serde_json::Map::new());
                // The result arrives later through cluster-rpc's
                // event::CheckResult path (`apply_result`); guard against a
                // peer that never answers.
                self.schedule_remote_timeout(name, timeout).await;
                return;
            }
        }

        let cr = self.runner.run(&command, scheduled_start, timeout).await;
        self.apply_result(&name, cr).await;
    }

    async fn schedule_remote_timeout(self: &Arc<Self>, name: ObjectName, timeout: Duration) {
        let scheduler = self.clone();
        self.timer
            .schedule_after(timeout, move || {
                let scheduler = scheduler.clone();
                tokio::spawn(async move {
                    if scheduler.pending.read().await.contains(&name) {
                        let cr = CheckResult::synthetic_unknown("remote execution timed out", now(), "remote");
                        scheduler.apply_result(&name, cr).await;
                    }
                });
            })
            .await;
    }

    /// Feed a result back in, whether it came from a local run or a
    /// remote `event::CheckResult` (cluster-rpc hands those to this
    /// same entry point once decoded).
    pub async fn apply_result(self: &Arc<Self>, name: &ObjectName, cr: CheckResult) {
        let at = now();
        let (notification, emitted) = {
            let mut reg = self.registry.write().await;
            match reg.get_mut(name) {
                Some(ObjectRef::Host(h)) => {
                    let outcome = h.checkable.process_check_result(cr.clone(), at);
                    h.checkable.next_check = h.checkable.next_check.max(at);
                    h.checkable.force_next_check = false;
                    (outcome.notification, true)
                }
                Some(ObjectRef::Service(s)) => {
                    let outcome = s.checkable.process_check_result(cr.clone(), at);
                    s.checkable.next_check = s.checkable.next_check.max(at);
                    s.checkable.force_next_check = false;
                    (outcome.notification, true)
                }
                _ => (None, false),
            }
        };
        self.pending.write().await.remove(name);

        // Every applied result is relayed, whether or not it changed
        // state (spec §4.G) — only the notification path is gated on a
        // hard transition.
        if emitted {
            self.result_sink.emit_check_result(name, &cr);
        }
        if let Some(req) = notification {
            self.notification_sink.send_notifications(name, req.kind);
        }
        self.schedule_wakeup(name.clone()).await;
    }

    pub async fn shutdown(self: Arc<Self>) {
        self.queue.shutdown().await;
    }
}

async fn split_host_service(registry: &RwLock<Registry>, name: &ObjectName) -> (String, Option<String>) {
    let reg = registry.read().await;
    match reg.get(name) {
        Some(ObjectRef::Host(h)) => (h.name().to_owned(), None),
        Some(ObjectRef::Service(s)) => (s.host_name.clone(), Some(s.name().to_owned())),
        _ => (name.name.clone(), None),
    }
}

/// Unifying helper so call sites don't need to branch on state space when
/// all they want is "is this checkable currently ok".
pub fn is_ok_state(object: &ObjectRef) -> Option<bool> {
    match object {
        ObjectRef::Host(h) => Some(matches!(h.checkable.state, HostState::Up)),
        ObjectRef::Service(s) => Some(matches!(s.checkable.state, ServiceState::Ok)),
        _ => None,
    }
}

//! Scripted stand-in for the external check-plugin collaborator (spec
//! §1's "the core never runs plugins itself") — feeds canned
//! `CheckResult`s instead of spawning `/bin/sh`.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use object_model::CheckResult;
use scheduler::CommandRunner;

/// Hands back queued results in FIFO order; once drained it synthesizes
/// a bare `OK` result so a scheduler under test never blocks on an empty
/// queue it forgot to prime.
#[derive(Default)]
pub struct MockCommandRunner {
    results: Mutex<VecDeque<CheckResult>>,
    calls: Mutex<Vec<String>>,
}

impl MockCommandRunner {
    pub fn new() -> Self {
        MockCommandRunner::default()
    }

    pub fn push_result(&self, cr: CheckResult) {
        self.results.lock().unwrap().push_back(cr);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for MockCommandRunner {
    async fn run(&self, command: &str, scheduled_start: f64, _timeout: Duration) -> CheckResult {
        self.calls.lock().unwrap().push(command.to_owned());
        let queued = self.results.lock().unwrap().pop_front();
        queued.unwrap_or_else(|| CheckResult {
            scheduled_start,
            execution_start: scheduled_start,
            execution_end: scheduled_start,
            exit_status: 0,
            output: "OK".to_owned(),
            perfdata: Vec::new(),
            schedule_end: scheduled_start,
            command_name: command.to_owned(),
        })
    }
}

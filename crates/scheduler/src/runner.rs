//! Local check execution: runs a `check_command` string as a child
//! process and turns its exit status/stdout into a `CheckResult`.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use object_model::CheckResult;
use tokio::process::Command;

#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &str, scheduled_start: f64, timeout: Duration) -> CheckResult;
}

/// Runs `command` through `/bin/sh -c` the way classic Nagios plugin
/// wrappers do, capturing combined output and mapping the exit status
/// straight onto the state space (spec §3's `CheckResult.exit_status`).
pub struct ShellCommandRunner;

#[async_trait]
impl CommandRunner for ShellCommandRunner {
    async fn run(&self, command: &str, scheduled_start: f64, timeout: Duration) -> CheckResult {
        let execution_start = now();
        let child = Command::new("/bin/sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let result = match child {
            Ok(child) => tokio::time::timeout(timeout, child.wait_with_output()).await,
            Err(e) => {
                return CheckResult::synthetic_unknown(format!("failed to spawn check command: {e}"), scheduled_start, command);
            }
        };

        match result {
            Ok(Ok(output)) => {
                let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
                if !output.stderr.is_empty() {
                    combined.push('\n');
                    combined.push_str(&String::from_utf8_lossy(&output.stderr));
                }
                CheckResult {
                    scheduled_start,
                    execution_start,
                    execution_end: now(),
                    exit_status: output.status.code().unwrap_or(3),
                    output: combined.trim_end().to_owned(),
                    perfdata: Vec::new(),
                    schedule_end: now(),
                    command_name: command.to_owned(),
                }
            }
            Ok(Err(e)) => CheckResult::synthetic_unknown(format!("check command failed: {e}"), scheduled_start, command),
            Err(_elapsed) => CheckResult::synthetic_unknown(format!("check command timed out after {timeout:?}"), scheduled_start, command),
        }
    }
}

fn now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn successful_command_maps_exit_status_and_output() {
        let runner = ShellCommandRunner;
        let cr = runner.run("echo hi; exit 0", 1.0, Duration::from_secs(5)).await;
        assert_eq!(cr.exit_status, 0);
        assert_eq!(cr.output, "hi");
    }

    #[tokio::test]
    async fn nonzero_exit_is_preserved() {
        let runner = ShellCommandRunner;
        let cr = runner.run("exit 2", 1.0, Duration::from_secs(5)).await;
        assert_eq!(cr.exit_status, 2);
    }

    #[tokio::test]
    async fn hung_command_becomes_synthetic_unknown_on_timeout() {
        let runner = ShellCommandRunner;
        let cr = runner.run("sleep 5", 1.0, Duration::from_millis(50)).await;
        assert_eq!(cr.exit_status, 3);
        assert!(cr.output.contains("timed out"));
    }
}

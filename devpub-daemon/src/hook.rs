//! Runs the external hook program once per event.

use std::io;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::ExitStatus;

use devpub_core::DeviceName;
use tokio::process::Command;
use tracing::{debug, error, warn};

/// How one hook run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookOutcome {
    Success,
    Exited(i32),
    Signaled(i32),
    SpawnFailed(io::ErrorKind),
}

impl HookOutcome {
    fn from_status(status: ExitStatus) -> Self {
        if status.success() {
            Self::Success
        } else if let Some(code) = status.code() {
            Self::Exited(code)
        } else if let Some(signal) = status.signal() {
            Self::Signaled(signal)
        } else {
            Self::Exited(-1)
        }
    }
}

#[derive(Debug, Clone)]
pub struct HookInvoker {
    program: PathBuf,
}

impl HookInvoker {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Run `program event devices...` and wait for it to finish.
    ///
    /// Callers await this before handling the next event, which keeps hook
    /// invocations in kernel order. Failures are logged, never returned.
    pub async fn dispatch(&self, event: &str, devices: &[DeviceName]) -> HookOutcome {
        for device in devices {
            debug!(event, device = %device, "running hook");
        }

        let status = Command::new(&self.program)
            .arg(event)
            .args(devices.iter().map(DeviceName::as_str))
            .status()
            .await;

        let outcome = match status {
            Ok(status) => HookOutcome::from_status(status),
            Err(err) => {
                error!(
                    program = %self.program.display(),
                    event,
                    error = %err,
                    "unable to run hook"
                );
                return HookOutcome::SpawnFailed(err.kind());
            }
        };

        match outcome {
            HookOutcome::Exited(code) => warn!(
                program = %self.program.display(),
                event,
                code,
                "hook exited with nonzero status"
            ),
            HookOutcome::Signaled(signal) => warn!(
                program = %self.program.display(),
                event,
                signal,
                "hook terminated by signal"
            ),
            HookOutcome::Success | HookOutcome::SpawnFailed(_) => {}
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn script(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("hook.sh");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write hook");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod hook");
        path
    }

    fn names(list: &[&str]) -> Vec<DeviceName> {
        list.iter().copied().map(DeviceName::from).collect()
    }

    #[tokio::test]
    async fn passes_event_then_devices_in_order() {
        let dir = TempDir::new().expect("tempdir");
        let log = dir.path().join("argv.log");
        let hook = script(&dir, &format!("echo \"$@\" >> '{}'", log.display()));

        let outcome = HookInvoker::new(&hook)
            .dispatch("device-attach", &names(&["mainbus0", "cpu0", "wd0"]))
            .await;

        assert_eq!(outcome, HookOutcome::Success);
        let argv = fs::read_to_string(&log).expect("read argv log");
        assert_eq!(argv, "device-attach mainbus0 cpu0 wd0\n");
    }

    #[tokio::test]
    async fn sequential_dispatches_keep_order() {
        let dir = TempDir::new().expect("tempdir");
        let log = dir.path().join("argv.log");
        let hook = HookInvoker::new(script(
            &dir,
            &format!("echo \"$@\" >> '{}'", log.display()),
        ));

        hook.dispatch("device-attach", &names(&["sd0"])).await;
        hook.dispatch("device-detach", &names(&["sd0"])).await;

        let argv = fs::read_to_string(&log).expect("read argv log");
        assert_eq!(argv, "device-attach sd0\ndevice-detach sd0\n");
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported() {
        let dir = TempDir::new().expect("tempdir");
        let hook = script(&dir, "exit 3");

        let outcome = HookInvoker::new(hook)
            .dispatch("device-detach", &names(&["wd0"]))
            .await;
        assert_eq!(outcome, HookOutcome::Exited(3));
    }

    #[tokio::test]
    async fn signal_termination_is_reported() {
        let dir = TempDir::new().expect("tempdir");
        let hook = script(&dir, "kill -TERM $$");

        let outcome = HookInvoker::new(hook)
            .dispatch("device-attach", &names(&["wd0"]))
            .await;
        assert_eq!(outcome, HookOutcome::Signaled(libc::SIGTERM));
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_failure() {
        let dir = TempDir::new().expect("tempdir");
        let outcome = HookInvoker::new(dir.path().join("absent"))
            .dispatch("device-attach", &names(&["wd0"]))
            .await;
        assert_eq!(outcome, HookOutcome::SpawnFailed(io::ErrorKind::NotFound));
    }
}

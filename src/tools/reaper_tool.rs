use crate::events::{EventHub, ProcessEvent};
use crate::tools::registry::ProcessRegistry;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Platform-specific process control, selected once at startup instead of
/// branching inside every component.
pub trait ProcessController: Send + Sync {
    /// Program + flag used to run a command line through the host shell.
    fn shell(&self) -> (&'static str, &'static str);

    /// Signals the whole tree rooted at `pid`. On POSIX this requires the
    /// root to have been spawned as a process-group leader.
    fn kill_tree(&self, pid: u32) -> std::io::Result<()>;
}

pub struct UnixController;

impl ProcessController for UnixController {
    fn shell(&self) -> (&'static str, &'static str) {
        ("/bin/sh", "-c")
    }

    #[cfg(unix)]
    fn kill_tree(&self, pid: u32) -> std::io::Result<()> {
        // Negative PID addresses the process group.
        let rc = unsafe { libc::kill(-(pid as i32), libc::SIGKILL) };
        if rc == 0 {
            Ok(())
        } else {
            Err(std::io::Error::last_os_error())
        }
    }

    #[cfg(not(unix))]
    fn kill_tree(&self, _pid: u32) -> std::io::Result<()> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "process-group kill is POSIX-only",
        ))
    }
}

pub struct WindowsController;

impl ProcessController for WindowsController {
    fn shell(&self) -> (&'static str, &'static str) {
        ("cmd", "/C")
    }

    fn kill_tree(&self, pid: u32) -> std::io::Result<()> {
        // /T kills the tree, /F forces.
        let output = std::process::Command::new("taskkill")
            .args(["/pid", &pid.to_string(), "/T", "/F"])
            .output()?;
        if output.status.success() {
            Ok(())
        } else {
            Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ))
        }
    }
}

pub fn platform_controller() -> Arc<dyn ProcessController> {
    if cfg!(windows) {
        Arc::new(WindowsController)
    } else {
        Arc::new(UnixController)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopOutcome {
    pub stopped: bool,
    pub message: String,
}

/// Terminates tracked workspace processes, whole tree first.
pub struct ProcessTreeReaper {
    registry: Arc<ProcessRegistry>,
    events: Arc<EventHub<ProcessEvent>>,
    controller: Arc<dyn ProcessController>,
}

impl ProcessTreeReaper {
    pub fn new(
        registry: Arc<ProcessRegistry>,
        events: Arc<EventHub<ProcessEvent>>,
        controller: Arc<dyn ProcessController>,
    ) -> Self {
        Self {
            registry,
            events,
            controller,
        }
    }

    /// Stops the process tracked under `key`.
    ///
    /// Never errors: a missing entry is a successful no-op. The group kill
    /// is attempted first; if it fails the single child handle is killed
    /// instead, and only when both fail is a KillFailure reported (as an
    /// error event; the entry is removed and the exit event emitted
    /// regardless, so the key is immediately reusable).
    #[instrument(skip(self), fields(key = %key))]
    pub async fn stop(&self, key: &str) -> StopOutcome {
        let Some(entry) = self.registry.remove(key) else {
            return StopOutcome {
                stopped: false,
                message: "No active process to stop".to_string(),
            };
        };

        self.events.emit(
            key,
            ProcessEvent::Log {
                output: "Stopping process tree...".to_string(),
            },
        );

        let pid = entry.info.pid;
        let mut kill_error: Option<String> = None;
        if let Err(group_err) = self.controller.kill_tree(pid) {
            warn!(key = %key, pid = %pid, error = %group_err, "Group kill failed, falling back to single-handle kill");
            let mut child_guard = entry.child.lock().await;
            let fallback = match child_guard.as_mut() {
                Some(child) => child.start_kill(),
                // Handle already reaped; the group signal failing then just
                // means the process is gone.
                None => Ok(()),
            };
            if let Err(single_err) = fallback {
                kill_error = Some(format!(
                    "group kill: {}; single kill: {}",
                    group_err, single_err
                ));
            }
        }

        if let Some(cause) = kill_error {
            warn!(key = %key, pid = %pid, cause = %cause, "Both kill paths failed");
            self.events.emit(
                key,
                ProcessEvent::Error {
                    message: format!("Failed to kill process tree: {}", cause),
                },
            );
        } else {
            info!(key = %key, pid = %pid, "Process tree stopped");
        }

        self.events.emit_final(
            key,
            ProcessEvent::Exit {
                code: None,
                message: "Process stopped by user".to_string(),
            },
        );

        StopOutcome {
            stopped: true,
            message: format!("Process for {} stopped", key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::registry::RegisterOutcome;
    use std::process::Stdio;
    use std::time::Duration;
    use tokio::process::Command;

    fn reaper_fixture() -> (Arc<ProcessRegistry>, Arc<EventHub<ProcessEvent>>, ProcessTreeReaper) {
        let registry = Arc::new(ProcessRegistry::new());
        let events = Arc::new(EventHub::new());
        let reaper =
            ProcessTreeReaper::new(registry.clone(), events.clone(), platform_controller());
        (registry, events, reaper)
    }

    #[tokio::test]
    async fn stop_without_process_is_a_successful_noop() {
        let (_registry, _events, reaper) = reaper_fixture();
        let outcome = reaper.stop("ghost").await;
        assert!(!outcome.stopped);
        assert_eq!(outcome.message, "No active process to stop");
    }

    #[cfg(unix)]
    fn pid_alive(pid: u32) -> bool {
        unsafe { libc::kill(pid as i32, 0) == 0 }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stop_kills_the_whole_process_group() {
        let (registry, events, reaper) = reaper_fixture();

        // A shell that forks two sleepers; all three share the group.
        let mut cmd = Command::new("/bin/sh");
        cmd.args(["-c", "sleep 30 & sleep 30 & wait"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0);
        let child = cmd.spawn().expect("spawn test tree");
        let pid = child.id().expect("pid");

        let child = Arc::new(tokio::sync::Mutex::new(Some(child)));
        assert!(matches!(
            registry.register("tree", pid, child),
            RegisterOutcome::Registered { .. }
        ));

        // Give the shell a moment to fork its children.
        tokio::time::sleep(Duration::from_millis(200)).await;
        let table = crate::utils::process_tree::ProcessTable::snapshot();
        let descendants = table.descendants(pid);
        assert!(descendants.len() >= 2, "expected forked children");

        let mut rx = events.subscribe("tree");
        let outcome = reaper.stop("tree").await;
        assert!(outcome.stopped);

        // SIGKILL is immediate but give the kernel a beat to reap.
        tokio::time::sleep(Duration::from_millis(300)).await;
        for pid in descendants {
            assert!(!pid_alive(pid), "pid {} survived tree kill", pid);
        }

        // Log first, exit last, and the key is free for reuse.
        assert!(matches!(rx.recv().await, Ok(ProcessEvent::Log { .. })));
        assert!(
            matches!(rx.recv().await, Ok(ProcessEvent::Exit { message, .. }) if message == "Process stopped by user")
        );
        assert!(!registry.contains("tree"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn fallback_kill_is_used_when_group_kill_fails() {
        // Spawn WITHOUT a new process group: the group signal targets the
        // test runner's own group and is rejected, exercising the fallback.
        struct NoGroupKill;
        impl ProcessController for NoGroupKill {
            fn shell(&self) -> (&'static str, &'static str) {
                ("/bin/sh", "-c")
            }
            fn kill_tree(&self, _pid: u32) -> std::io::Result<()> {
                Err(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "simulated group-kill failure",
                ))
            }
        }

        let registry = Arc::new(ProcessRegistry::new());
        let events: Arc<EventHub<ProcessEvent>> = Arc::new(EventHub::new());
        let reaper = ProcessTreeReaper::new(registry.clone(), events.clone(), Arc::new(NoGroupKill));

        let child = Command::new("sleep")
            .arg("30")
            .stdout(Stdio::null())
            .spawn()
            .expect("spawn sleeper");
        let pid = child.id().expect("pid");
        registry.register("single", pid, Arc::new(tokio::sync::Mutex::new(Some(child))));

        let outcome = reaper.stop("single").await;
        assert!(outcome.stopped);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!pid_alive(pid), "fallback kill left process alive");
        assert!(!registry.contains("single"));
    }

    #[tokio::test]
    async fn no_double_stop_success() {
        let (registry, _events, reaper) = reaper_fixture();
        // A pid far above any real process: the group kill fails with ESRCH
        // and the entry has no handle, so stop degrades to bookkeeping.
        registry.register("once", 999_999_999, Arc::new(tokio::sync::Mutex::new(None)));
        let first = reaper.stop("once").await;
        let second = reaper.stop("once").await;
        assert!(first.stopped);
        assert!(!second.stopped);
    }
}

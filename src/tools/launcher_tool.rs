use crate::error::AppError;
use crate::events::{EventHub, ProcessEvent};
use crate::tools::reaper_tool::ProcessController;
use crate::tools::registry::{ProcessRegistry, RegisterOutcome};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{debug, error, info, instrument, warn};

/// How often waiter tasks poll a child for exit. Polling (rather than an
/// exclusive `wait()`) keeps the child handle available to the reaper's
/// single-kill fallback.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(150);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Started {
    /// A new process was spawned and registered.
    Spawned { pid: u32 },
    /// A process already runs under this key; the caller should consume the
    /// existing event stream instead.
    Attached,
}

/// Spawns workspace dev/start commands and streams their output as events.
pub struct CommandLauncher {
    registry: Arc<ProcessRegistry>,
    events: Arc<EventHub<ProcessEvent>>,
    controller: Arc<dyn ProcessController>,
}

impl CommandLauncher {
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

    /// Starts `command_line` for the workspace `key` in `working_dir`.
    ///
    /// The child inherits the orchestrator environment merged with
    /// `extra_env` and the forced overrides. An empty command is
    /// `NoCommand` (nothing spawned). A live key is the `Attached` success
    /// path. Spawn failure is surfaced both as the returned error and as an
    /// `error` event on the key's stream; no registry entry is created for
    /// it.
    #[instrument(skip(self, working_dir, extra_env), fields(key = %key, command = %command_line))]
    pub async fn start(
        &self,
        key: &str,
        working_dir: &Path,
        command_line: &str,
        extra_env: &HashMap<String, String>,
    ) -> Result<Started, AppError> {
        if command_line.trim().is_empty() {
            return Err(AppError::NoCommand(key.to_string()));
        }

        if self.registry.contains(key) {
            info!(key = %key, "Process already running, attaching caller to existing stream");
            self.events.emit(
                key,
                ProcessEvent::Log {
                    output: "Attached to already running process".to_string(),
                },
            );
            return Ok(Started::Attached);
        }

        let (shell, shell_flag) = self.controller.shell();
        let mut cmd = Command::new(shell);
        cmd.arg(shell_flag)
            .arg(command_line)
            .current_dir(working_dir)
            .envs(extra_env)
            // TERM=dumb keeps child output machine-parseable, FORCE_COLOR
            // preserves color codes for display.
            .env("TERM", "dumb")
            .env("FORCE_COLOR", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // New process group so the whole subtree can be signalled together.
        #[cfg(unix)]
        cmd.process_group(0);

        debug!(key = %key, dir = %working_dir.display(), "Spawning workspace command");

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!(key = %key, error = %e, "Failed to spawn workspace command");
                self.events.emit(
                    key,
                    ProcessEvent::Error {
                        message: format!("Spawn error: {}", e),
                    },
                );
                return Err(AppError::SpawnFailure(e.to_string()));
            }
        };

        let Some(pid) = child.id() else {
            self.events.emit(
                key,
                ProcessEvent::Error {
                    message: "Failed to spawn process".to_string(),
                },
            );
            return Err(AppError::SpawnFailure("no PID for spawned process".to_string()));
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let child = Arc::new(tokio::sync::Mutex::new(Some(child)));
        let instance = match self.registry.register(key, pid, child.clone()) {
            RegisterOutcome::Registered { instance } => instance,
            RegisterOutcome::AlreadyRunning => {
                // Lost a race to another start on the same key; kill ours
                // and attach like any other duplicate start.
                warn!(key = %key, "Concurrent start raced, discarding duplicate spawn");
                if let Some(mut dup) = child.lock().await.take() {
                    let _ = dup.start_kill();
                }
                return Ok(Started::Attached);
            }
        };

        info!(key = %key, pid = %pid, "Child process spawned");

        if let Some(stdout) = stdout {
            spawn_chunk_reader(stdout, self.events.clone(), key.to_string(), false);
        }
        if let Some(stderr) = stderr {
            spawn_chunk_reader(stderr, self.events.clone(), key.to_string(), true);
        }

        // Waiter: polls for exit, then deregisters BEFORE emitting the exit
        // event so an observer of `exit` can restart the key immediately.
        let registry = self.registry.clone();
        let events = self.events.clone();
        let key_owned = key.to_string();
        tokio::spawn(async move {
            let code = wait_for_exit(&child).await;
            if registry.remove_instance(&key_owned, instance).is_some() {
                events.emit_final(
                    &key_owned,
                    ProcessEvent::Exit {
                        code,
                        message: match code {
                            Some(code) => format!("Process exited with code {}", code),
                            None => "Process exited".to_string(),
                        },
                    },
                );
            }
        });

        Ok(Started::Spawned { pid })
    }
}

/// Streams a child pipe to the event hub in raw chunks, verbatim, with no
/// line buffering beyond chunk boundaries.
fn spawn_chunk_reader<R>(
    mut pipe: R,
    events: Arc<EventHub<ProcessEvent>>,
    key: String,
    is_error: bool,
) where
    R: AsyncReadExt + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = [0u8; 8192];
        loop {
            match pipe.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    let output = String::from_utf8_lossy(&buf[..n]).into_owned();
                    let event = if is_error {
                        ProcessEvent::Error { message: output }
                    } else {
                        ProcessEvent::Log { output }
                    };
                    events.emit(&key, event);
                }
                Err(e) => {
                    debug!(key = %key, error = %e, "Pipe read ended");
                    break;
                }
            }
        }
    });
}

async fn wait_for_exit(child: &Arc<tokio::sync::Mutex<Option<Child>>>) -> Option<i32> {
    loop {
        {
            let mut guard = child.lock().await;
            match guard.as_mut() {
                Some(running) => match running.try_wait() {
                    Ok(Some(status)) => {
                        *guard = None;
                        return status.code();
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(error = %e, "Error polling child status");
                        *guard = None;
                        return None;
                    }
                },
                // Handle taken elsewhere (shutdown kill); treat as exited.
                None => return None,
            }
        }
        tokio::time::sleep(EXIT_POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventHub;
    use crate::tools::reaper_tool::platform_controller;
    use std::time::Duration;

    fn launcher_fixture() -> (Arc<ProcessRegistry>, Arc<EventHub<ProcessEvent>>, CommandLauncher) {
        let registry = Arc::new(ProcessRegistry::new());
        let events = Arc::new(EventHub::new());
        let launcher =
            CommandLauncher::new(registry.clone(), events.clone(), platform_controller());
        (registry, events, launcher)
    }

    #[tokio::test]
    async fn empty_command_is_no_command() {
        let (registry, _events, launcher) = launcher_fixture();
        let err = launcher
            .start("web", Path::new("."), "   ", &HashMap::new())
            .await
            .expect_err("expected NoCommand");
        assert!(matches!(err, AppError::NoCommand(_)));
        assert!(registry.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn output_streams_and_exit_is_last() {
        let (registry, events, launcher) = launcher_fixture();
        let mut rx = events.subscribe("web");

        let started = launcher
            .start("web", Path::new("/tmp"), "echo hello", &HashMap::new())
            .await
            .expect("spawn echo");
        assert!(matches!(started, Started::Spawned { .. }));

        let mut saw_hello = false;
        let mut exited = false;
        while let Ok(Ok(event)) =
            tokio::time::timeout(Duration::from_secs(5), rx.recv()).await
        {
            match event {
                ProcessEvent::Log { output } => {
                    if output.contains("hello") {
                        saw_hello = true;
                    }
                }
                ProcessEvent::Exit { code, message } => {
                    assert_eq!(code, Some(0));
                    assert_eq!(message, "Process exited with code 0");
                    exited = true;
                    break;
                }
                ProcessEvent::Error { .. } => {}
            }
        }
        assert!(saw_hello, "stdout chunk was not delivered");
        assert!(exited, "exit event was not delivered");

        // Registry entry cleared before the exit event; key is reusable.
        assert!(!registry.contains("web"));
        let restarted = launcher
            .start("web", Path::new("/tmp"), "echo again", &HashMap::new())
            .await
            .expect("restart after exit");
        assert!(matches!(restarted, Started::Spawned { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn starting_twice_attaches_instead_of_spawning() {
        let (registry, _events, launcher) = launcher_fixture();

        let first = launcher
            .start("web", Path::new("/tmp"), "sleep 10", &HashMap::new())
            .await
            .expect("first spawn");
        let Started::Spawned { pid } = first else {
            panic!("first start should spawn");
        };

        let second = launcher
            .start("web", Path::new("/tmp"), "sleep 10", &HashMap::new())
            .await
            .expect("second start");
        assert!(matches!(second, Started::Attached));

        // Still exactly one tracked process, same pid.
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.pid_of("web"), Some(pid));

        // Cleanup.
        if let Some(entry) = registry.remove("web") {
            if let Some(mut child) = entry.child.lock().await.take() {
                let _ = child.start_kill();
            }
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn spawn_failure_creates_no_registry_entry() {
        let (registry, events, launcher) = launcher_fixture();
        let mut rx = events.subscribe("bad");

        // The shell itself spawns fine and exits non-zero for an unknown
        // command; a missing working directory fails the spawn itself.
        let err = launcher
            .start("bad", Path::new("/definitely/not/a/dir"), "echo hi", &HashMap::new())
            .await
            .expect_err("expected spawn failure");
        assert!(matches!(err, AppError::SpawnFailure(_)));
        assert!(registry.is_empty());

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("event timeout")
            .expect("event");
        assert!(matches!(event, ProcessEvent::Error { .. }));
    }
}

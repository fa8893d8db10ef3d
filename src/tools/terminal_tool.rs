use crate::config::Config;
use crate::error::AppError;
use crate::events::{EventHub, TerminalEvent};
use crate::utils::docker_stats;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot, Mutex as TokioMutex};
use tracing::{debug, info, instrument, warn};

/// Forces a recognizable prompt inside interactive shells, overriding any
/// PS1 set by the user's rc files.
const PROMPT_COMMAND: &str =
    "export PS1=\"\\[\\033[34m\\][PATH] \\[\\033[32m\\]\\w\\[\\033[0m\\]\\n$ \";";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalSessionInfo {
    pub session_id: String,
    pub workspace_name: Option<String>,
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
}

pub(crate) struct TerminalSpawnRequest {
    pub cwd: PathBuf,
    pub command: String,
    pub rows: u16,
    pub cols: u16,
}

/// Handle for killing a session's child, independent of which backend
/// produced it.
pub(crate) enum SessionKiller {
    Pty(Arc<StdMutex<Box<dyn portable_pty::ChildKiller + Send + Sync>>>),
    Piped(Arc<TokioMutex<Option<Child>>>),
}

impl SessionKiller {
    async fn kill(&self) {
        match self {
            SessionKiller::Pty(killer) => {
                let killer = killer.clone();
                let _ = tokio::task::spawn_blocking(move || {
                    if let Ok(mut guard) = killer.lock() {
                        let _ = guard.kill();
                    }
                })
                .await;
            }
            SessionKiller::Piped(child) => {
                let mut guard = child.lock().await;
                if let Some(child) = guard.as_mut() {
                    let _ = child.start_kill();
                }
            }
        }
    }
}

pub(crate) struct SpawnedTerminal {
    pub pid: Option<u32>,
    pub writer_tx: mpsc::Sender<Vec<u8>>,
    pub output_rx: mpsc::Receiver<Vec<u8>>,
    pub exit_rx: oneshot::Receiver<Option<i32>>,
    pub killer: SessionKiller,
    /// One-shot system notice shown to the client right after start
    /// (e.g. the Windows reduced-interactivity warning).
    pub notice: Option<String>,
}

/// Execution strategy for interactive sessions, selected once per host OS.
/// Both strategies expose the same channel contract to the manager.
pub(crate) trait TerminalBackend: Send + Sync {
    fn spawn(&self, request: TerminalSpawnRequest) -> Result<SpawnedTerminal, AppError>;
}

/// POSIX: allocate a real pseudo-terminal so the child sees a TTY (color,
/// line editing, interactive prompts) and run the command through bash.
pub(crate) struct PtyBackend;

impl TerminalBackend for PtyBackend {
    fn spawn(&self, request: TerminalSpawnRequest) -> Result<SpawnedTerminal, AppError> {
        use portable_pty::{native_pty_system, CommandBuilder, PtySize};

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: request.rows,
                cols: request.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| AppError::TerminalHelperMissing(e.to_string()))?;

        let script = format!(
            "stty cols {} rows {}; {}",
            request.cols, request.rows, request.command
        );
        let mut builder = CommandBuilder::new("/bin/bash");
        builder.arg("-c");
        builder.arg(&script);
        builder.cwd(&request.cwd);
        builder.env("TERM", "xterm-256color");
        builder.env("FORCE_COLOR", "1");
        builder.env("PROMPT_COMMAND", PROMPT_COMMAND);
        // CLIs suppress interactive/colored output when CI is set.
        builder.env_remove("CI");

        let mut child = pair
            .slave
            .spawn_command(builder)
            .map_err(|e| AppError::TerminalHelperMissing(e.to_string()))?;
        let pid = child.process_id();
        let killer = Arc::new(StdMutex::new(child.clone_killer()));

        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| AppError::TerminalHelperMissing(e.to_string()))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| AppError::TerminalHelperMissing(e.to_string()))?;

        let (output_tx, output_rx) = mpsc::channel::<Vec<u8>>(256);
        tokio::task::spawn_blocking(move || {
            let mut buf = [0u8; 8192];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if output_tx.blocking_send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(_) => break,
                }
            }
        });

        let (writer_tx, mut writer_rx) = mpsc::channel::<Vec<u8>>(128);
        let writer = Arc::new(StdMutex::new(writer));
        tokio::spawn(async move {
            while let Some(bytes) = writer_rx.recv().await {
                let writer = writer.clone();
                let _ = tokio::task::spawn_blocking(move || {
                    if let Ok(mut guard) = writer.lock() {
                        use std::io::Write;
                        let _ = guard.write_all(&bytes);
                        let _ = guard.flush();
                    }
                })
                .await;
            }
        });

        let (exit_tx, exit_rx) = oneshot::channel::<Option<i32>>();
        tokio::task::spawn_blocking(move || {
            let code = child.wait().ok().map(|status| status.exit_code() as i32);
            let _ = exit_tx.send(code);
        });

        Ok(SpawnedTerminal {
            pid,
            writer_tx,
            output_rx,
            exit_rx,
            killer: SessionKiller::Pty(killer),
            notice: None,
        })
    }
}

/// Windows (and fallback): spawn through the shell without a PTY. Standard
/// input/output works; full-screen interactivity is reduced.
pub(crate) struct PipeBackend;

impl TerminalBackend for PipeBackend {
    fn spawn(&self, request: TerminalSpawnRequest) -> Result<SpawnedTerminal, AppError> {
        use std::process::Stdio;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let (shell, flag) = if cfg!(windows) {
            ("cmd", "/C")
        } else {
            ("/bin/sh", "-c")
        };
        let mut cmd = tokio::process::Command::new(shell);
        cmd.arg(flag)
            .arg(&request.command)
            .current_dir(&request.cwd)
            .env("TERM", "xterm-256color")
            .env("FORCE_COLOR", "1")
            .env("PROMPT_COMMAND", PROMPT_COMMAND)
            .env_remove("CI")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| AppError::SpawnFailure(e.to_string()))?;
        let pid = child.id();

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (output_tx, output_rx) = mpsc::channel::<Vec<u8>>(256);
        if let Some(mut stdout) = stdout {
            let tx = output_tx.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 8192];
                while let Ok(n) = stdout.read(&mut buf).await {
                    if n == 0 || tx.send(buf[..n].to_vec()).await.is_err() {
                        break;
                    }
                }
            });
        }
        if let Some(mut stderr) = stderr {
            let tx = output_tx.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 8192];
                while let Ok(n) = stderr.read(&mut buf).await {
                    if n == 0 || tx.send(buf[..n].to_vec()).await.is_err() {
                        break;
                    }
                }
            });
        }
        drop(output_tx);

        let (writer_tx, mut writer_rx) = mpsc::channel::<Vec<u8>>(128);
        if let Some(mut stdin) = stdin {
            tokio::spawn(async move {
                while let Some(bytes) = writer_rx.recv().await {
                    if stdin.write_all(&bytes).await.is_err() {
                        break;
                    }
                    let _ = stdin.flush().await;
                }
            });
        }

        let child = Arc::new(TokioMutex::new(Some(child)));
        let (exit_tx, exit_rx) = oneshot::channel::<Option<i32>>();
        let child_for_wait = child.clone();
        tokio::spawn(async move {
            let code = loop {
                {
                    let mut guard = child_for_wait.lock().await;
                    match guard.as_mut() {
                        Some(running) => match running.try_wait() {
                            Ok(Some(status)) => {
                                *guard = None;
                                break status.code();
                            }
                            Ok(None) => {}
                            Err(_) => {
                                *guard = None;
                                break None;
                            }
                        },
                        None => break None,
                    }
                }
                tokio::time::sleep(std::time::Duration::from_millis(150)).await;
            };
            let _ = exit_tx.send(code);
        });

        let notice = cfg!(windows).then(|| {
            "\x1b[33m[System] Windows detected. Running in compatible mode (limited interactivity).\x1b[0m\r\n"
                .to_string()
        });

        Ok(SpawnedTerminal {
            pid,
            writer_tx,
            output_rx,
            exit_rx,
            killer: SessionKiller::Piped(child),
            notice,
        })
    }
}

fn platform_backend() -> Box<dyn TerminalBackend> {
    if cfg!(windows) {
        Box::new(PipeBackend)
    } else {
        Box::new(PtyBackend)
    }
}

struct SessionRecord {
    workspace_name: Option<String>,
    pid: Option<u32>,
    started_at: DateTime<Utc>,
    writer_tx: mpsc::Sender<Vec<u8>>,
    killer: SessionKiller,
    /// Distinguishes this session from a later one under the same id so a
    /// forwarder finishing late cannot remove or announce its successor.
    epoch: u64,
}

type SessionMap = Arc<TokioMutex<HashMap<String, SessionRecord>>>;

/// Interactive terminal sessions, at most one per transport connection id.
pub struct TerminalManager {
    config: Arc<Config>,
    events: Arc<EventHub<TerminalEvent>>,
    sessions: SessionMap,
    next_epoch: AtomicU64,
    backend: Box<dyn TerminalBackend>,
}

impl TerminalManager {
    pub fn new(config: Arc<Config>, events: Arc<EventHub<TerminalEvent>>) -> Self {
        Self::with_backend(config, events, platform_backend())
    }

    pub(crate) fn with_backend(
        config: Arc<Config>,
        events: Arc<EventHub<TerminalEvent>>,
        backend: Box<dyn TerminalBackend>,
    ) -> Self {
        Self {
            config,
            events,
            sessions: Arc::new(TokioMutex::new(HashMap::new())),
            next_epoch: AtomicU64::new(1),
            backend,
        }
    }

    /// Starts a shell session for a connection. Errors are delivered as
    /// `terminal:error` events on the session's stream, not return values.
    #[instrument(skip(self, path), fields(session_id = %session_id, command = %command))]
    pub async fn start(
        &self,
        session_id: &str,
        workspace_name: Option<String>,
        path: &Path,
        command: &str,
    ) {
        // No two live shells per connection: tear down any prior session
        // first, so listeners and file descriptors do not pile up across
        // repeated starts.
        if self.teardown(session_id).await {
            self.events.emit(
                session_id,
                TerminalEvent::Log {
                    output: "\r\n\x1b[33m[System] Previous command terminated.\x1b[0m\r\n"
                        .to_string(),
                },
            );
        }

        let request = TerminalSpawnRequest {
            cwd: path.to_path_buf(),
            command: command.to_string(),
            rows: self.config.terminal_rows,
            cols: self.config.terminal_cols,
        };

        let spawned = match self.backend.spawn(request) {
            Ok(spawned) => spawned,
            Err(AppError::TerminalHelperMissing(cause)) => {
                warn!(session_id = %session_id, cause = %cause, "PTY allocation failed");
                self.events.emit(
                    session_id,
                    TerminalEvent::Error {
                        message: format!(
                            "\r\n\x1b[31mError: PTY support unavailable ({}). Interactive mode requires a pseudo-terminal.\x1b[0m",
                            cause
                        ),
                    },
                );
                return;
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Failed to start terminal command");
                self.events.emit(
                    session_id,
                    TerminalEvent::Error {
                        message: format!("Failed to start command: {}", e),
                    },
                );
                return;
            }
        };

        if let Some(notice) = &spawned.notice {
            self.events.emit(
                session_id,
                TerminalEvent::Log {
                    output: notice.clone(),
                },
            );
        }

        let epoch = self.next_epoch.fetch_add(1, Ordering::SeqCst);
        info!(session_id = %session_id, pid = ?spawned.pid, "Terminal session started");
        {
            let mut sessions = self.sessions.lock().await;
            sessions.insert(
                session_id.to_string(),
                SessionRecord {
                    workspace_name,
                    pid: spawned.pid,
                    started_at: Utc::now(),
                    writer_tx: spawned.writer_tx,
                    killer: spawned.killer,
                    epoch,
                },
            );
        }

        spawn_forwarder(
            self.events.clone(),
            self.sessions.clone(),
            session_id.to_string(),
            epoch,
            spawned.output_rx,
            spawned.exit_rx,
        );
    }

    /// Writes raw bytes to the session's stdin. Writing to an unknown or
    /// already-exited session is a silent no-op.
    pub async fn input(&self, session_id: &str, data: &str) {
        let sessions = self.sessions.lock().await;
        if let Some(record) = sessions.get(session_id) {
            // If the writer task is gone the channel is closed, which is
            // exactly the exited case.
            let _ = record.writer_tx.try_send(data.as_bytes().to_vec());
        }
    }

    /// Stops the session for a connection id. Returns whether one existed.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn stop(&self, session_id: &str) -> bool {
        let existed = {
            let sessions = self.sessions.lock().await;
            sessions.contains_key(session_id)
        };
        if existed {
            self.events.emit(
                session_id,
                TerminalEvent::Log {
                    output:
                        "\r\n\x1b[33m[System] Stopping interactive terminal process...\x1b[0m\r\n"
                            .to_string(),
                },
            );
        }
        self.teardown(session_id).await
    }

    /// Stops the session bound to a workspace, if any.
    pub async fn stop_by_workspace(&self, workspace_name: &str) -> bool {
        match self.session_for_workspace(workspace_name).await {
            Some(id) => self.stop(&id).await,
            None => false,
        }
    }

    /// Full workspace teardown: containers recorded in `.runtime.json`,
    /// best-effort `npm run stop`, then the terminal session itself.
    #[instrument(skip(self, workspace_path), fields(workspace = %workspace_name))]
    pub async fn stop_workspace(
        &self,
        workspace_name: &str,
        workspace_path: Option<&Path>,
    ) -> bool {
        let session_id = self.session_for_workspace(workspace_name).await;

        let notify = |msg: &str| {
            if let Some(id) = &session_id {
                self.events.emit(
                    id,
                    TerminalEvent::Log {
                        output: format!("\r\n\x1b[33m[System] {}\x1b[0m\r\n", msg),
                    },
                );
            }
            info!(workspace = %workspace_name, "{}", msg);
        };

        if let Some(path) = workspace_path {
            let runtime_file = path.join(".runtime.json");
            if let Ok(raw) = tokio::fs::read_to_string(&runtime_file).await {
                notify("Checking/Stopping Docker containers...");
                let container_ids = parse_runtime_container_ids(&raw);
                for id in &container_ids {
                    if let Err(e) = docker_stats::stop_container(id).await {
                        warn!(container = %id, error = %e, "Failed to stop container");
                    }
                }
                if !container_ids.is_empty() {
                    notify("All Docker containers stopped and removed.");
                }
            }

            // The workspace may define its own teardown script; its absence
            // or failure is fine.
            notify("Running npm run stop...");
            let _ = tokio::process::Command::new(if cfg!(windows) { "npm.cmd" } else { "npm" })
                .args(["run", "stop"])
                .current_dir(path)
                .output()
                .await;
        }

        match &session_id {
            Some(id) => {
                let stopped = self.stop(id).await;
                notify("Terminal session cleaned up.");
                stopped
            }
            None => false,
        }
    }

    pub async fn list_sessions(&self) -> Vec<TerminalSessionInfo> {
        let sessions = self.sessions.lock().await;
        sessions
            .iter()
            .map(|(id, record)| TerminalSessionInfo {
                session_id: id.clone(),
                workspace_name: record.workspace_name.clone(),
                pid: record.pid,
                started_at: record.started_at,
            })
            .collect()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    async fn session_for_workspace(&self, workspace_name: &str) -> Option<String> {
        let sessions = self.sessions.lock().await;
        sessions
            .iter()
            .find(|(_, record)| record.workspace_name.as_deref() == Some(workspace_name))
            .map(|(id, _)| id.clone())
    }

    /// Removes the record and kills the child. Idempotent; the forwarder
    /// for a torn-down epoch emits nothing further.
    async fn teardown(&self, session_id: &str) -> bool {
        let record = {
            let mut sessions = self.sessions.lock().await;
            sessions.remove(session_id)
        };
        match record {
            Some(record) => {
                record.killer.kill().await;
                true
            }
            None => false,
        }
    }
}

/// Forwards child output to the event stream, then applies the exit-code
/// policy and cleans the session up. A session torn down manually in the
/// meantime (epoch mismatch) emits nothing further.
fn spawn_forwarder(
    events: Arc<EventHub<TerminalEvent>>,
    sessions: SessionMap,
    session_id: String,
    epoch: u64,
    mut output_rx: mpsc::Receiver<Vec<u8>>,
    exit_rx: oneshot::Receiver<Option<i32>>,
) {
    tokio::spawn(async move {
        while let Some(chunk) = output_rx.recv().await {
            events.emit(
                &session_id,
                TerminalEvent::Log {
                    output: String::from_utf8_lossy(&chunk).into_owned(),
                },
            );
        }

        let code = exit_rx.await.unwrap_or(None);

        let owned = {
            let mut sessions = sessions.lock().await;
            match sessions.get(&session_id) {
                Some(record) if record.epoch == epoch => {
                    sessions.remove(&session_id);
                    true
                }
                _ => false,
            }
        };
        if !owned {
            return;
        }

        match code {
            Some(127) if cfg!(unix) => {
                events.emit(
                    &session_id,
                    TerminalEvent::Error {
                        message:
                            "\r\n\x1b[31mError: PTY shell unavailable (exit code 127).\x1b[0m"
                                .to_string(),
                    },
                );
            }
            Some(code) if code != 0 => {
                events.emit(
                    &session_id,
                    TerminalEvent::Error {
                        message: format!("\r\nProcess exited with code {}", code),
                    },
                );
            }
            _ => {}
        }

        debug!(session_id = %session_id, code = ?code, "Terminal session exited");
        events.emit_final(&session_id, TerminalEvent::Exit { code });
    });
}

fn parse_runtime_container_ids(raw: &str) -> Vec<String> {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) else {
        return Vec::new();
    };
    if let Some(ids) = value.get("containerIds").and_then(|v| v.as_array()) {
        return ids
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();
    }
    // Legacy single-container format.
    value
        .get("containerId")
        .and_then(|v| v.as_str())
        .map(|id| vec![id.to_string()])
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_config() -> Arc<Config> {
        Arc::new(Config {
            workspace_root: std::env::temp_dir(),
            host: "127.0.0.1".into(),
            port: 0,
            default_shell: None,
            log_level: "info".into(),
            template_step_timeout: Duration::from_secs(300),
            resource_sample_interval: Duration::from_secs(10),
            terminal_rows: 24,
            terminal_cols: 80,
        })
    }

    fn manager_fixture() -> (Arc<EventHub<TerminalEvent>>, TerminalManager) {
        let events = Arc::new(EventHub::new());
        let manager = TerminalManager::new(test_config(), events.clone());
        (events, manager)
    }

    async fn drain_until_exit(
        rx: &mut tokio::sync::broadcast::Receiver<TerminalEvent>,
    ) -> (String, Option<i32>) {
        let mut output = String::new();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
                .await
                .expect("terminal event timeout")
                .expect("terminal channel closed early");
            match event {
                TerminalEvent::Log { output: chunk } => output.push_str(&chunk),
                TerminalEvent::Error { message } => output.push_str(&message),
                TerminalEvent::Exit { code } => return (output, code),
            }
        }
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn session_streams_output_and_exits() {
        let (events, manager) = manager_fixture();
        let mut rx = events.subscribe("sock-1");

        manager
            .start("sock-1", None, &std::env::temp_dir(), "echo terminal-says-hi")
            .await;

        let (output, code) = drain_until_exit(&mut rx).await;
        assert!(output.contains("terminal-says-hi"), "output: {output:?}");
        assert_eq!(code, Some(0));
        assert_eq!(manager.session_count().await, 0);
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn nonzero_exit_is_reported_before_exit_event() {
        let (events, manager) = manager_fixture();
        let mut rx = events.subscribe("sock-2");

        manager
            .start("sock-2", None, &std::env::temp_dir(), "exit 3")
            .await;

        let (output, code) = drain_until_exit(&mut rx).await;
        assert!(output.contains("exited with code 3"), "output: {output:?}");
        assert_eq!(code, Some(3));
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn input_after_exit_is_a_silent_noop() {
        let (events, manager) = manager_fixture();
        let mut rx = events.subscribe("sock-3");

        manager
            .start("sock-3", None, &std::env::temp_dir(), "true")
            .await;
        let (_, _) = drain_until_exit(&mut rx).await;

        // Session cleaned up; input must neither panic nor error.
        manager.input("sock-3", "ls\n").await;
        assert_eq!(manager.session_count().await, 0);
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn second_start_on_same_id_replaces_the_first() {
        let (events, manager) = manager_fixture();
        let mut rx = events.subscribe("sock-4");

        manager
            .start("sock-4", None, &std::env::temp_dir(), "sleep 30")
            .await;
        let first_pid = manager.list_sessions().await[0].pid;

        manager
            .start("sock-4", None, &std::env::temp_dir(), "sleep 30")
            .await;

        // Exactly one live session, and it is the new child.
        let sessions = manager.list_sessions().await;
        assert_eq!(sessions.len(), 1);
        assert_ne!(sessions[0].pid, first_pid);

        // The teardown notice was sent to the connection.
        let mut saw_notice = false;
        while let Ok(Ok(event)) =
            tokio::time::timeout(Duration::from_millis(500), rx.recv()).await
        {
            if let TerminalEvent::Log { output } = event {
                if output.contains("Previous command terminated") {
                    saw_notice = true;
                    break;
                }
            }
        }
        assert!(saw_notice);

        manager.stop("sock-4").await;
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stop_kills_live_session_and_reports_absence_after() {
        let (_events, manager) = manager_fixture();

        manager
            .start("sock-5", Some("web".into()), &std::env::temp_dir(), "sleep 30")
            .await;
        assert_eq!(manager.session_count().await, 1);

        assert!(manager.stop_by_workspace("web").await);
        assert_eq!(manager.session_count().await, 0);
        assert!(!manager.stop("sock-5").await);
    }

    #[test]
    fn runtime_json_container_ids_parse_both_formats() {
        let new_format = r#"{"containerIds": ["abc", "def"]}"#;
        assert_eq!(parse_runtime_container_ids(new_format), vec!["abc", "def"]);

        let legacy = r#"{"containerId": "abc"}"#;
        assert_eq!(parse_runtime_container_ids(legacy), vec!["abc"]);

        assert!(parse_runtime_container_ids("not json").is_empty());
        assert!(parse_runtime_container_ids("{}").is_empty());
    }
}

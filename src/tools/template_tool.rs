use crate::config::Config;
use crate::error::AppError;
use crate::events::{EventHub, TemplateEvent};
use crate::tools::reaper_tool::ProcessController;
use crate::utils::command_prep::{preprocess_command, strip_ansi};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::process::Command;
use tracing::{debug, error, info, instrument, warn};

/// Longest stdout preview forwarded through the progress callback.
const OUTPUT_PREVIEW_CHARS: usize = 200;

/// One step of a scaffold template, supplied by the template catalog.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum TemplateStep {
    Command {
        #[serde(alias = "cmd")]
        text: String,
        /// Failure of a best-effort step is logged and skipped instead of
        /// halting the template. Off unless the catalog opts in.
        #[serde(default)]
        best_effort: bool,
    },
    File {
        #[serde(alias = "file")]
        path: String,
        #[serde(alias = "filecontent")]
        content: String,
    },
}

impl TemplateStep {
    fn describe(&self) -> String {
        match self {
            TemplateStep::Command { text, .. } => format!("Command({})", text),
            TemplateStep::File { path, .. } => format!("FileWrite({})", path),
        }
    }
}

/// Applies ordered template steps to a workspace directory.
///
/// Shared by the synchronous REST mode and the streaming mode; the only
/// difference is where `on_progress` messages go.
pub struct TemplateExecutor {
    config: Arc<Config>,
    controller: Arc<dyn ProcessController>,
    /// PIDs of currently running command steps, for the resource sampler's
    /// Job groups. Keyed by an opaque job id.
    active_jobs: StdMutex<HashMap<String, u32>>,
}

impl TemplateExecutor {
    pub fn new(config: Arc<Config>, controller: Arc<dyn ProcessController>) -> Self {
        Self {
            config,
            controller,
            active_jobs: StdMutex::new(HashMap::new()),
        }
    }

    pub fn active_jobs(&self) -> Vec<(String, u32)> {
        let jobs = self.active_jobs.lock().unwrap_or_else(|e| e.into_inner());
        jobs.iter().map(|(k, v)| (k.clone(), *v)).collect()
    }

    /// Runs `steps` strictly in order against `working_dir`.
    ///
    /// Execution stops at the first failing step (unless that step is
    /// best-effort) and the error names the step and the underlying cause.
    /// No rollback: files written by earlier steps stay.
    #[instrument(skip(self, steps, working_dir, on_progress), fields(steps = steps.len()))]
    pub async fn apply(
        &self,
        steps: &[TemplateStep],
        working_dir: &Path,
        mut on_progress: impl FnMut(String) + Send,
    ) -> Result<(), AppError> {
        tokio::fs::create_dir_all(working_dir).await?;

        for step in steps {
            match step {
                TemplateStep::File { path, content } => {
                    on_progress(format!("Creating file: {}", path));
                    self.write_file(working_dir, path, content)
                        .await
                        .map_err(|e| AppError::StepFailed {
                            step: step.describe(),
                            cause: e.to_string(),
                        })?;
                }
                TemplateStep::Command { text, best_effort } => {
                    let command = preprocess_command(text, working_dir);
                    on_progress(format!("Running: {}", command));
                    match self.run_command(&command, working_dir).await {
                        Ok(stdout) => {
                            let trimmed = stdout.trim();
                            if !trimmed.is_empty() {
                                let preview: String =
                                    trimmed.chars().take(OUTPUT_PREVIEW_CHARS).collect();
                                let suffix = if trimmed.chars().count() > OUTPUT_PREVIEW_CHARS {
                                    "..."
                                } else {
                                    ""
                                };
                                on_progress(format!("Output: {}{}", preview, suffix));
                            }
                        }
                        Err(e) if *best_effort => {
                            warn!(step = %step.describe(), error = %e, "Best-effort step failed, continuing");
                            on_progress(format!("Skipped (best effort): {}", e));
                        }
                        Err(e) => {
                            error!(step = %step.describe(), error = %e, "Template step failed");
                            return Err(AppError::StepFailed {
                                step: step.describe(),
                                cause: e.to_string(),
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Streaming mode: every progress message also goes out as a transport
    /// event on `job_key`, with a terminal success/error event at the end.
    pub async fn apply_streaming(
        &self,
        steps: &[TemplateStep],
        working_dir: &Path,
        events: Arc<EventHub<TemplateEvent>>,
        job_key: &str,
    ) -> Result<(), AppError> {
        events.emit(
            job_key,
            TemplateEvent::Progress {
                message: "Starting template...".to_string(),
            },
        );
        let emitter = events.clone();
        let key = job_key.to_string();
        let result = self
            .apply(steps, working_dir, move |message| {
                emitter.emit(&key, TemplateEvent::Progress { message });
            })
            .await;

        match &result {
            Ok(()) => {
                info!(job = %job_key, "Template applied successfully");
                events.emit_final(
                    job_key,
                    TemplateEvent::Success {
                        message: "Template applied successfully".to_string(),
                    },
                );
            }
            Err(e) => {
                events.emit_final(
                    job_key,
                    TemplateEvent::Error {
                        error: format!("Failed to apply template: {}", e),
                    },
                );
            }
        }
        result
    }

    async fn write_file(
        &self,
        working_dir: &Path,
        relative_path: &str,
        content: &str,
    ) -> std::io::Result<()> {
        let file_path = working_dir.join(relative_path);
        if let Some(parent) = file_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&file_path, content).await?;
        debug!(path = %file_path.display(), "Wrote template file");
        Ok(())
    }

    /// Runs one command step through the shell, non-interactively, with the
    /// configured wall-clock timeout. On timeout the step's process tree is
    /// killed exactly as an explicit stop would kill it.
    async fn run_command(&self, command: &str, working_dir: &Path) -> Result<String, AppError> {
        let (shell, flag) = self.controller.shell();
        let mut cmd = Command::new(shell);
        cmd.arg(flag)
            .arg(command)
            .current_dir(working_dir)
            // Non-interactive environment: no prompts, no colors, no TTY.
            .env("CI", "true")
            .env("npm_config_yes", "true")
            .env("FORCE_COLOR", "0")
            .env("DEBIAN_FRONTEND", "noninteractive")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd
            .spawn()
            .map_err(|e| AppError::SpawnFailure(format!("{}: {}", command, e)))?;
        let pid = child.id();

        let job_id = uuid::Uuid::new_v4().to_string();
        if let Some(pid) = pid {
            let mut jobs = self.active_jobs.lock().unwrap_or_else(|e| e.into_inner());
            jobs.insert(job_id.clone(), pid);
        }

        let result = tokio::time::timeout(
            self.config.template_step_timeout,
            child.wait_with_output(),
        )
        .await;

        {
            let mut jobs = self.active_jobs.lock().unwrap_or_else(|e| e.into_inner());
            jobs.remove(&job_id);
        }

        match result {
            Err(_) => {
                // The dropped child was already killed by kill_on_drop; the
                // group signal reaps anything it spawned.
                if let Some(pid) = pid {
                    let _ = self.controller.kill_tree(pid);
                }
                Err(AppError::TimeoutError(format!(
                    "Command timed out after {}s: {}",
                    self.config.template_step_timeout.as_secs(),
                    command
                )))
            }
            Ok(Err(e)) => Err(AppError::SpawnFailure(format!("{}: {}", command, e))),
            Ok(Ok(output)) => {
                let stdout = strip_ansi(&String::from_utf8_lossy(&output.stdout));
                if output.status.success() {
                    Ok(stdout)
                } else {
                    let stderr = strip_ansi(&String::from_utf8_lossy(&output.stderr));
                    Err(AppError::StepFailed {
                        step: format!("Command({})", command),
                        cause: format!(
                            "exit code: {:?}, stderr: {}, stdout: {}",
                            output.status.code(),
                            stderr.trim(),
                            stdout.trim()
                        ),
                    })
                }
            }
        }
    }
}

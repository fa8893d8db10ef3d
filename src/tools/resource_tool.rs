use crate::tools::registry::ProcessRegistry;
use crate::tools::template_tool::TemplateExecutor;
use crate::tools::terminal_tool::TerminalManager;
use crate::utils::docker_stats::{self, ContainerUsage};
use crate::utils::process_tree::{read_pss_bytes, ProcessTable};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use sysinfo::System;
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GroupKind {
    Service,
    Terminal,
    Job,
    System,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessUsage {
    pub pid: u32,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: GroupKind,
    /// PSS bytes summed over the group's process tree.
    pub memory: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSnapshot {
    pub system_total_mem: u64,
    pub server_used_mem: u64,
    pub peak_mem: u64,
    pub cpus: usize,
    pub uptime: u64,
    pub active_count: usize,
    pub processes: Vec<ProcessUsage>,
    pub docker_containers: Vec<ContainerUsage>,
    pub docker_total_mem: u64,
}

/// Aggregates memory for everything the orchestrator has spawned.
///
/// Uses proportional set size rather than RSS so shared pages are not
/// counted once per process in a tree. One process-table snapshot per
/// sample keeps the groups mutually consistent; every push re-runs the full
/// sample, no incremental diffing.
pub struct ResourceSampler {
    registry: Arc<ProcessRegistry>,
    terminals: Arc<TerminalManager>,
    templates: Arc<TemplateExecutor>,
    system: TokioMutex<System>,
    /// Monotone high-water mark over the daemon's lifetime.
    peak_mem: AtomicU64,
}

impl ResourceSampler {
    pub fn new(
        registry: Arc<ProcessRegistry>,
        terminals: Arc<TerminalManager>,
        templates: Arc<TemplateExecutor>,
    ) -> Self {
        Self {
            registry,
            terminals,
            templates,
            system: TokioMutex::new(System::new_all()),
            peak_mem: AtomicU64::new(0),
        }
    }

    #[instrument(skip(self))]
    pub async fn sample(&self) -> ResourceSnapshot {
        let (table, system_total_mem, cpus) = {
            let mut sys = self.system.lock().await;
            sys.refresh_memory();
            sys.refresh_processes();
            (ProcessTable::from_system(&sys), sys.total_memory(), sys.cpus().len())
        };

        let mut processes: Vec<ProcessUsage> = Vec::new();
        let mut group_pids: HashSet<u32> = HashSet::new();

        let services = self.registry.snapshot();
        let terminals = self.terminals.list_sessions().await;
        let jobs = self.templates.active_jobs();
        let active_count = services.len() + jobs.len();

        let mut add_group = |root_pid: u32, name: String, kind: GroupKind| {
            let pids = table.descendants(root_pid);
            let mut total = 0u64;
            for &pid in &pids {
                // Only count a pid once even if trees overlap.
                if group_pids.insert(pid) {
                    total += read_pss_bytes(pid);
                }
            }
            processes.push(ProcessUsage {
                pid: root_pid,
                name,
                kind,
                memory: total,
            });
        };

        for service in &services {
            add_group(service.pid, service.key.clone(), GroupKind::Service);
        }
        for session in &terminals {
            let name = match &session.workspace_name {
                Some(workspace) => format!("Terminal ({})", workspace),
                None => format!("Terminal ({})", session.session_id),
            };
            if let Some(pid) = session.pid {
                add_group(pid, name, GroupKind::Terminal);
            }
        }
        for (_, pid) in &jobs {
            add_group(*pid, "Job".to_string(), GroupKind::Job);
        }

        // The orchestrator's own memory, excluding the workloads it
        // launched, reported as its own bucket.
        let main_pid = std::process::id();
        let mut tool_core_mem = 0u64;
        for pid in table.descendants(main_pid) {
            if !group_pids.contains(&pid) {
                tool_core_mem += read_pss_bytes(pid);
            }
        }
        if tool_core_mem == 0 {
            // PSS unavailable (non-Linux); degrade to our own RSS.
            let sys = self.system.lock().await;
            tool_core_mem = sys
                .process(sysinfo::Pid::from_u32(main_pid))
                .map(|p| p.memory())
                .unwrap_or(0);
        }
        processes.push(ProcessUsage {
            pid: main_pid,
            name: "Tool Server (Core)".to_string(),
            kind: GroupKind::System,
            memory: tool_core_mem,
        });

        let server_used_mem: u64 = processes.iter().map(|p| p.memory).sum();
        let peak_mem = self
            .peak_mem
            .fetch_max(server_used_mem, Ordering::SeqCst)
            .max(server_used_mem);

        let docker = docker_stats::container_usage().await;
        debug!(
            groups = processes.len(),
            server_used_mem, "Resource sample complete"
        );

        ResourceSnapshot {
            system_total_mem,
            server_used_mem,
            peak_mem,
            cpus,
            uptime: System::uptime(),
            active_count,
            processes,
            docker_containers: docker.containers,
            docker_total_mem: docker.total_mem,
        }
    }
}

/// Kills whatever is listening on a TCP port. POSIX-only (lsof); reports
/// `false` when nothing was found or the platform has no lsof.
pub async fn kill_port(port: u16) -> bool {
    let Ok(output) = tokio::process::Command::new("lsof")
        .args(["-t", &format!("-i:{}", port)])
        .output()
        .await
    else {
        return false;
    };
    if !output.status.success() {
        return false;
    }
    let pids: Vec<String> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();
    if pids.is_empty() {
        return false;
    }
    tokio::process::Command::new("kill")
        .arg("-9")
        .args(&pids)
        .output()
        .await
        .map(|out| out.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::events::EventHub;
    use crate::tools::reaper_tool::platform_controller;
    use std::time::Duration;

    fn sampler_fixture() -> (Arc<ProcessRegistry>, ResourceSampler) {
        let config = Arc::new(Config {
            workspace_root: std::env::temp_dir(),
            host: "127.0.0.1".into(),
            port: 0,
            default_shell: None,
            log_level: "info".into(),
            template_step_timeout: Duration::from_secs(300),
            resource_sample_interval: Duration::from_secs(10),
            terminal_rows: 24,
            terminal_cols: 80,
        });
        let registry = Arc::new(ProcessRegistry::new());
        let terminals = Arc::new(TerminalManager::new(config.clone(), Arc::new(EventHub::new())));
        let templates = Arc::new(TemplateExecutor::new(config, platform_controller()));
        let sampler = ResourceSampler::new(registry.clone(), terminals, templates);
        (registry, sampler)
    }

    #[tokio::test]
    async fn snapshot_always_contains_the_core_bucket() {
        let (_registry, sampler) = sampler_fixture();
        let snapshot = sampler.sample().await;

        let core: Vec<_> = snapshot
            .processes
            .iter()
            .filter(|p| p.kind == GroupKind::System)
            .collect();
        assert_eq!(core.len(), 1);
        assert_eq!(core[0].name, "Tool Server (Core)");
        assert_eq!(core[0].pid, std::process::id());
        assert!(snapshot.system_total_mem > 0);
        assert!(snapshot.cpus > 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn tracked_service_appears_without_double_counting() {
        let (registry, sampler) = sampler_fixture();

        let child = tokio::process::Command::new("sleep")
            .arg("10")
            .stdout(std::process::Stdio::null())
            .spawn()
            .expect("spawn sleeper");
        let pid = child.id().expect("pid");
        registry.register("api", pid, Arc::new(TokioMutex::new(Some(child))));

        let snapshot = sampler.sample().await;
        let service = snapshot
            .processes
            .iter()
            .find(|p| p.kind == GroupKind::Service)
            .expect("service group present");
        assert_eq!(service.pid, pid);
        assert_eq!(service.name, "api");

        // The service's pids are excluded from the core bucket, so the sum
        // of groups equals the reported total exactly.
        let summed: u64 = snapshot.processes.iter().map(|p| p.memory).sum();
        assert_eq!(summed, snapshot.server_used_mem);

        if let Some(entry) = registry.remove("api") {
            if let Some(mut child) = entry.child.lock().await.take() {
                let _ = child.start_kill();
            }
        }
    }

    #[tokio::test]
    async fn peak_memory_never_decreases() {
        let (_registry, sampler) = sampler_fixture();
        let first = sampler.sample().await;
        let second = sampler.sample().await;
        assert!(second.peak_mem >= first.peak_mem);
        assert!(second.peak_mem >= second.server_used_mem.min(first.server_used_mem));
    }

    #[tokio::test]
    async fn snapshot_serializes_with_wire_field_names() {
        let (_registry, sampler) = sampler_fixture();
        let snapshot = sampler.sample().await;
        let json = serde_json::to_value(&snapshot).unwrap();
        assert!(json.get("systemTotalMem").is_some());
        assert!(json.get("peakMem").is_some());
        assert!(json.get("dockerContainers").is_some());
        let core = json["processes"]
            .as_array()
            .unwrap()
            .iter()
            .find(|p| p["name"] == "Tool Server (Core)")
            .unwrap();
        assert_eq!(core["type"], "System");
    }
}

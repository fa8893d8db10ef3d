use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::process::Child;
use tracing::{info, warn};

/// Information about a tracked workspace process.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedProcessInfo {
    pub key: String,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

/// A live registry entry. The child handle is shared with the waiter task
/// and with the reaper's single-handle kill fallback.
pub struct TrackedProcess {
    pub info: TrackedProcessInfo,
    pub child: Arc<tokio::sync::Mutex<Option<Child>>>,
    /// Distinguishes this registration from a later one under the same key,
    /// so a stale waiter cannot remove its successor's entry.
    pub instance: u64,
}

pub enum RegisterOutcome {
    Registered { instance: u64 },
    /// A process is already tracked under this key; the caller should
    /// reattach to the existing event stream instead of spawning.
    AlreadyRunning,
}

/// Maps a workspace name to its single live process.
///
/// Registry mutation happens only here; the launcher, reaper, and sampler
/// receive this as an injected dependency. Lock scope is map mutation only,
/// never child I/O.
pub struct ProcessRegistry {
    processes: StdMutex<HashMap<String, TrackedProcess>>,
    next_instance: AtomicU64,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self {
            processes: StdMutex::new(HashMap::new()),
            next_instance: AtomicU64::new(1),
        }
    }

    /// Registers a spawned child under `key`. If the key is already live
    /// this does not replace it: one live entry per key.
    pub fn register(
        &self,
        key: &str,
        pid: u32,
        child: Arc<tokio::sync::Mutex<Option<Child>>>,
    ) -> RegisterOutcome {
        let mut processes = self.processes.lock().unwrap_or_else(|e| e.into_inner());
        if processes.contains_key(key) {
            return RegisterOutcome::AlreadyRunning;
        }
        let instance = self.next_instance.fetch_add(1, Ordering::SeqCst);
        processes.insert(
            key.to_string(),
            TrackedProcess {
                info: TrackedProcessInfo {
                    key: key.to_string(),
                    pid,
                    started_at: Utc::now(),
                },
                child,
                instance,
            },
        );
        info!(key = %key, pid = %pid, "Registered workspace process");
        RegisterOutcome::Registered { instance }
    }

    pub fn contains(&self, key: &str) -> bool {
        let processes = self.processes.lock().unwrap_or_else(|e| e.into_inner());
        processes.contains_key(key)
    }

    pub fn pid_of(&self, key: &str) -> Option<u32> {
        let processes = self.processes.lock().unwrap_or_else(|e| e.into_inner());
        processes.get(key).map(|p| p.info.pid)
    }

    /// Removes and returns the entry for `key`, whatever its instance.
    pub fn remove(&self, key: &str) -> Option<TrackedProcess> {
        let mut processes = self.processes.lock().unwrap_or_else(|e| e.into_inner());
        let removed = processes.remove(key);
        if removed.is_some() {
            info!(key = %key, "Unregistered workspace process");
        }
        removed
    }

    /// Removes the entry for `key` only if it is still the given
    /// registration. Used by waiter tasks so that an exit observed for an
    /// old process cannot evict a replacement started afterwards.
    pub fn remove_instance(&self, key: &str, instance: u64) -> Option<TrackedProcess> {
        let mut processes = self.processes.lock().unwrap_or_else(|e| e.into_inner());
        match processes.get(key) {
            Some(p) if p.instance == instance => {
                info!(key = %key, "Unregistered workspace process (exit)");
                processes.remove(key)
            }
            _ => None,
        }
    }

    pub fn snapshot(&self) -> Vec<TrackedProcessInfo> {
        let processes = self.processes.lock().unwrap_or_else(|e| e.into_inner());
        processes.values().map(|p| p.info.clone()).collect()
    }

    pub fn len(&self) -> usize {
        let processes = self.processes.lock().unwrap_or_else(|e| e.into_inner());
        processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Kills every tracked child. Used on daemon shutdown.
    pub async fn kill_all(&self) {
        let entries: Vec<TrackedProcess> = {
            let mut processes = self.processes.lock().unwrap_or_else(|e| e.into_inner());
            processes.drain().map(|(_, p)| p).collect()
        };
        for entry in entries {
            let mut child_guard = entry.child.lock().await;
            if let Some(child) = child_guard.as_mut() {
                match child.start_kill() {
                    Ok(()) => info!(key = %entry.info.key, pid = %entry.info.pid, "Killed process on shutdown"),
                    Err(e) => warn!(key = %entry.info.key, error = %e, "Failed to kill process on shutdown"),
                }
            }
        }
    }
}

impl Default for ProcessRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_child() -> Arc<tokio::sync::Mutex<Option<Child>>> {
        Arc::new(tokio::sync::Mutex::new(None))
    }

    #[test]
    fn second_register_under_live_key_reports_already_running() {
        let registry = ProcessRegistry::new();
        assert!(matches!(
            registry.register("web", 100, empty_child()),
            RegisterOutcome::Registered { .. }
        ));
        assert!(matches!(
            registry.register("web", 200, empty_child()),
            RegisterOutcome::AlreadyRunning
        ));
        // The original registration stays intact.
        assert_eq!(registry.pid_of("web"), Some(100));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_clears_key_for_reuse() {
        let registry = ProcessRegistry::new();
        registry.register("web", 100, empty_child());
        assert!(registry.remove("web").is_some());
        assert!(registry.remove("web").is_none());
        assert!(matches!(
            registry.register("web", 300, empty_child()),
            RegisterOutcome::Registered { .. }
        ));
    }

    #[test]
    fn stale_instance_cannot_remove_replacement() {
        let registry = ProcessRegistry::new();
        let first = match registry.register("web", 100, empty_child()) {
            RegisterOutcome::Registered { instance } => instance,
            RegisterOutcome::AlreadyRunning => unreachable!(),
        };
        registry.remove("web");
        registry.register("web", 200, empty_child());

        // A waiter for the first process wakes up late; it must not evict
        // the second registration.
        assert!(registry.remove_instance("web", first).is_none());
        assert_eq!(registry.pid_of("web"), Some(200));
    }
}

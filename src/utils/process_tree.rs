use std::collections::{HashMap, VecDeque};
use sysinfo::{Pid, ProcessRefreshKind, RefreshKind, System};

/// Snapshot of the OS-wide parent → children PID table.
///
/// Built once per resource-sampling pass; descendant sets for every tracked
/// group are derived from the same snapshot so groups are mutually
/// consistent. This is a reporting structure only; the kill path signals
/// process groups instead of walking this table.
#[derive(Debug, Default)]
pub struct ProcessTable {
    children: HashMap<u32, Vec<u32>>,
    names: HashMap<u32, String>,
}

impl ProcessTable {
    pub fn snapshot() -> Self {
        let sys = System::new_with_specifics(
            RefreshKind::new().with_processes(ProcessRefreshKind::new()),
        );
        Self::from_system(&sys)
    }

    pub fn from_system(sys: &System) -> Self {
        let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
        let mut names: HashMap<u32, String> = HashMap::new();
        for (pid, process) in sys.processes() {
            names.insert(pid.as_u32(), process.name().to_string());
            if let Some(parent) = process.parent() {
                children.entry(parent.as_u32()).or_default().push(pid.as_u32());
            }
        }
        Self { children, names }
    }

    /// Breadth-first walk from `root`, inclusive of the root itself.
    pub fn descendants(&self, root: u32) -> Vec<u32> {
        let mut results = vec![root];
        let mut queue = VecDeque::from([root]);
        while let Some(current) = queue.pop_front() {
            if let Some(kids) = self.children.get(&current) {
                for &child in kids {
                    results.push(child);
                    queue.push_back(child);
                }
            }
        }
        results
    }

    pub fn name_of(&self, pid: u32) -> Option<&str> {
        self.names.get(&pid).map(|s| s.as_str())
    }

    pub fn is_alive(&self, pid: u32) -> bool {
        self.names.contains_key(&pid)
    }
}

/// Reads proportional set size (PSS) for a PID in bytes.
///
/// PSS splits shared pages between the processes mapping them, so summing it
/// over a process tree does not double-count. Returns 0 when the kernel file
/// is unavailable (non-Linux, permissions, process already gone).
pub fn read_pss_bytes(pid: u32) -> u64 {
    let path = format!("/proc/{}/smaps_rollup", pid);
    let Ok(data) = std::fs::read_to_string(path) else {
        return 0;
    };
    for line in data.lines() {
        if let Some(rest) = line.strip_prefix("Pss:") {
            let kb = rest
                .trim()
                .split_whitespace()
                .next()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(0);
            return kb * 1024;
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_of(edges: &[(u32, u32)]) -> ProcessTable {
        let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
        let mut names = HashMap::new();
        for &(parent, child) in edges {
            children.entry(parent).or_default().push(child);
            names.insert(parent, format!("p{}", parent));
            names.insert(child, format!("p{}", child));
        }
        ProcessTable { children, names }
    }

    #[test]
    fn descendants_walks_the_whole_subtree() {
        // 1 -> 2 -> 4, 1 -> 3
        let table = table_of(&[(1, 2), (1, 3), (2, 4)]);
        let mut pids = table.descendants(1);
        pids.sort_unstable();
        assert_eq!(pids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn descendants_of_leaf_is_only_itself() {
        let table = table_of(&[(1, 2)]);
        assert_eq!(table.descendants(2), vec![2]);
    }

    #[test]
    fn snapshot_contains_our_own_process() {
        let table = ProcessTable::snapshot();
        let me = std::process::id();
        assert!(table.is_alive(me));
        assert!(table.descendants(me).contains(&me));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn pss_of_self_is_positive_on_linux() {
        assert!(read_pss_bytes(std::process::id()) > 0);
    }

    #[test]
    fn pss_of_bogus_pid_degrades_to_zero() {
        assert_eq!(read_pss_bytes(u32::MAX - 1), 0);
    }
}

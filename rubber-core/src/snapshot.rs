//! Transient per-tick view of the worker table.

use crate::traits::WorkerRow;

/// Refreshed once per tick from [`crate::traits::WorkerRegistry::snapshot`].
///
/// Invariant: for any queue `q`, `active(q) ∩ idle(q) = ∅` and
/// `active(q) ∪ idle(q) = consumers(q)` — both derived views partition
/// `consumers(q)` by `has_running_task`, so this holds by construction.
#[derive(Debug, Clone, Default)]
pub struct WorkerSnapshot {
    workers: Vec<WorkerRow>,
}

impl WorkerSnapshot {
    pub fn new(workers: Vec<WorkerRow>) -> Self {
        Self { workers }
    }

    /// All hosts consuming from `queue`.
    pub fn consumers(&self, queue: &str) -> Vec<&str> {
        self.workers
            .iter()
            .filter(|w| w.queues.contains(queue))
            .map(|w| w.host.as_str())
            .collect()
    }

    /// Hosts consuming from `queue` with a task currently running.
    pub fn active(&self, queue: &str) -> Vec<&str> {
        self.workers
            .iter()
            .filter(|w| w.has_running_task && w.queues.contains(queue))
            .map(|w| w.host.as_str())
            .collect()
    }

    /// Hosts consuming from `queue` with no task currently running.
    pub fn idle(&self, queue: &str) -> Vec<&str> {
        self.workers
            .iter()
            .filter(|w| !w.has_running_task && w.queues.contains(queue))
            .map(|w| w.host.as_str())
            .collect()
    }

    /// Whether any worker row's host matches `name`. Used by the slacker
    /// reaper, which assumes cloud-assigned hostnames equal the
    /// controller-issued VM name.
    pub fn has_host(&self, name: &str) -> bool {
        self.workers.iter().any(|w| w.host == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn row(host: &str, queue: &str, running: bool) -> WorkerRow {
        WorkerRow {
            id: format!("worker@{host}"),
            host: host.to_string(),
            queues: HashSet::from([queue.to_string()]),
            has_running_task: running,
        }
    }

    #[test]
    fn active_and_idle_partition_consumers() {
        let snapshot = WorkerSnapshot::new(vec![
            row("h1", "ingest", true),
            row("h2", "ingest", false),
            row("h3", "other", false),
        ]);

        let consumers: HashSet<_> = snapshot.consumers("ingest").into_iter().collect();
        let active: HashSet<_> = snapshot.active("ingest").into_iter().collect();
        let idle: HashSet<_> = snapshot.idle("ingest").into_iter().collect();

        assert_eq!(consumers, HashSet::from(["h1", "h2"]));
        assert_eq!(active, HashSet::from(["h1"]));
        assert_eq!(idle, HashSet::from(["h2"]));
        assert!(active.is_disjoint(&idle));
    }

    #[test]
    fn has_host_checks_membership_by_name() {
        let snapshot = WorkerSnapshot::new(vec![row("vm-a", "ingest", false)]);
        assert!(snapshot.has_host("vm-a"));
        assert!(!snapshot.has_host("vm-b"));
    }
}

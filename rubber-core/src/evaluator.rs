//! Per-profile need evaluation — the core of the
//! elasticity policy.

use crate::profile::Profile;
use crate::snapshot::WorkerSnapshot;

/// Queue depth above which spawning is even considered.
#[derive(Debug, Clone, Copy)]
pub struct NeedEvaluator {
    backorder_threshold: u64,
}

impl NeedEvaluator {
    pub fn new(backorder_threshold: u64) -> Self {
        Self { backorder_threshold }
    }

    /// Signed VM delta for `profile`: positive spawns, negative tears
    /// down, zero is a no-op.
    ///
    /// Deterministic given constant inputs —
    /// this takes no clock, no I/O, nothing but the arguments given.
    /// `booting` is the count of the profile's registry entries younger
    /// than `SLACKER_TIME_THRESHOLD`, computed by the caller so this
    /// function stays pure.
    pub fn eval(&self, profile: &Profile, depth: u64, snapshot: &WorkerSnapshot, booting: u32) -> i64 {
        if depth > self.backorder_threshold {
            let desired = (depth as f64 * profile.spawn_ratio()).floor() as i64;
            (desired - i64::from(booting)).max(0)
        } else if depth == 0 {
            let idle = snapshot.idle(profile.queue_name()).len() as i64;
            -idle
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProfileConfig, RubberParams};
    use crate::profile::BudgetAllocator;
    use std::collections::HashMap;

    fn profile(queue: &str, spawn_ratio: f64, max_vms: u32) -> Profile {
        let mut configs = HashMap::new();
        configs.insert(
            "p".to_string(),
            ProfileConfig {
                queue_name: queue.to_string(),
                spawn_args: serde_json::json!({}),
                rubber_params: Some(RubberParams { spawn_ratio: Some(spawn_ratio) }),
            },
        );
        let table = BudgetAllocator::allocate(&["p".to_string()], &configs, max_vms).unwrap();
        table.iter().next().unwrap().clone()
    }

    #[test]
    fn backlog_above_threshold_spawns_scaled_by_ratio() {
        let evaluator = NeedEvaluator::new(0);
        let profile = profile("ingest", 0.5, 10);
        let snapshot = WorkerSnapshot::new(vec![]);

        // depth=10, ratio=0.5 → floor(5) - 0 booting = 5
        assert_eq!(evaluator.eval(&profile, 10, &snapshot, 0), 5);
    }

    #[test]
    fn booting_vms_are_subtracted_and_clamped_at_zero() {
        let evaluator = NeedEvaluator::new(0);
        let profile = profile("ingest", 0.5, 10);
        let snapshot = WorkerSnapshot::new(vec![]);

        // depth=10, ratio=0.5, 2 already booting → 5-2=3
        assert_eq!(evaluator.eval(&profile, 10, &snapshot, 2), 3);
        // more booting than desired clamps at zero, never negative
        assert_eq!(evaluator.eval(&profile, 10, &snapshot, 10), 0);
    }

    #[test]
    fn empty_queue_tears_down_by_idle_count() {
        use crate::traits::WorkerRow;
        use std::collections::HashSet;

        let evaluator = NeedEvaluator::new(0);
        let profile = profile("ingest", 0.5, 10);
        let snapshot = WorkerSnapshot::new(vec![
            WorkerRow {
                id: "w1".into(),
                host: "h1".into(),
                queues: HashSet::from(["ingest".to_string()]),
                has_running_task: false,
            },
            WorkerRow {
                id: "w2".into(),
                host: "h2".into(),
                queues: HashSet::from(["ingest".to_string()]),
                has_running_task: false,
            },
        ]);

        // depth=0, 2 idle → Δ=-2
        assert_eq!(evaluator.eval(&profile, 0, &snapshot, 0), -2);
    }

    #[test]
    fn depth_at_or_below_backorder_threshold_but_nonzero_is_a_noop() {
        let evaluator = NeedEvaluator::new(5);
        let profile = profile("ingest", 0.5, 10);
        let snapshot = WorkerSnapshot::new(vec![]);

        assert_eq!(evaluator.eval(&profile, 3, &snapshot, 0), 0);
    }

    #[test]
    fn deterministic_given_constant_inputs() {
        let evaluator = NeedEvaluator::new(0);
        let profile = profile("ingest", 0.3, 10);
        let snapshot = WorkerSnapshot::new(vec![]);

        let first = evaluator.eval(&profile, 17, &snapshot, 1);
        let second = evaluator.eval(&profile, 17, &snapshot, 1);
        assert_eq!(first, second);
    }
}

//! Slacker reclamation.
//!
//! Reclaims VMs that were spawned but never joined the worker registry,
//! so repeated spawn failures or stuck-boot VMs don't accumulate against
//! the cloud quota and the profile's `max_vms`.

use tracing::{info, instrument, warn};

use crate::registry::VmRegistry;
use crate::snapshot::WorkerSnapshot;
use crate::traits::{CloudDriver, CloudError};

/// Grace window after spawn during which a missing worker is not a
/// slacker.
#[derive(Debug, Clone, Copy)]
pub struct SlackerReaper {
    threshold_secs: i64,
}

/// Summary of one reaper pass, for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapOutcome {
    pub reaped: u32,
    pub skipped_transient: u32,
    pub still_booting: u32,
}

impl SlackerReaper {
    pub fn new(threshold_secs: i64) -> Self {
        Self { threshold_secs }
    }

    pub fn threshold_secs(&self) -> i64 {
        self.threshold_secs
    }

    /// Runs strictly before any profile evaluation in a tick — reaping
    /// frees budget the spawn phase may reuse in the same tick.
    #[instrument(skip(self, registry, cloud, snapshot))]
    pub async fn run<C: CloudDriver>(
        &self,
        registry: &VmRegistry,
        cloud: &C,
        snapshot: &WorkerSnapshot,
        now: i64,
    ) -> ReapOutcome {
        let mut outcome = ReapOutcome::default();

        let records = match registry.iter().await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "could not list VM registry for slacker check");
                return outcome;
            }
        };

        for record in records {
            // Cloud-assigned hostnames are assumed to equal the
            // controller-issued VM name.
            if snapshot.has_host(&record.name) {
                continue;
            }

            let age = now - record.spawn_time;
            if age < self.threshold_secs {
                outcome.still_booting += 1;
                continue;
            }

            info!(vm_name = %record.name, age_secs = age, "found a slacker, terminating");
            match cloud.delete(&record.name).await {
                Ok(()) => {
                    if let Err(e) = registry.delete(&record.name).await {
                        warn!(vm_name = %record.name, error = %e, "reaped VM but failed to update registry");
                    }
                    outcome.reaped += 1;
                }
                Err(CloudError::NotFound) => {
                    warn!(vm_name = %record.name, "cloud has no record of slacker, removing from registry");
                    if let Err(e) = registry.delete(&record.name).await {
                        warn!(vm_name = %record.name, error = %e, "failed to remove stale registry entry");
                    }
                    outcome.reaped += 1;
                }
                Err(CloudError::Transient(msg)) => {
                    warn!(vm_name = %record.name, error = %msg, "transient error reaping slacker, retrying next tick");
                    outcome.skipped_transient += 1;
                }
                Err(CloudError::OverLimit) => {
                    // Not a meaningful response to a delete; treat like
                    // any other failure to reclaim and retry later.
                    warn!(vm_name = %record.name, "unexpected over-limit response deleting slacker");
                    outcome.skipped_transient += 1;
                }
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockCloudDriver;

    #[tokio::test]
    async fn leaves_young_vms_alone() {
        let registry = VmRegistry::open_in_memory().await.unwrap();
        registry
            .put(&crate::registry::VmRecord {
                name: "vm-1".into(),
                profile_id: "p".into(),
                queue_name: "q".into(),
                spawn_time: 1000,
            })
            .await
            .unwrap();

        let cloud = MockCloudDriver::new();
        let snapshot = WorkerSnapshot::new(vec![]);
        let reaper = SlackerReaper::new(300);

        // 10s later, still within the boot window.
        let outcome = reaper.run(&registry, &cloud, &snapshot, 1010).await;
        assert_eq!(outcome, ReapOutcome { reaped: 0, skipped_transient: 0, still_booting: 1 });
        assert_eq!(cloud.delete_calls(), 0);
        assert_eq!(registry.iter().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reaps_vms_past_the_threshold() {
        let registry = VmRegistry::open_in_memory().await.unwrap();
        for name in ["vm-1", "vm-2"] {
            registry
                .put(&crate::registry::VmRecord {
                    name: name.into(),
                    profile_id: "p".into(),
                    queue_name: "q".into(),
                    spawn_time: 1000,
                })
                .await
                .unwrap();
        }

        let cloud = MockCloudDriver::new();
        let snapshot = WorkerSnapshot::new(vec![]);
        let reaper = SlackerReaper::new(300);

        // 310s later, still no workers.
        let outcome = reaper.run(&registry, &cloud, &snapshot, 1310).await;
        assert_eq!(outcome.reaped, 2);
        assert_eq!(cloud.delete_calls(), 2);
        assert!(registry.iter().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn leaves_vms_whose_host_joined_the_snapshot() {
        use crate::traits::WorkerRow;
        use std::collections::HashSet;

        let registry = VmRegistry::open_in_memory().await.unwrap();
        registry
            .put(&crate::registry::VmRecord {
                name: "vm-1".into(),
                profile_id: "p".into(),
                queue_name: "q".into(),
                spawn_time: 1000,
            })
            .await
            .unwrap();

        let cloud = MockCloudDriver::new();
        let snapshot = WorkerSnapshot::new(vec![WorkerRow {
            id: "worker@vm-1".into(),
            host: "vm-1".into(),
            queues: HashSet::from(["q".to_string()]),
            has_running_task: false,
        }]);
        let reaper = SlackerReaper::new(300);

        let outcome = reaper.run(&registry, &cloud, &snapshot, 10_000).await;
        assert_eq!(outcome.reaped, 0);
        assert_eq!(registry.iter().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn not_found_on_delete_still_purges_the_registry() {
        let registry = VmRegistry::open_in_memory().await.unwrap();
        registry
            .put(&crate::registry::VmRecord {
                name: "vm-1".into(),
                profile_id: "p".into(),
                queue_name: "q".into(),
                spawn_time: 1000,
            })
            .await
            .unwrap();

        let cloud = MockCloudDriver::new();
        cloud.fail_delete_with(CloudError::NotFound);
        let snapshot = WorkerSnapshot::new(vec![]);
        let reaper = SlackerReaper::new(300);

        let outcome = reaper.run(&registry, &cloud, &snapshot, 10_000).await;
        assert_eq!(outcome.reaped, 1);
        assert!(registry.iter().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn transient_delete_failure_leaves_the_record_for_next_tick() {
        let registry = VmRegistry::open_in_memory().await.unwrap();
        registry
            .put(&crate::registry::VmRecord {
                name: "vm-1".into(),
                profile_id: "p".into(),
                queue_name: "q".into(),
                spawn_time: 1000,
            })
            .await
            .unwrap();

        let cloud = MockCloudDriver::new();
        cloud.fail_delete_with(CloudError::Transient("timeout".into()));
        let snapshot = WorkerSnapshot::new(vec![]);
        let reaper = SlackerReaper::new(300);

        let outcome = reaper.run(&registry, &cloud, &snapshot, 10_000).await;
        assert_eq!(outcome.skipped_transient, 1);
        assert_eq!(registry.iter().await.unwrap().len(), 1);
    }
}

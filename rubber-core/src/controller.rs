//! The controller loop — the only place the other
//! components are wired together.

use std::collections::HashSet;
use std::time::Duration;

use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{SpawnError, TeardownError};
use crate::evaluator::NeedEvaluator;
use crate::naming::normalize_vm_name;
use crate::profile::{Profile, ProfileTable};
use crate::reaper::SlackerReaper;
use crate::registry::{VmRecord, VmRegistry};
use crate::snapshot::WorkerSnapshot;
use crate::traits::{BrokerStats, CloudDriver, CloudError, WorkerRegistry};
use crate::now_unix;

/// Generic over its three external collaborators the way
/// `worker::vm_manager::VmManager<B: VmmBackend>` is generic over its
/// backend — production wires in the real `rubber-cloud`/`rubber-broker`/
/// `rubber-workers` drivers, tests wire in [`crate::testing`]'s fakes.
pub struct Controller<C: CloudDriver, B: BrokerStats, W: WorkerRegistry> {
    profiles: ProfileTable,
    registry: VmRegistry,
    cloud: C,
    broker: B,
    workers: W,
    evaluator: NeedEvaluator,
    reaper: SlackerReaper,
    eval_interval_secs: u64,
    min_idle_workers: u32,
}

impl<C: CloudDriver, B: BrokerStats, W: WorkerRegistry> Controller<C, B, W> {
    pub fn new(
        profiles: ProfileTable,
        registry: VmRegistry,
        cloud: C,
        broker: B,
        workers: W,
        config: &Config,
    ) -> Self {
        Self {
            profiles,
            registry,
            cloud,
            broker,
            workers,
            evaluator: NeedEvaluator::new(config.backorder_threshold),
            reaper: SlackerReaper::new(config.slacker_time_threshold_secs as i64),
            eval_interval_secs: config.eval_interval_secs,
            min_idle_workers: config.min_idle_workers,
        }
    }

    /// Runs forever. Each tick runs to completion before the next begins
    /// — there is no concurrent tick execution here.
    pub async fn run(&self) {
        loop {
            tokio::time::sleep(Duration::from_secs(self.eval_interval_secs)).await;
            self.tick().await;
        }
    }

    /// One iteration: refresh the worker snapshot, reap slackers, then
    /// evaluate and act on every profile in table order.
    #[instrument(skip(self))]
    pub async fn tick(&self) {
        let rows = match self.workers.snapshot().await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "worker registry snapshot failed, skipping tick");
                return;
            }
        };
        let snapshot = WorkerSnapshot::new(rows);
        let now = now_unix();

        let reaped = self.reaper.run(&self.registry, &self.cloud, &snapshot, now).await;
        info!(reaped = reaped.reaped, still_booting = reaped.still_booting, "slacker reaper pass complete");

        for profile in self.profiles.iter() {
            self.evaluate_and_act(profile, &snapshot, now).await;
        }
    }

    #[instrument(skip(self, snapshot), fields(profile = profile.id()))]
    async fn evaluate_and_act(&self, profile: &Profile, snapshot: &WorkerSnapshot, now: i64) {
        let depth = match self.broker.depth(profile.queue_name()).await {
            Ok(depth) => depth,
            Err(e) => {
                warn!(error = %e, "broker depth query failed, skipping profile this tick");
                return;
            }
        };

        let booting = match self
            .registry
            .count_booting(profile.id(), now, self.reaper.threshold_secs())
            .await
        {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "registry query failed, skipping profile this tick");
                return;
            }
        };

        let delta = self.evaluator.eval(profile, depth, snapshot, booting);

        if delta > 0 {
            for _ in 0..delta {
                match self.spawn(profile).await {
                    Ok(()) => {}
                    Err(SpawnError::InsufficientResources) => {
                        info!("profile at its VM budget, stopping spawns this tick");
                        break;
                    }
                    Err(SpawnError::CloudOverLimit) => {
                        warn!("cloud over limit, stopping spawns this tick");
                        break;
                    }
                    Err(SpawnError::CloudTransient(msg)) => {
                        warn!(error = %msg, "transient cloud error spawning, retrying next iteration");
                    }
                    Err(SpawnError::VmNameTooLong(name)) => {
                        error!(vm_name = %name, "normalized VM name too long, skipping this spawn");
                    }
                    Err(SpawnError::RegistryWrite(msg)) => {
                        error!(error = %msg, "could not record spawned VM, skipping this spawn");
                    }
                }
            }
        } else if delta < 0 {
            let surplus = (delta.unsigned_abs() as i64 - i64::from(self.min_idle_workers)).max(0);
            for _ in 0..surplus {
                match self.teardown(profile, snapshot).await {
                    Ok(()) => {}
                    Err(TeardownError::MinimumWorkersReached) => {
                        info!("teardown would drop below the idle worker floor, stopping");
                        break;
                    }
                    Err(TeardownError::NoIdleWorkers) => {
                        info!("no idle workers for this profile, stopping teardown");
                        break;
                    }
                    Err(TeardownError::NoTearDownTargets) => {
                        warn!("idle workers exist but none are registry-owned and cloud-live");
                        break;
                    }
                    Err(TeardownError::CloudTransient(msg)) => {
                        warn!(error = %msg, "transient cloud error tearing down, stopping this tick");
                        break;
                    }
                }
            }
        }
    }

    /// The spawn protocol.
    pub async fn spawn(&self, profile: &Profile) -> Result<(), SpawnError> {
        let owned = self
            .registry
            .count_for_profile(profile.id())
            .await
            .map_err(|e| SpawnError::RegistryWrite(e.to_string()))?;
        if owned + 1 > profile.max_vms() {
            return Err(SpawnError::InsufficientResources);
        }

        let prefix: String = profile.queue_name().chars().take(10).collect();
        let raw_name = format!("{prefix}-{}", Uuid::new_v4());
        let name = normalize_vm_name(&raw_name).map_err(|e| SpawnError::VmNameTooLong(e.0))?;

        // Written before the cloud call so a failed create still leaves a
        // record for the slacker reaper to reclaim.
        let record = VmRecord {
            name: name.clone(),
            profile_id: profile.id().to_string(),
            queue_name: queue.to_string(),
            spawn_time: now_unix(),
        };
        self.registry
            .put(&record)
            .await
            .map_err(|e| SpawnError::RegistryWrite(e.to_string()))?;

        match self.cloud.create(&name, profile.spawn_args()).await {
            Ok(()) => {
                info!(vm_name = %name, "spawned VM");
                Ok(())
            }
            Err(CloudError::OverLimit) => Err(SpawnError::CloudOverLimit),
            Err(CloudError::Transient(msg)) => Err(SpawnError::CloudTransient(msg)),
            Err(CloudError::NotFound) => {
                Err(SpawnError::CloudTransient("unexpected not-found response to create".into()))
            }
        }
    }

    /// The teardown protocol. Picking among `candidates`
    /// has no ordering guarantee — the first match
    /// in snapshot order is as good as any other.
    pub async fn teardown(&self, profile: &Profile, snapshot: &WorkerSnapshot) -> Result<(), TeardownError> {
        let idle_hosts = snapshot.idle(profile.queue_name());
        if idle_hosts.is_empty() {
            return Err(TeardownError::NoIdleWorkers);
        }

        let consumers = snapshot.consumers(profile.queue_name());
        if (consumers.len() as i64 - 1) < i64::from(self.min_idle_workers) {
            return Err(TeardownError::MinimumWorkersReached);
        }

        let cloud_live = self.cloud.list().await.map_err(|e| match e {
            CloudError::Transient(msg) => TeardownError::CloudTransient(msg),
            CloudError::OverLimit => {
                TeardownError::CloudTransient("unexpected over-limit response listing cloud".into())
            }
            CloudError::NotFound => {
                TeardownError::CloudTransient("unexpected not-found response listing cloud".into())
            }
        })?;
        let owned = self
            .registry
            .names_for_profile(profile.id())
            .await
            .map_err(|e| TeardownError::CloudTransient(e.to_string()))?;
        let owned: HashSet<&str> = owned.iter().map(String::as_str).collect();

        let chosen = idle_hosts
            .into_iter()
            .find(|host| cloud_live.contains(*host) && owned.contains(host))
            .map(str::to_string);
        let chosen = match chosen {
            Some(name) => name,
            None => return Err(TeardownError::NoTearDownTargets),
        };

        match self.cloud.delete(&chosen).await {
            Ok(()) | Err(CloudError::NotFound) => {
                if let Err(e) = self.registry.delete(&chosen).await {
                    warn!(vm_name = %chosen, error = %e, "tore down VM but failed to update registry");
                }
                info!(vm_name = %chosen, "tore down VM");
                Ok(())
            }
            Err(CloudError::Transient(msg)) => Err(TeardownError::CloudTransient(msg)),
            Err(CloudError::OverLimit) => {
                Err(TeardownError::CloudTransient("unexpected over-limit response deleting VM".into()))
            }
        }
    }
}

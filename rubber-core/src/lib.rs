//! Elasticity control loop for a fleet of AMQP-backed task workers.
//!
//! `rubber-core` owns every piece of state and policy: the VM registry,
//! the fair-share budget, the slacker reaper, the per-profile need
//! evaluator, and the controller loop that ties them together. External
//! collaborators (the cloud, the broker, the worker table) are reached
//! only through the traits in [`traits`] — concrete implementations live
//! in the sibling `rubber-cloud`, `rubber-broker` and `rubber-workers`
//! crates.

pub mod config;
pub mod controller;
pub mod error;
pub mod naming;
pub mod profile;
pub mod reaper;
pub mod registry;
pub mod evaluator;
pub mod snapshot;
pub mod testing;
pub mod traits;

pub use config::Config;
pub use controller::Controller;
pub use error::{SpawnError, StartupError, TeardownError};
pub use profile::{BudgetAllocator, Profile, ProfileTable};
pub use reaper::{ReapOutcome, SlackerReaper};
pub use registry::{VmRegistry, VmRecord};
pub use evaluator::NeedEvaluator;
pub use snapshot::WorkerSnapshot;
pub use traits::{BrokerStats, CloudDriver, CloudError, RegistryError, WorkerRegistry, WorkerRow};

/// Seconds since the Unix epoch. Wall-clock, not monotonic — VM spawn
/// times are persisted across restarts, so `Instant` does not work here.
pub fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before Unix epoch")
        .as_secs() as i64
}

//! Contracts for the three external collaborators: the IaaS cloud, the
//! broker's queue-depth endpoint, and the active-worker table.
//!
//! Kept as plain traits with native async methods rather than a boxed
//! `dyn` interface — the controller is generic over its collaborators the
//! way `worker::vm_manager::VmManager<B: VmmBackend>` is generic over its
//! backend, so swapping in mocks for tests costs nothing at runtime.

use std::collections::HashSet;

/// Errors a [`CloudDriver`] can report. Network/protocol failures map to
/// `Transient`; quota exhaustion maps to `OverLimit`; a delete against an
/// already-gone VM maps to `NotFound`.
#[derive(Debug, Clone)]
pub enum CloudError {
    OverLimit,
    NotFound,
    Transient(String),
}

impl std::fmt::Display for CloudError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloudError::OverLimit => write!(f, "cloud quota exhausted"),
            CloudError::NotFound => write!(f, "VM not found on cloud"),
            CloudError::Transient(msg) => write!(f, "transient cloud error: {msg}"),
        }
    }
}

impl std::error::Error for CloudError {}

/// Create/list/delete VMs on the IaaS. Owns cloud-side names.
///
/// `name` is passed through verbatim by callers — it has already been
/// normalized by [`crate::naming::normalize_vm_name`].
pub trait CloudDriver: Send + Sync + 'static {
    /// Best-effort create. May report nothing on success beyond accepting
    /// the request — callers must not assume the VM is booted when this
    /// returns `Ok`.
    fn create(
        &self,
        name: &str,
        spawn_args: &serde_json::Value,
    ) -> impl Future<Output = Result<(), CloudError>> + Send;

    /// All VM names currently live on the cloud, regardless of owner.
    fn list(&self) -> impl Future<Output = Result<HashSet<String>, CloudError>> + Send;

    fn delete(&self, name: &str) -> impl Future<Output = Result<(), CloudError>> + Send;
}

/// Errors a [`BrokerStats`] or [`WorkerRegistry`] call can report.
/// Every failure mode the controller cares about is transient: either
/// the tick is skipped (registry) or the profile is skipped (broker).
#[derive(Debug, Clone)]
pub struct Transient(pub String);

impl std::fmt::Display for Transient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "transient error: {}", self.0)
    }
}

impl std::error::Error for Transient {}

/// Alias kept distinct from [`Transient`] so call sites read naturally
/// (`RegistryError` at the worker-table boundary, not the VM registry).
pub type RegistryError = Transient;
pub type BrokerError = Transient;

/// Report pending-message depth of a named queue.
pub trait BrokerStats: Send + Sync + 'static {
    /// Count of unacknowledged, ready-to-deliver messages at call time —
    /// not including in-flight (unacked-but-delivered) messages.
    fn depth(&self, queue_name: &str) -> impl Future<Output = Result<u64, BrokerError>> + Send;
}

/// One row of the worker table, restricted to `status == active` by the
/// implementation before it ever reaches [`crate::snapshot::WorkerSnapshot`].
#[derive(Debug, Clone)]
pub struct WorkerRow {
    pub id: String,
    pub host: String,
    pub queues: HashSet<String>,
    pub has_running_task: bool,
}

/// Report currently active worker identities, their assigned queues, and
/// whether each has running tasks.
pub trait WorkerRegistry: Send + Sync + 'static {
    /// A point-in-time view with no freshness guarantee stronger than
    /// "within the last few seconds". Errors here abort the whole tick —
    /// the caller makes no spawn/teardown decisions on a stale or absent
    /// snapshot.
    fn snapshot(&self) -> impl Future<Output = Result<Vec<WorkerRow>, RegistryError>> + Send;
}

//! In-memory fakes for [`crate::traits`], grounded on
//! `worker::vmm::mock::MockBackend`'s call-tracking, failure-injectable
//! style. Not `#[cfg(test)]`-gated — like `worker::vmm::mock` — so other
//! crates (`rubber-controller`'s own integration tests) can assemble a
//! full [`crate::Controller`] without touching a real cloud, broker, or
//! worker table.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::traits::{BrokerError, CloudDriver, CloudError, RegistryError, WorkerRegistry, WorkerRow};

#[derive(Debug, Default)]
struct CallCounts {
    creates: AtomicUsize,
    deletes: AtomicUsize,
    lists: AtomicUsize,
}

/// Tracks calls and lets tests inject a failure for the next `create`
/// or `delete`, and simulates cloud-side state across `create`/`delete`
/// so `list()` reflects what has actually been spawned/torn down.
#[derive(Clone, Default)]
pub struct MockCloudDriver {
    calls: Arc<CallCounts>,
    live: Arc<Mutex<HashSet<String>>>,
    create_error: Arc<Mutex<Option<CloudError>>>,
    delete_error: Arc<Mutex<Option<CloudError>>>,
}

impl MockCloudDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_calls(&self) -> usize {
        self.calls.creates.load(Ordering::Relaxed)
    }

    pub fn delete_calls(&self) -> usize {
        self.calls.deletes.load(Ordering::Relaxed)
    }

    pub fn list_calls(&self) -> usize {
        self.calls.lists.load(Ordering::Relaxed)
    }

    /// Next (and every subsequent, until cleared) `create` call fails.
    pub fn fail_create_with(&self, err: CloudError) {
        *self.create_error.lock().unwrap() = Some(err);
    }

    /// Next (and every subsequent, until cleared) `delete` call fails.
    pub fn fail_delete_with(&self, err: CloudError) {
        *self.delete_error.lock().unwrap() = Some(err);
    }

    /// Mark a name as already live on the cloud without going through
    /// `create` — for seeding teardown scenarios.
    pub fn seed_live(&self, name: &str) {
        self.live.lock().unwrap().insert(name.to_string());
    }

    pub fn live_names(&self) -> HashSet<String> {
        self.live.lock().unwrap().clone()
    }
}

impl CloudDriver for MockCloudDriver {
    async fn create(&self, name: &str, _spawn_args: &serde_json::Value) -> Result<(), CloudError> {
        self.calls.creates.fetch_add(1, Ordering::Relaxed);
        if let Some(err) = self.create_error.lock().unwrap().clone() {
            return Err(err);
        }
        self.live.lock().unwrap().insert(name.to_string());
        Ok(())
    }

    async fn list(&self) -> Result<HashSet<String>, CloudError> {
        self.calls.lists.fetch_add(1, Ordering::Relaxed);
        Ok(self.live.lock().unwrap().clone())
    }

    async fn delete(&self, name: &str) -> Result<(), CloudError> {
        self.calls.deletes.fetch_add(1, Ordering::Relaxed);
        if let Some(err) = self.delete_error.lock().unwrap().clone() {
            return Err(err);
        }
        self.live.lock().unwrap().remove(name);
        Ok(())
    }
}

/// Fixed per-queue depths, settable by tests.
#[derive(Clone, Default)]
pub struct MockBrokerStats {
    depths: Arc<Mutex<HashMap<String, u64>>>,
    error: Arc<Mutex<Option<BrokerError>>>,
}

impl MockBrokerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_depth(&self, queue_name: &str, depth: u64) {
        self.depths.lock().unwrap().insert(queue_name.to_string(), depth);
    }

    pub fn fail_with(&self, err: BrokerError) {
        *self.error.lock().unwrap() = Some(err);
    }
}

impl crate::traits::BrokerStats for MockBrokerStats {
    async fn depth(&self, queue_name: &str) -> Result<u64, BrokerError> {
        if let Some(err) = self.error.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(self.depths.lock().unwrap().get(queue_name).copied().unwrap_or(0))
    }
}

/// A settable worker snapshot, for exercising the controller end to end.
#[derive(Clone, Default)]
pub struct MockWorkerRegistry {
    rows: Arc<Mutex<Vec<WorkerRow>>>,
    error: Arc<Mutex<Option<RegistryError>>>,
}

impl MockWorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_rows(&self, rows: Vec<WorkerRow>) {
        *self.rows.lock().unwrap() = rows;
    }

    pub fn fail_with(&self, err: RegistryError) {
        *self.error.lock().unwrap() = Some(err);
    }
}

impl WorkerRegistry for MockWorkerRegistry {
    async fn snapshot(&self) -> Result<Vec<WorkerRow>, RegistryError> {
        if let Some(err) = self.error.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(self.rows.lock().unwrap().clone())
    }
}

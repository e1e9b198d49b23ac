//! `WorkerRegistry` implementation against the worker-inspection HTTP
//! endpoint (`GET /workers`).
//!
//! Same thin-REST-client shape as `rubber-cloud` and `rubber-broker`: one
//! request, one response shape to parse, errors mapped to the trait's
//! `Transient` type so a bad tick never blocks the next one.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use rubber_core::traits::{RegistryError, WorkerRegistry, WorkerRow};

#[derive(Debug, Deserialize)]
struct WorkerEntry {
    status: bool,
    #[serde(default)]
    queues: Vec<String>,
    #[serde(default)]
    running_tasks: u32,
}

/// Worker-table row keyed by worker id, e.g. `worker@vm-ingest-ab12`.
/// The host a VM is known by on the cloud is the part after `@` — worker
/// ids that carry no `@` are assumed to already be bare hostnames.
fn host_of(worker_id: &str) -> &str {
    worker_id.split_once('@').map(|(_, host)| host).unwrap_or(worker_id)
}

#[derive(Clone)]
pub struct HttpWorkerRegistry {
    client: reqwest::Client,
    url: String,
}

impl HttpWorkerRegistry {
    pub fn new(worker_registry_url: impl Into<String>, timeout_secs: u64) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { client, url: format!("{}/workers", worker_registry_url.into().trim_end_matches('/')) })
    }
}

impl WorkerRegistry for HttpWorkerRegistry {
    async fn snapshot(&self) -> Result<Vec<WorkerRow>, RegistryError> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "worker registry request failed");
                RegistryError(e.to_string())
            })?;

        if !resp.status().is_success() {
            warn!(status = %resp.status(), "worker registry returned a non-success status");
            return Err(RegistryError(format!("worker registry returned {}", resp.status())));
        }

        let table: HashMap<String, WorkerEntry> = resp.json().await.map_err(|e| {
            warn!(error = %e, "could not parse worker registry response");
            RegistryError(e.to_string())
        })?;

        let rows: Vec<WorkerRow> = table
            .into_iter()
            .filter(|(_, entry)| entry.status)
            .map(|(id, entry)| WorkerRow {
                host: host_of(&id).to_string(),
                id,
                queues: entry.queues.into_iter().collect::<HashSet<_>>(),
                has_running_task: entry.running_tasks > 0,
            })
            .collect();
        debug!(active_workers = rows.len(), "worker registry snapshot fetched");
        Ok(rows)
    }
}

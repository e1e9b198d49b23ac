//! `CloudDriver` implementation for an OpenStack-compatible Compute API.
//!
//! Stateless REST client over `reqwest`, grounded on the shape of
//! `worker::vmm::cloud_hypervisor::CloudHypervisor` — a single struct
//! holding the transport handle, one method per `Vmm` operation, errors
//! mapped from transport/HTTP status into a small domain enum. Nova's
//! `POST /servers` plays the role `cloud-hypervisor`'s `/api/v1/vm.create`
//! plays there; everything else (timeouts, error mapping, `Clone` for
//! cheap sharing across the controller) follows the same pattern.

use std::collections::HashSet;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use rubber_core::traits::{CloudDriver, CloudError};

/// Connection details forwarded through `CLOUD_CONFIG`. `token` is a
/// pre-obtained Keystone token; this driver does not perform the
/// auth-token dance itself — that belongs to whatever deployment tooling
/// issues the controller its credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenStackConfig {
    /// Base URL of the Compute (Nova) API, e.g.
    /// `https://cloud.example.com:8774/v2.1/<project-id>`.
    pub compute_url: String,
    pub token: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Deserialize)]
struct ServersEnvelope {
    servers: Vec<ServerSummary>,
}

#[derive(Debug, Deserialize)]
struct ServerSummary {
    id: String,
    name: String,
}

/// Stateless REST client against a single OpenStack project's Compute API.
#[derive(Clone)]
pub struct OpenStackDriver {
    client: reqwest::Client,
    compute_url: String,
    token: String,
}

impl OpenStackDriver {
    pub fn new(config: OpenStackConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            compute_url: config.compute_url.trim_end_matches('/').to_string(),
            token: config.token,
        })
    }

    fn servers_url(&self) -> String {
        format!("{}/servers", self.compute_url)
    }

    async fn find_server_id(&self, name: &str) -> Result<Option<String>, CloudError> {
        let servers = self.list_servers().await?;
        Ok(servers.into_iter().find(|s| s.name == name).map(|s| s.id))
    }

    async fn list_servers(&self) -> Result<Vec<ServerSummary>, CloudError> {
        let resp = self
            .client
            .get(format!("{}?all_tenants=1", self.servers_url()))
            .header("X-Auth-Token", &self.token)
            .send()
            .await
            .map_err(transport_error)?;

        if !resp.status().is_success() {
            return Err(status_error(resp.status()));
        }

        let body: ServersEnvelope = resp.json().await.map_err(transport_error)?;
        Ok(body.servers)
    }
}

impl CloudDriver for OpenStackDriver {
    async fn create(&self, name: &str, spawn_args: &serde_json::Value) -> Result<(), CloudError> {
        let mut server = spawn_args.clone();
        if let Some(obj) = server.as_object_mut() {
            obj.insert("name".to_string(), serde_json::Value::String(name.to_string()));
        }
        let body = serde_json::json!({ "server": server });

        let resp = self
            .client
            .post(self.servers_url())
            .header("X-Auth-Token", &self.token)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        if status.is_success() {
            debug!(vm_name = name, "cloud accepted create request");
            return Ok(());
        }
        if status == reqwest::StatusCode::FORBIDDEN || status == reqwest::StatusCode::REQUEST_ENTITY_TOO_LARGE {
            return Err(CloudError::OverLimit);
        }
        Err(status_error(status))
    }

    async fn list(&self) -> Result<HashSet<String>, CloudError> {
        Ok(self.list_servers().await?.into_iter().map(|s| s.name).collect())
    }

    async fn delete(&self, name: &str) -> Result<(), CloudError> {
        let Some(id) = self.find_server_id(name).await? else {
            warn!(vm_name = name, "delete requested for a name not present on the cloud");
            return Err(CloudError::NotFound);
        };

        let resp = self
            .client
            .delete(format!("{}/{}", self.servers_url(), id))
            .header("X-Auth-Token", &self.token)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(status_error(status))
    }
}

fn transport_error(err: reqwest::Error) -> CloudError {
    CloudError::Transient(err.to_string())
}

fn status_error(status: reqwest::StatusCode) -> CloudError {
    if status == reqwest::StatusCode::NOT_FOUND {
        CloudError::NotFound
    } else if status.is_server_error() {
        CloudError::Transient(format!("server error: {status}"))
    } else {
        CloudError::Transient(format!("unexpected status: {status}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_parses_from_json() {
        let cfg: OpenStackConfig = serde_json::from_value(serde_json::json!({
            "compute_url": "https://cloud.example.com:8774/v2.1/proj",
            "token": "abc123",
        }))
        .unwrap();
        assert_eq!(cfg.timeout_secs, 5);
        assert_eq!(cfg.compute_url, "https://cloud.example.com:8774/v2.1/proj");
    }

    #[test]
    fn status_error_maps_not_found() {
        assert!(matches!(status_error(reqwest::StatusCode::NOT_FOUND), CloudError::NotFound));
    }

    #[test]
    fn status_error_maps_server_errors_to_transient() {
        assert!(matches!(
            status_error(reqwest::StatusCode::BAD_GATEWAY),
            CloudError::Transient(_)
        ));
    }
}

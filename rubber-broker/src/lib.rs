//! `BrokerStats` implementation against the RabbitMQ management HTTP API.
//!
//! One GET, one field pulled off the response. Grounded on the same
//! thin-REST-client shape as `rubber-cloud`'s `OpenStackDriver`: a struct
//! holding a `reqwest::Client` plus the handful of fields the endpoint
//! needs, no retry loop of its own — the controller tick is the retry
//! loop.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use rubber_core::traits::{BrokerError, BrokerStats};

#[derive(Debug, Deserialize)]
struct QueueInfo {
    messages: u64,
}

/// Connection details for the broker's management admin API.
#[derive(Debug, Clone)]
pub struct RabbitMqConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
    /// Broker vhost, URL-encoded form (`%2f` for the default `/`).
    pub vhost: String,
    pub timeout_secs: u64,
}

#[derive(Clone)]
pub struct RabbitMqBrokerStats {
    client: reqwest::Client,
    base_url: String,
    user: String,
    pass: String,
    vhost: String,
}

impl RabbitMqBrokerStats {
    pub fn new(config: RabbitMqConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: format!("http://{}:{}", config.host, config.port),
            user: config.user,
            pass: config.pass,
            vhost: config.vhost,
        })
    }
}

impl BrokerStats for RabbitMqBrokerStats {
    async fn depth(&self, queue_name: &str) -> Result<u64, BrokerError> {
        let url = format!("{}/api/queues/{}/{}", self.base_url, self.vhost, queue_name);
        let resp = self
            .client
            .get(&url)
            .basic_auth(&self.user, Some(&self.pass))
            .send()
            .await
            .map_err(|e| {
                warn!(queue = queue_name, error = %e, "broker admin request failed");
                BrokerError(e.to_string())
            })?;

        if !resp.status().is_success() {
            warn!(queue = queue_name, status = %resp.status(), "broker admin returned a non-success status");
            return Err(BrokerError(format!("broker admin returned {}", resp.status())));
        }

        let info: QueueInfo = resp.json().await.map_err(|e| {
            warn!(queue = queue_name, error = %e, "could not parse broker admin response");
            BrokerError(e.to_string())
        })?;
        debug!(queue = queue_name, messages = info.messages, "queue depth fetched");
        Ok(info.messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_info_parses_messages_field() {
        let info: QueueInfo = serde_json::from_value(serde_json::json!({
            "messages": 42,
            "messages_ready": 42,
            "messages_unacknowledged": 0,
        }))
        .unwrap();
        assert_eq!(info.messages, 42);
    }
}
